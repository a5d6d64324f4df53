#![doc = "Geospatial layer import/export pipeline"]
mod capability;
mod common;
mod error;
mod export;
mod feature_set;
mod import;
mod merge;
mod normalize;
mod parse;
mod stats;
mod store;
mod style;
mod types;
mod validate;

pub mod cli;
pub mod commands;

#[doc(inline)]
pub use capability::{GeometryCapability, MinimalFeatureSet};

#[doc(inline)]
pub use error::{PipelineError, Result};

#[doc(inline)]
pub use feature_set::{Bounds, Feature, FeatureSet, FeatureSetView, SourceCrs};

#[doc(inline)]
pub use import::{ImportOutcome, ImportService, Preview};

#[doc(inline)]
pub use export::{export_batch, export_layer, Export};

#[doc(inline)]
pub use store::{JsonStore, LayerStore, MemoryStore};

#[doc(inline)]
pub use types::{
    ExportFormat, FileFormat, GeometryFamily, GeometryKind, Layer, LayerConfig, LayerMetadata,
    LayerStats, LayerStatus, LayerType, ProcessingInfo, SourceInfo, StyleConfig, UploadRecord,
    UploadStatus,
};

pub use merge::{merge_features, MergedGeometry};
pub use normalize::normalize;
pub use parse::MAX_FILE_SIZE;
pub use stats::compute_stats;
pub use style::default_style;
pub use validate::{validate, MAX_FEATURES};
