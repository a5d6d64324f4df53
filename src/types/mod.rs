mod format;
mod geom_kind;
mod history;
mod layer;

pub use format::{ExportFormat, FileFormat};
pub use geom_kind::{GeometryFamily, GeometryKind};
pub use history::{UploadRecord, UploadStatus};
pub use layer::{
    Layer, LayerConfig, LayerMetadata, LayerStats, LayerStatus, LayerType, ProcessingInfo,
    SourceInfo, StyleConfig,
};
