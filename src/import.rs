use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use geo::Geometry;
use log::{error, info, warn};
use serde_json::{json, Value};

use crate::capability::{GeometryCapability, MinimalFeatureSet};
use crate::common::{json_to_geometry, scratch_dir};
use crate::error::{PipelineError, Result};
use crate::feature_set::{FeatureSet, FeatureSetView};
use crate::merge::merge_features;
use crate::normalize::normalize;
use crate::parse::{parse, ParsedSource};
use crate::stats::compute_stats;
use crate::store::LayerStore;
use crate::style::default_style;
use crate::types::{
    FileFormat, GeometryKind, Layer, LayerConfig, LayerMetadata, LayerStats, ProcessingInfo,
    SourceInfo, UploadRecord, UploadStatus,
};
use crate::validate::validate;

/// Result of a successful import.
pub struct ImportOutcome {
    pub layer_id: u64,
    pub upload_id: u64,
    pub feature_count: usize,
    pub message: String,
}

/// Metadata-only analysis of a file, without touching the store.
#[derive(Debug)]
pub struct Preview {
    pub file_format: FileFormat,
    pub feature_count: usize,
    pub geometry_types: BTreeMap<String, usize>,
    pub main_geometry_type: Option<String>,
    pub bounds: Option<[f64; 4]>,
    pub crs: String,
    pub file_size_bytes: u64,
}

/// The import pipeline: detect, parse, normalize, validate, merge, build,
/// persist — one upload per call, fully synchronous. Holds the injected
/// store and the process-wide geometry capability.
pub struct ImportService<'a> {
    store: &'a mut dyn LayerStore,
    capability: GeometryCapability,
}

impl<'a> ImportService<'a> {
    pub fn new(store: &'a mut dyn LayerStore, capability: GeometryCapability) -> Self {
        Self { store, capability }
    }

    /// Import `path` as a new layer. Every failure after format detection is
    /// recorded on the upload history row before it is returned.
    pub fn import_file(&mut self, path: &Path, config: &LayerConfig) -> Result<ImportOutcome> {
        let started = Instant::now();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let size = std::fs::metadata(path)
            .map_err(|e| PipelineError::UnreadableFile(format!("{}: {e}", path.display())))?
            .len();
        let format = FileFormat::detect(path)?;

        let upload_id = self.store.allocate_upload_id();
        self.store
            .insert_upload(UploadRecord::started(upload_id, &filename, size, format))
            .map_err(PipelineError::Validation)?;
        info!("import started: {filename} ({format}, {size} bytes)");

        match self.run_pipeline(path, format, config, size, &filename) {
            Ok((layer_id, feature_count, snapshot)) => {
                let elapsed = started.elapsed().as_secs_f64();
                self.store
                    .update_upload(upload_id, &mut |record| {
                        record.layer_id = Some(layer_id);
                        record.status = UploadStatus::Success;
                        record.feature_count = Some(feature_count);
                        record.processing_seconds = Some(elapsed);
                        record.file_metadata = Some(snapshot.clone());
                        record.processed_at = Some(Utc::now());
                    })
                    .map_err(PipelineError::Validation)?;
                info!("import succeeded: {feature_count} features in {elapsed:.2}s");
                Ok(ImportOutcome {
                    layer_id,
                    upload_id,
                    feature_count,
                    message: format!("imported {feature_count} features"),
                })
            }
            Err(err) => {
                error!("import failed: {err}");
                let message = err.to_string();
                if let Err(update_err) = self.store.update_upload(upload_id, &mut |record| {
                    record.status = UploadStatus::Error;
                    record.error_message = Some(message.clone());
                    record.processed_at = Some(Utc::now());
                }) {
                    warn!("failed to record import error: {update_err:#}");
                }
                Err(err)
            }
        }
    }

    /// Analyze a file without creating a layer: detector, parser, normalizer
    /// and validator only.
    pub fn preview(&self, path: &Path) -> Result<Preview> {
        let size = std::fs::metadata(path)
            .map_err(|e| PipelineError::UnreadableFile(format!("{}: {e}", path.display())))?
            .len();
        let format = FileFormat::detect(path)?;

        let scratch = scratch_dir("geolayers-preview-").map_err(PipelineError::Validation)?;
        let parsed = parse(path, format, self.capability, scratch.path())?;

        let view: Box<dyn FeatureSetView> = match parsed {
            ParsedSource::Full(set) => Box::new(normalize(set)?),
            ParsedSource::Minimal(set) => Box::new(set),
        };
        validate(view.as_ref())?;

        let histogram = view.kind_histogram();
        let main_geometry_type = histogram
            .iter()
            .max_by_key(|(_, &count)| count)
            .map(|(name, _)| name.clone());
        Ok(Preview {
            file_format: format,
            feature_count: view.feature_count(),
            geometry_types: histogram,
            main_geometry_type,
            bounds: view.bounds().map(|b| b.to_array()),
            crs: view.crs_tag(),
            file_size_bytes: size,
        })
    }

    fn run_pipeline(
        &mut self,
        path: &Path,
        format: FileFormat,
        config: &LayerConfig,
        size: u64,
        filename: &str,
    ) -> Result<(u64, usize, Value)> {
        let scratch = scratch_dir("geolayers-import-").map_err(PipelineError::Validation)?;
        let parsed = parse(path, format, self.capability, scratch.path())?;

        let (layer_id, feature_count, snapshot) = match parsed {
            ParsedSource::Full(set) => {
                let set = normalize(set)?;
                validate(&set)?;
                self.persist_full(set, config, format, size, filename)?
            }
            ParsedSource::Minimal(set) => {
                validate(&set)?;
                self.persist_minimal(set, config, format, size, filename)?
            }
        };

        // Best-effort cleanup; a failure here must never mask the result.
        if let Err(e) = scratch.close() {
            warn!("failed to remove scratch directory: {e}");
        }
        Ok((layer_id, feature_count, snapshot))
    }

    fn persist_full(
        &mut self,
        set: FeatureSet,
        config: &LayerConfig,
        format: FileFormat,
        size: u64,
        filename: &str,
    ) -> Result<(u64, usize, Value)> {
        let merged = merge_features(&set)?;
        let stats = compute_stats(merged.kind, &merged.geometry);
        let snapshot = history_snapshot(&set);

        let metadata = LayerMetadata {
            properties: set.features.iter().map(|f| f.properties.clone()).collect(),
            source: SourceInfo {
                original_crs: set.crs_tag(),
                feature_count: set.len(),
                geometry_types: set.kind_histogram(),
                bounds: set.bounds().map(|b| b.to_array()).unwrap_or([0.0; 4]),
            },
            processing: ProcessingInfo { import_date: Utc::now(), file_size_bytes: size },
            geojson: None,
            original_payload: None,
        };

        let feature_count = set.len();
        let layer_id = self.persist_layer(
            config,
            format,
            merged.kind,
            merged.geometry,
            stats,
            metadata,
            filename,
        )?;
        Ok((layer_id, feature_count, snapshot))
    }

    fn persist_minimal(
        &mut self,
        set: MinimalFeatureSet,
        config: &LayerConfig,
        format: FileFormat,
        size: u64,
        filename: &str,
    ) -> Result<(u64, usize, Value)> {
        // Canonical geometry is an approximation: the first feature only.
        // The verbatim payload in metadata is the faithful record.
        let first = set.first_geometry().ok_or_else(|| {
            PipelineError::NoGeometryFound("no feature carries a geometry".to_string())
        })?;
        let geometry = json_to_geometry(first)
            .map_err(|e| PipelineError::UnreadableFile(format!("unreadable geometry: {e}")))?;
        let kind = GeometryKind::of(&geometry).ok_or_else(|| {
            PipelineError::UnsupportedGeometryType("GeometryCollection".to_string())
        })?;
        warn!("degraded import: canonical geometry approximated from first feature");

        let snapshot = history_snapshot(&set);
        let metadata = LayerMetadata {
            properties: set.properties().to_vec(),
            source: SourceInfo {
                original_crs: set.crs_tag(),
                feature_count: set.feature_count(),
                geometry_types: set.kind_histogram(),
                bounds: set.bounds().map(|b| b.to_array()).unwrap_or([0.0; 4]),
            },
            processing: ProcessingInfo { import_date: Utc::now(), file_size_bytes: size },
            geojson: None,
            original_payload: Some(set.payload().clone()),
        };

        let feature_count = set.feature_count();
        let layer_id = self.persist_layer(
            config,
            format,
            kind,
            geometry,
            LayerStats::default(), // statistics are never computed in degraded mode
            metadata,
            filename,
        )?;
        Ok((layer_id, feature_count, snapshot))
    }

    #[allow(clippy::too_many_arguments)]
    fn persist_layer(
        &mut self,
        config: &LayerConfig,
        format: FileFormat,
        kind: GeometryKind,
        geometry: Geometry<f64>,
        stats: LayerStats,
        metadata: LayerMetadata,
        filename: &str,
    ) -> Result<u64> {
        let id = self.store.allocate_layer_id();
        let now = Utc::now();
        let mut layer = Layer {
            id,
            name: config.name.clone(),
            description: config
                .description
                .clone()
                .or_else(|| Some(format!("Imported from {filename}"))),
            layer_type: config.layer_type,
            geometry_kind: kind,
            source_format: format,
            status: config.status,
            is_visible: config.visible,
            is_public: config.public,
            style: default_style(config.layer_type, kind, config.status),
            metadata,
            stats,
            geometry,
            created_at: now,
            updated_at: now,
        };
        // Cache the rendered feature for fast replay on export and display.
        layer.metadata.geojson = Some(layer.to_geojson_feature());

        self.store.insert_layer(layer).map_err(PipelineError::Validation)?;
        Ok(id)
    }
}

fn history_snapshot(view: &dyn FeatureSetView) -> Value {
    json!({
        "crs": view.crs_tag(),
        "bounds": view.bounds().map(|b| b.to_array()),
        "geometry_types": view.geometry_kind_names(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::io::Write;

    fn geojson_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".geojson").tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    const THREE_POINTS: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":{"type":"Point","coordinates":[1.0,1.0]},"properties":{"n":"a"}},
        {"type":"Feature","geometry":{"type":"Point","coordinates":[2.0,2.0]},"properties":{"n":"b"}},
        {"type":"Feature","geometry":{"type":"Point","coordinates":[3.0,3.0]},"properties":{"n":"c"}}
    ]}"#;

    fn config() -> LayerConfig {
        LayerConfig::parse("wells", "test wells", "custom", "active").unwrap()
    }

    #[test]
    fn full_import_builds_layer_and_history() {
        let file = geojson_file(THREE_POINTS);
        let mut store = MemoryStore::new();
        let outcome = ImportService::new(&mut store, GeometryCapability::Full)
            .import_file(file.path(), &config())
            .unwrap();

        assert_eq!(outcome.feature_count, 3);
        let layer = store.layer(outcome.layer_id).unwrap();
        assert_eq!(layer.geometry_kind, GeometryKind::MultiPoint);
        assert_eq!(layer.stats.point_count, Some(3));
        assert!(layer.stats.area_km2.is_none());
        assert_eq!(layer.metadata.properties.len(), 3);
        assert!(layer.metadata.geojson.is_some());

        let uploads = store.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].status, UploadStatus::Success);
        assert_eq!(uploads[0].layer_id, Some(outcome.layer_id));
        assert_eq!(uploads[0].feature_count, Some(3));
    }

    #[test]
    fn failed_import_records_error() {
        let file = geojson_file(r#"{"type":"Point","coordinates":[0,0]}"#);
        let mut store = MemoryStore::new();
        let result =
            ImportService::new(&mut store, GeometryCapability::Full).import_file(file.path(), &config());
        assert!(matches!(result, Err(PipelineError::UnreadableFile(_))));

        let uploads = store.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].status, UploadStatus::Error);
        assert!(uploads[0].error_message.is_some());
        assert_eq!(uploads[0].layer_id, None);
    }

    #[test]
    fn degraded_import_keeps_payload_verbatim() {
        let file = geojson_file(THREE_POINTS);
        let mut store = MemoryStore::new();
        let outcome = ImportService::new(&mut store, GeometryCapability::Minimal)
            .import_file(file.path(), &config())
            .unwrap();

        let layer = store.layer(outcome.layer_id).unwrap();
        let expected: Value = serde_json::from_str(THREE_POINTS).unwrap();
        assert_eq!(layer.metadata.original_payload.as_ref(), Some(&expected));
        // Canonical geometry approximated from the first feature.
        assert_eq!(layer.geometry_kind, GeometryKind::Point);
        // Statistics stay null in degraded mode.
        assert!(layer.stats.point_count.is_none());
        assert!(layer.stats.area_km2.is_none());
    }

    #[test]
    fn degraded_mode_rejects_non_geojson() {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(b"lon,lat\n1,2\n").unwrap();
        let mut store = MemoryStore::new();
        let result = ImportService::new(&mut store, GeometryCapability::Minimal)
            .import_file(f.path(), &config());
        assert!(matches!(result, Err(PipelineError::MissingCapability(_))));
    }

    #[test]
    fn preview_does_not_write_to_store() {
        let file = geojson_file(THREE_POINTS);
        let mut store = MemoryStore::new();
        let service = ImportService::new(&mut store, GeometryCapability::Full);
        let preview = service.preview(file.path()).unwrap();

        assert_eq!(preview.feature_count, 3);
        assert_eq!(preview.main_geometry_type.as_deref(), Some("Point"));
        assert_eq!(preview.geometry_types["Point"], 3);
        assert_eq!(preview.file_format, FileFormat::GeoJson);

        assert!(store.layers().is_empty());
        assert!(store.uploads().is_empty());
    }
}
