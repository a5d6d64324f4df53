mod csv;
mod geojson;
mod gpx;
mod kml;
mod shp;
mod wkt;

use std::io::{Cursor, Write};

use log::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::common::sanitize_name;
use crate::error::{PipelineError, Result};
use crate::store::LayerStore;
use crate::types::{ExportFormat, Layer};

/// One rendered export: payload, its MIME type and a download filename
/// derived from the sanitized layer name and id.
pub struct Export {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub filename: String,
}

/// Render a stored layer into an interchange format.
///
/// Fails with `UnsupportedFormat` for format/geometry combinations that have
/// no defined mapping (GPX for non-point layers).
pub fn export_layer(layer: &Layer, format: ExportFormat) -> Result<Export> {
    info!("exporting layer {} as {format}", layer.id);
    let bytes = match format {
        ExportFormat::GeoJson => geojson::render(layer)?,
        ExportFormat::Kml => kml::render(layer)?,
        ExportFormat::Kmz => kml::render_kmz(layer)?,
        ExportFormat::Shp => shp::render(layer)?,
        ExportFormat::Csv => csv::render(layer)?,
        ExportFormat::Wkt => wkt::render(layer)?,
        ExportFormat::Gpx => gpx::render(layer)?,
    };
    Ok(Export {
        bytes,
        mime_type: format.mime_type(),
        filename: export_filename(layer, format),
    })
}

/// Export several layers into one ZIP archive. Layers that fail to resolve
/// or to export are skipped; the archive holds the successes.
pub fn export_batch(
    store: &dyn LayerStore,
    layer_ids: &[u64],
    format: ExportFormat,
) -> Result<Export> {
    let mut cursor = Cursor::new(Vec::new());
    let mut archive = ZipWriter::new(&mut cursor);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut exported = 0usize;
    for &id in layer_ids {
        let Some(layer) = store.layer(id) else {
            warn!("batch export: layer {id} not found, skipping");
            continue;
        };
        match export_layer(layer, format) {
            Ok(export) => {
                archive
                    .start_file(export.filename.as_str(), options)
                    .and_then(|()| archive.write_all(&export.bytes).map_err(Into::into))
                    .map_err(|e| {
                        PipelineError::Validation(anyhow::anyhow!("failed to build archive: {e}"))
                    })?;
                exported += 1;
            }
            Err(e) => warn!("batch export: layer {id} failed ({e}), skipping"),
        }
    }

    archive
        .finish()
        .map_err(|e| PipelineError::Validation(anyhow::anyhow!("failed to finish archive: {e}")))?;
    info!("batch export: {exported} of {} layers archived", layer_ids.len());

    Ok(Export {
        bytes: cursor.into_inner(),
        mime_type: "application/zip",
        filename: format!("export_{}_layers.{}.zip", exported, format.extension()),
    })
}

fn export_filename(layer: &Layer, format: ExportFormat) -> String {
    format!(
        "{}_{}.{}",
        sanitize_name(&layer.name),
        layer.id,
        format.extension()
    )
}

/// Escape text for embedding in XML element content.
pub(crate) fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Layer fixtures shared by the per-format export tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use geo::{point, Coord, LineString, MultiPoint, Polygon};

    use crate::types::{
        FileFormat, GeometryKind, Layer, LayerMetadata, LayerStats, LayerStatus, LayerType,
        ProcessingInfo, SourceInfo, StyleConfig,
    };

    pub(crate) fn base_layer(id: u64, name: &str) -> Layer {
        Layer {
            id,
            name: name.to_string(),
            description: Some("three wells".to_string()),
            layer_type: LayerType::Deposit,
            geometry_kind: GeometryKind::MultiPoint,
            source_format: FileFormat::Csv,
            status: LayerStatus::Active,
            is_visible: true,
            is_public: true,
            style: StyleConfig::default(),
            metadata: LayerMetadata {
                properties: vec![],
                source: SourceInfo {
                    original_crs: "EPSG:4326".to_string(),
                    feature_count: 3,
                    geometry_types: [("Point".to_string(), 3)].into_iter().collect(),
                    bounds: [1.0, 1.0, 3.0, 3.0],
                },
                processing: ProcessingInfo { import_date: Utc::now(), file_size_bytes: 64 },
                geojson: None,
                original_payload: None,
            },
            stats: LayerStats { point_count: Some(3), ..Default::default() },
            geometry: geo::Geometry::MultiPoint(MultiPoint(vec![
                point!(x: 1.0, y: 1.0),
                point!(x: 2.0, y: 2.0),
                point!(x: 3.0, y: 3.0),
            ])),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn point_layer(id: u64, name: &str) -> Layer {
        base_layer(id, name)
    }

    pub(crate) fn polygon_layer(id: u64, name: &str) -> Layer {
        let mut layer = base_layer(id, name);
        layer.geometry_kind = GeometryKind::Polygon;
        layer.geometry = geo::Geometry::Polygon(Polygon::new(
            LineString(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 1.0, y: 0.0 },
                Coord { x: 1.0, y: 1.0 },
                Coord { x: 0.0, y: 1.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        ));
        layer.stats = LayerStats { area_km2: Some(12_308.62), ..Default::default() };
        layer
    }

    pub(crate) fn line_layer(id: u64, name: &str) -> Layer {
        let mut layer = base_layer(id, name);
        layer.geometry_kind = GeometryKind::LineString;
        layer.geometry = geo::Geometry::LineString(LineString(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
        ]));
        layer.stats = LayerStats { length_km: Some(111.2), ..Default::default() };
        layer
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{point_layer, polygon_layer};
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn filenames_are_sanitized() {
        let layer = point_layer(7, "Gold Wells (north)");
        let export = export_layer(&layer, ExportFormat::GeoJson).unwrap();
        assert_eq!(export.filename, "Gold_Wells_north_7.geojson");
        assert_eq!(export.mime_type, "application/geo+json");
    }

    #[test]
    fn batch_export_skips_missing_layers() {
        let mut store = MemoryStore::new();
        let id = store.allocate_layer_id();
        store.insert_layer(point_layer(id, "wells")).unwrap();

        let export = export_batch(&store, &[id, 999], ExportFormat::GeoJson).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(export.bytes)).unwrap();
        assert_eq!(archive.len(), 1, "only the valid layer is archived");
        assert!(archive.by_index(0).unwrap().name().contains("wells"));
    }

    #[test]
    fn batch_export_skips_per_layer_failures() {
        let mut store = MemoryStore::new();
        let id = store.allocate_layer_id();
        store.insert_layer(polygon_layer(id, "area")).unwrap();
        let id2 = store.allocate_layer_id();
        store.insert_layer(point_layer(id2, "wells")).unwrap();

        // GPX rejects polygons; the batch still succeeds with one entry.
        let export = export_batch(&store, &[id, id2], ExportFormat::Gpx).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(export.bytes)).unwrap();
        assert_eq!(archive.len(), 1);
    }
}
