mod geojson;
mod kml;
#[cfg(feature = "raster")]
mod raster;
mod shp;
mod table;

use std::path::Path;

use log::info;

use crate::capability::{GeometryCapability, MinimalFeatureSet};
use crate::error::{PipelineError, Result};
use crate::feature_set::FeatureSet;
use crate::types::FileFormat;

/// Upload size ceiling, checked before any parsing starts.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Output of the parsing stage: a full-fidelity feature set, or the minimal
/// JSON-backed adapter when the geometry toolkit is unavailable.
pub enum ParsedSource {
    Full(FeatureSet),
    Minimal(MinimalFeatureSet),
}

/// Parse `path` according to its detected format.
///
/// `scratch` is the per-attempt scratch directory archives and KMZ containers
/// are extracted into; the caller owns its lifetime.
pub fn parse(
    path: &Path,
    format: FileFormat,
    capability: GeometryCapability,
    scratch: &Path,
) -> Result<ParsedSource> {
    let size = std::fs::metadata(path)
        .map_err(|e| PipelineError::UnreadableFile(format!("{}: {e}", path.display())))?
        .len();
    if size == 0 {
        return Err(PipelineError::UnreadableFile(format!(
            "{} is empty",
            path.display()
        )));
    }
    if size > MAX_FILE_SIZE {
        return Err(PipelineError::UnreadableFile(format!(
            "file too large: {:.1}MB (max: {}MB)",
            size as f64 / 1024.0 / 1024.0,
            MAX_FILE_SIZE / 1024 / 1024
        )));
    }

    if !capability.is_full() {
        // Degraded mode: only the JSON-backed GeoJSON path works without the
        // geometry toolkit.
        return match format {
            FileFormat::GeoJson => Ok(ParsedSource::Minimal(geojson::parse_minimal(path)?)),
            other => Err(PipelineError::MissingCapability(format!(
                "geometry toolkit required to import {other} files"
            ))),
        };
    }

    info!("parsing {} as {format}", path.display());
    let set = match format {
        FileFormat::Kml => kml::parse_kml(path)?,
        FileFormat::Kmz => kml::parse_kmz(path, scratch)?,
        FileFormat::Shp => shp::parse_shapefile(path)?,
        FileFormat::ShpZip => shp::parse_zip_archive(path, scratch)?,
        FileFormat::ShpRar => shp::parse_rar_archive(path, scratch)?,
        FileFormat::GeoJson => geojson::parse_geojson(path)?,
        FileFormat::Csv => table::parse_csv(path)?,
        FileFormat::Txt => table::parse_txt(path)?,
        #[cfg(feature = "raster")]
        FileFormat::Tiff => raster::parse_tiff(path)?,
        #[cfg(not(feature = "raster"))]
        FileFormat::Tiff => {
            return Err(PipelineError::MissingCapability(
                "raster toolkit is not compiled in (enable the `raster` feature)".to_string(),
            ))
        }
    };
    Ok(ParsedSource::Full(set))
}
