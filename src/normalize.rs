use anyhow::{anyhow, Context};
use geo::algorithm::map_coords::MapCoords;
use geo::{Coord, CoordsIter, Validation};
use log::{debug, info};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::error::{PipelineError, Result};
use crate::feature_set::{FeatureSet, SourceCrs};

/// Normalize a full-fidelity feature set: reproject to geographic WGS84 when
/// the declared CRS differs (assign WGS84 when undeclared), then drop empty
/// and topologically invalid geometries.
///
/// Degraded-mode feature sets never reach this function; the minimal adapter
/// passes through the pipeline untouched.
pub fn normalize(set: FeatureSet) -> Result<FeatureSet> {
    let set = reproject_to_wgs84(set)?;

    let before = set.features.len();
    let features: Vec<_> = set
        .features
        .into_iter()
        .filter(|f| f.geometry.coords_count() > 0)
        .filter(|f| f.geometry.is_valid())
        .collect();
    if features.len() < before {
        debug!("dropped {} empty/invalid geometries", before - features.len());
    }

    Ok(FeatureSet::new(features, SourceCrs::WGS84))
}

fn reproject_to_wgs84(set: FeatureSet) -> Result<FeatureSet> {
    match set.crs {
        SourceCrs::Epsg(4326) => Ok(set),
        SourceCrs::Undeclared => {
            // No declaration: taken as WGS84 rather than guessed.
            Ok(FeatureSet::new(set.features, SourceCrs::WGS84))
        }
        crs => {
            let source_def = crs.proj4_definition().ok_or_else(|| {
                PipelineError::Validation(anyhow!(
                    "unsupported source coordinate system: {}",
                    crs.to_string_tag()
                ))
            })?;
            info!("reprojecting {} features from {}", set.features.len(), crs.to_string_tag());

            let from = Proj::from_proj_string(&source_def)
                .with_context(|| format!("failed to build source projection: {source_def}"))
                .map_err(PipelineError::Validation)?;
            let to = Proj::from_proj_string("+proj=longlat +datum=WGS84 +no_defs +type=crs")
                .context("failed to build target projection")
                .map_err(PipelineError::Validation)?;
            let angular_input = crs.is_geographic();

            let features = set
                .features
                .into_iter()
                .map(|mut feature| {
                    feature.geometry = feature
                        .geometry
                        .try_map_coords(|coord: Coord<f64>| -> anyhow::Result<Coord<f64>> {
                            // proj4 wants radians for angular CRSs, meters otherwise;
                            // longlat output comes back in radians.
                            let mut point = if angular_input {
                                (coord.x.to_radians(), coord.y.to_radians(), 0.0)
                            } else {
                                (coord.x, coord.y, 0.0)
                            };
                            transform(&from, &to, &mut point)
                                .map_err(|e| anyhow!("coordinate transform failed: {e}"))?;
                            Ok(Coord { x: point.0.to_degrees(), y: point.1.to_degrees() })
                        })?;
                    Ok(feature)
                })
                .collect::<anyhow::Result<Vec<_>>>()
                .map_err(PipelineError::Validation)?;

            Ok(FeatureSet::new(features, SourceCrs::WGS84))
        }
    }
}
