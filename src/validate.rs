use crate::error::{PipelineError, Result};
use crate::feature_set::FeatureSetView;
use crate::types::GeometryKind;

/// Feature-count ceiling enforced before persistence.
pub const MAX_FEATURES: usize = 10_000;

/// Enforce the feature ceiling and the geometry-type whitelist. Runs on the
/// view surface, after normalization, so degraded-mode feature sets are
/// validated the same way as full ones.
pub fn validate(view: &dyn FeatureSetView) -> Result<()> {
    let count = view.feature_count();
    if count == 0 {
        return Err(PipelineError::NoGeometryFound(
            "file contains no valid geospatial data".to_string(),
        ));
    }
    if count > MAX_FEATURES {
        return Err(PipelineError::TooManyFeatures { count, max: MAX_FEATURES });
    }

    for name in view.geometry_kind_names() {
        if name.parse::<GeometryKind>().is_err() {
            return Err(PipelineError::UnsupportedGeometryType(name));
        }
    }
    Ok(())
}
