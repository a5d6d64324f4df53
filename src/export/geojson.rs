use log::debug;

use crate::error::{PipelineError, Result};
use crate::types::Layer;

/// Render the layer as a single GeoJSON feature.
///
/// Degraded-mode layers replay the original payload stored at import time
/// instead of re-deriving from the canonical geometry, which may be only an
/// approximation of it.
pub fn render(layer: &Layer) -> Result<Vec<u8>> {
    let value = if let Some(payload) = &layer.metadata.original_payload {
        debug!("layer {}: replaying original GeoJSON payload", layer.id);
        payload.clone()
    } else {
        layer.to_geojson_feature()
    };
    serde_json::to_vec_pretty(&value)
        .map_err(|e| PipelineError::Validation(anyhow::anyhow!("GeoJSON serialization: {e}")))
}
