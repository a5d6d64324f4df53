use anyhow::{anyhow, bail, Result};
use log::warn;
use serde_json::{Map, Value};

use crate::feature_set::{Bounds, FeatureSetView};

/// Whether the full geometry toolkit is available to this process.
///
/// Resolved once at startup by the composition root and injected into the
/// services; parsers and the normalizer branch on it through the
/// [`FeatureSetView`] strategy surface instead of inspecting types at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryCapability {
    /// Reprojection, validity filtering and statistics are available.
    Full,
    /// Degraded mode: JSON-only parsing, no reprojection, no validity
    /// checks, no statistics.
    Minimal,
}

impl GeometryCapability {
    /// Detect the capability for this process. `GEOLAYERS_DEGRADED=1` forces
    /// the minimal adapter (mirrors running without the optional toolkit).
    pub fn detect() -> Self {
        match std::env::var("GEOLAYERS_DEGRADED") {
            Ok(v) if v == "1" || v.eq_ignore_ascii_case("true") => {
                warn!("geometry toolkit disabled by environment; running degraded");
                GeometryCapability::Minimal
            }
            _ => GeometryCapability::Full,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, GeometryCapability::Full)
    }
}

/// Degraded-mode stand-in for a parsed feature set, backed by the raw GeoJSON
/// value. Exposes only feature iteration metadata: count, a manually folded
/// bounding box and the distinct geometry type names. Sufficient to build a
/// layer, not to compute statistics or guarantee projection correctness.
#[derive(Debug, Clone)]
pub struct MinimalFeatureSet {
    /// The original interchange payload, verbatim.
    payload: Value,
    feature_count: usize,
    bounds: Option<Bounds>,
    /// (name, count) in first-seen order.
    kind_counts: Vec<(String, usize)>,
    first_geometry: Option<Value>,
    properties: Vec<Map<String, Value>>,
}

impl MinimalFeatureSet {
    /// Build from a parsed GeoJSON document. Accepts `Feature` and
    /// `FeatureCollection` top-level types only.
    pub fn from_geojson(payload: Value) -> Result<Self> {
        let top = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("GeoJSON document has no type"))?;

        let features: Vec<&Value> = match top {
            "FeatureCollection" => payload
                .get("features")
                .and_then(Value::as_array)
                .map(|fs| fs.iter().collect())
                .unwrap_or_default(),
            "Feature" => vec![&payload],
            other => bail!("unsupported GeoJSON top-level type: {other}"),
        };

        let mut bounds: Option<Bounds> = None;
        let mut kind_counts: Vec<(String, usize)> = Vec::new();
        let mut first_geometry = None;
        let mut properties = Vec::with_capacity(features.len());

        for feature in &features {
            let geometry = feature.get("geometry").filter(|g| !g.is_null());
            if let Some(geometry) = geometry {
                if first_geometry.is_none() {
                    first_geometry = Some(geometry.clone());
                }
                if let Some(kind) = geometry.get("type").and_then(Value::as_str) {
                    match kind_counts.iter_mut().find(|(k, _)| k == kind) {
                        Some((_, n)) => *n += 1,
                        None => kind_counts.push((kind.to_string(), 1)),
                    }
                }
                if let Some(coords) = geometry.get("coordinates") {
                    fold_coordinates(coords, &mut bounds);
                }
            }
            properties.push(
                feature
                    .get("properties")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            );
        }

        let feature_count = features.len();
        Ok(Self {
            payload,
            feature_count,
            bounds,
            kind_counts,
            first_geometry,
            properties,
        })
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn first_geometry(&self) -> Option<&Value> {
        self.first_geometry.as_ref()
    }

    pub fn properties(&self) -> &[Map<String, Value>] {
        &self.properties
    }
}

impl FeatureSetView for MinimalFeatureSet {
    fn feature_count(&self) -> usize {
        self.feature_count
    }

    fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    fn geometry_kind_names(&self) -> Vec<String> {
        self.kind_counts.iter().map(|(k, _)| k.clone()).collect()
    }

    fn kind_histogram(&self) -> std::collections::BTreeMap<String, usize> {
        self.kind_counts.iter().cloned().collect()
    }

    fn crs_tag(&self) -> String {
        // GeoJSON is WGS84 by definition; degraded mode takes it on faith.
        "EPSG:4326".to_string()
    }
}

/// Every leaf `[x, y, ...]` position in a GeoJSON coordinates value, folded
/// into the running bounding box.
fn fold_coordinates(value: &Value, bounds: &mut Option<Bounds>) {
    let Some(arr) = value.as_array() else { return };
    if arr.len() >= 2 && arr[0].is_number() && arr[1].is_number() {
        let (Some(x), Some(y)) = (arr[0].as_f64(), arr[1].as_f64()) else { return };
        match bounds {
            Some(b) => b.extend(x, y),
            None => *bounds = Some(Bounds::from_point(x, y)),
        }
        return;
    }
    for inner in arr {
        fold_coordinates(inner, bounds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collection() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [10.0, 20.0]},
                    "properties": {"name": "a"},
                },
                {
                    "type": "Feature",
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[-5.0, 1.0], [3.0, 25.0]],
                    },
                    "properties": {"name": "b"},
                },
            ],
        })
    }

    #[test]
    fn minimal_set_counts_and_bounds() {
        let set = MinimalFeatureSet::from_geojson(collection()).unwrap();
        assert_eq!(set.feature_count(), 2);
        assert_eq!(set.bounds().unwrap().to_array(), [-5.0, 1.0, 10.0, 25.0]);
        assert_eq!(set.geometry_kind_names(), vec!["Point", "LineString"]);
        assert_eq!(set.properties().len(), 2);
    }

    #[test]
    fn minimal_set_keeps_payload_verbatim() {
        let payload = collection();
        let set = MinimalFeatureSet::from_geojson(payload.clone()).unwrap();
        assert_eq!(set.payload(), &payload);
    }

    #[test]
    fn minimal_set_rejects_bare_geometry() {
        let geom = json!({"type": "Point", "coordinates": [0.0, 0.0]});
        assert!(MinimalFeatureSet::from_geojson(geom).is_err());
    }
}
