use std::path::Path;

use serde_json::Value;

use crate::capability::MinimalFeatureSet;
use crate::error::{PipelineError, Result};
use crate::feature_set::{Feature, FeatureSet, SourceCrs};

/// Parse a GeoJSON file with the full geometry toolkit. Accepts `Feature`
/// and `FeatureCollection` top-level types; everything else fails.
pub fn parse_geojson(path: &Path) -> Result<FeatureSet> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::UnreadableFile(format!("{}: {e}", path.display())))?;
    let document: geojson::GeoJson = content
        .parse()
        .map_err(|e| PipelineError::UnreadableFile(format!("invalid GeoJSON: {e}")))?;

    let features = match document {
        geojson::GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(convert_feature)
            .collect(),
        geojson::GeoJson::Feature(feature) => convert_feature(feature).into_iter().collect(),
        geojson::GeoJson::Geometry(_) => {
            return Err(PipelineError::UnreadableFile(
                "unsupported GeoJSON top-level type: Geometry (expected Feature or FeatureCollection)"
                    .to_string(),
            ))
        }
    };

    // GeoJSON coordinates are WGS84 by definition (RFC 7946).
    Ok(FeatureSet::new(features, SourceCrs::WGS84))
}

fn convert_feature(feature: geojson::Feature) -> Option<Feature> {
    let geometry = feature.geometry?;
    let geometry = geo::Geometry::<f64>::try_from(geometry).ok()?;
    let properties = feature.properties.unwrap_or_default();
    Some(Feature::new(geometry, properties))
}

/// Degraded-mode parse: raw JSON only, payload kept verbatim.
pub fn parse_minimal(path: &Path) -> Result<MinimalFeatureSet> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::UnreadableFile(format!("{}: {e}", path.display())))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| PipelineError::UnreadableFile(format!("invalid JSON: {e}")))?;
    MinimalFeatureSet::from_geojson(value).map_err(|e| PipelineError::UnreadableFile(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_set::FeatureSetView;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".geojson").tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parses_feature_collection() {
        let f = write_temp(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Point","coordinates":[1.5,2.5]},"properties":{"name":"site"}}
            ]}"#,
        );
        let set = parse_geojson(f.path()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.features[0].properties["name"], "site");
        assert!(matches!(set.features[0].geometry, geo::Geometry::Point(_)));
    }

    #[test]
    fn parses_single_feature() {
        let f = write_temp(
            r#"{"type":"Feature","geometry":{"type":"LineString","coordinates":[[0,0],[1,1]]},"properties":null}"#,
        );
        let set = parse_geojson(f.path()).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn rejects_bare_geometry() {
        let f = write_temp(r#"{"type":"Point","coordinates":[0,0]}"#);
        assert!(matches!(
            parse_geojson(f.path()),
            Err(PipelineError::UnreadableFile(_))
        ));
    }

    #[test]
    fn minimal_parse_preserves_payload() {
        let content = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"Point","coordinates":[3.0,4.0]},"properties":{}}
        ]}"#;
        let f = write_temp(content);
        let set = parse_minimal(f.path()).unwrap();
        assert_eq!(set.feature_count(), 1);
        let expected: Value = serde_json::from_str(content).unwrap();
        assert_eq!(set.payload(), &expected);
    }
}
