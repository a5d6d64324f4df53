use std::collections::BTreeMap;

use geo::{BoundingRect, Geometry};
use serde_json::{Map, Value};

use crate::types::GeometryKind;

/// One parsed feature: a geometry plus its attribute properties. Coordinates
/// stay in the feature set's declared CRS until normalization.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>, properties: Map<String, Value>) -> Self {
        Self { geometry, properties }
    }

    pub fn bare(geometry: Geometry<f64>) -> Self {
        Self { geometry, properties: Map::new() }
    }
}

/// Source coordinate reference system of a feature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCrs {
    Epsg(u32),
    Undeclared,
}

impl SourceCrs {
    pub const WGS84: SourceCrs = SourceCrs::Epsg(4326);

    pub fn is_wgs84(&self) -> bool {
        matches!(self, SourceCrs::Epsg(4326))
    }

    /// PROJ.4 definition for the EPSG codes this pipeline recognizes:
    /// geographic WGS84/NAD83, Web Mercator and UTM zones.
    pub fn proj4_definition(&self) -> Option<String> {
        let code = match self {
            SourceCrs::Epsg(code) => *code,
            SourceCrs::Undeclared => return None,
        };
        match code {
            4326 => Some("+proj=longlat +datum=WGS84 +no_defs +type=crs".to_string()),
            4269 => Some("+proj=longlat +datum=NAD83 +no_defs +type=crs".to_string()),
            3857 => Some(
                "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 \
                 +units=m +no_defs +type=crs"
                    .to_string(),
            ),
            32601..=32660 => Some(format!(
                "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs +type=crs",
                code - 32600
            )),
            32701..=32760 => Some(format!(
                "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs +type=crs",
                code - 32700
            )),
            26901..=26923 => Some(format!(
                "+proj=utm +zone={} +datum=NAD83 +units=m +no_defs +type=crs",
                code - 26900
            )),
            _ => None,
        }
    }

    pub fn to_string_tag(&self) -> String {
        match self {
            SourceCrs::Epsg(code) => format!("EPSG:{code}"),
            SourceCrs::Undeclared => "Unknown".to_string(),
        }
    }

    /// Whether coordinates in this CRS are angular degrees (as opposed to
    /// projected meters).
    pub fn is_geographic(&self) -> bool {
        matches!(self, SourceCrs::Epsg(4326) | SourceCrs::Epsg(4269) | SourceCrs::Undeclared)
    }
}

/// Total bounding box: min-lon, min-lat, max-lon, max-lat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn from_point(x: f64, y: f64) -> Self {
        Self { min_x: x, min_y: y, max_x: x, max_y: y }
    }

    pub fn extend(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn merge(self, other: Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// The parsed, pre-persistence collection of features from one source file.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub features: Vec<Feature>,
    pub crs: SourceCrs,
}

impl FeatureSet {
    pub fn new(features: Vec<Feature>, crs: SourceCrs) -> Self {
        Self { features, crs }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Bounding box over all feature geometries.
    pub fn bounds(&self) -> Option<Bounds> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.bounding_rect())
            .map(|r| Bounds {
                min_x: r.min().x,
                min_y: r.min().y,
                max_x: r.max().x,
                max_y: r.max().y,
            })
            .reduce(Bounds::merge)
    }

    /// Histogram of geometry kind names, insertion-independent ordering.
    pub fn kind_histogram(&self) -> BTreeMap<String, usize> {
        let mut histogram = BTreeMap::new();
        for feature in &self.features {
            if let Some(kind) = GeometryKind::of(&feature.geometry) {
                *histogram.entry(kind.as_str().to_string()).or_insert(0) += 1;
            }
        }
        histogram
    }
}

/// Reduced surface the validator and layer builder consume. Implemented by
/// the full-fidelity feature set and by the minimal degraded-mode adapter, so
/// both pass through the same validation path.
pub trait FeatureSetView {
    fn feature_count(&self) -> usize;
    fn bounds(&self) -> Option<Bounds>;
    /// Distinct geometry type names present in the set.
    fn geometry_kind_names(&self) -> Vec<String>;
    /// Geometry type name histogram.
    fn kind_histogram(&self) -> BTreeMap<String, usize>;
    fn crs_tag(&self) -> String;
}

impl FeatureSetView for FeatureSet {
    fn feature_count(&self) -> usize {
        self.len()
    }

    fn bounds(&self) -> Option<Bounds> {
        FeatureSet::bounds(self)
    }

    fn geometry_kind_names(&self) -> Vec<String> {
        FeatureSet::kind_histogram(self).into_keys().collect()
    }

    fn kind_histogram(&self) -> BTreeMap<String, usize> {
        FeatureSet::kind_histogram(self)
    }

    fn crs_tag(&self) -> String {
        self.crs.to_string_tag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Coord, LineString};

    #[test]
    fn bounds_cover_all_features() {
        let set = FeatureSet::new(
            vec![
                Feature::bare(Geometry::Point(point!(x: 1.0, y: 2.0))),
                Feature::bare(Geometry::LineString(LineString(vec![
                    Coord { x: -3.0, y: 0.0 },
                    Coord { x: 0.5, y: 7.0 },
                ]))),
            ],
            SourceCrs::WGS84,
        );
        let b = set.bounds().unwrap();
        assert_eq!(b.to_array(), [-3.0, 0.0, 1.0, 7.0]);
    }

    #[test]
    fn utm_proj4_zones() {
        assert!(SourceCrs::Epsg(32633).proj4_definition().unwrap().contains("+zone=33"));
        assert!(SourceCrs::Epsg(32733).proj4_definition().unwrap().contains("+south"));
        assert!(SourceCrs::Epsg(26915).proj4_definition().unwrap().contains("NAD83"));
        assert!(SourceCrs::Epsg(2154).proj4_definition().is_none());
    }
}
