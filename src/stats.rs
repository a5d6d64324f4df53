use geo::{Geometry, GeodesicArea};

use crate::common::haversine_length_m;
use crate::types::{GeometryFamily, GeometryKind, LayerStats};

/// Derived measurements for a canonical geometry: geodesic area in km² for
/// polygonal layers, haversine length in km for linear layers, feature count
/// for point layers. Values are rounded to two decimals.
///
/// Never called for degraded-mode imports; those layers keep all fields null.
pub fn compute_stats(kind: GeometryKind, geometry: &Geometry<f64>) -> LayerStats {
    let mut stats = LayerStats::default();
    match kind.family() {
        GeometryFamily::Polygon => {
            let area_m2 = match geometry {
                Geometry::Polygon(p) => p.geodesic_area_unsigned(),
                Geometry::MultiPolygon(mp) => mp.geodesic_area_unsigned(),
                _ => 0.0,
            };
            stats.area_km2 = Some(round2(area_m2 / 1_000_000.0));
        }
        GeometryFamily::Line => {
            let length_m = match geometry {
                Geometry::LineString(ls) => haversine_length_m(ls),
                Geometry::MultiLineString(mls) => mls.0.iter().map(haversine_length_m).sum(),
                _ => 0.0,
            };
            stats.length_km = Some(round2(length_m / 1_000.0));
        }
        GeometryFamily::Point => {
            let count = match geometry {
                Geometry::MultiPoint(mp) => mp.0.len() as u64,
                _ => 1,
            };
            stats.point_count = Some(count);
        }
    }
    stats
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
