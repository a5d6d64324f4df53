use geo::{Geometry, MultiLineString, MultiPoint, MultiPolygon};
use log::warn;

use crate::error::{PipelineError, Result};
use crate::feature_set::FeatureSet;
use crate::types::{GeometryFamily, GeometryKind};

/// The canonical geometry for a layer, merged from a feature set.
pub struct MergedGeometry {
    pub geometry: Geometry<f64>,
    pub kind: GeometryKind,
}

/// Collapse a feature set into one canonical geometry.
///
/// A single feature is used verbatim and keeps its original tag. Multiple
/// features merge into the multi variant of the majority geometry family
/// (Point -> MultiPoint and so on); minority-family features survive only in
/// layer metadata, not in the canonical geometry.
pub fn merge_features(set: &FeatureSet) -> Result<MergedGeometry> {
    let mut kinds = Vec::with_capacity(set.features.len());
    for feature in &set.features {
        let kind = GeometryKind::of(&feature.geometry).ok_or_else(|| {
            PipelineError::UnsupportedGeometryType("GeometryCollection".to_string())
        })?;
        kinds.push(kind);
    }

    match set.features.len() {
        0 => Err(PipelineError::NoGeometryFound(
            "cannot merge an empty feature set".to_string(),
        )),
        1 => Ok(MergedGeometry {
            geometry: set.features[0].geometry.clone(),
            kind: kinds[0],
        }),
        _ => {
            let majority = majority_kind(&kinds);
            let family = majority.family();
            let members: Vec<&Geometry<f64>> = set
                .features
                .iter()
                .zip(&kinds)
                .filter(|(_, k)| k.family() == family)
                .map(|(f, _)| &f.geometry)
                .collect();
            if members.len() < set.features.len() {
                warn!(
                    "mixed geometry types: merging {} of {} features as {}",
                    members.len(),
                    set.features.len(),
                    majority.multi().as_str()
                );
            }
            Ok(MergedGeometry {
                geometry: merge_family(family, &members),
                kind: majority.multi(),
            })
        }
    }
}

/// Majority by exact kind count; ties break toward the kind seen first.
fn majority_kind(kinds: &[GeometryKind]) -> GeometryKind {
    let mut counts: Vec<(GeometryKind, usize)> = Vec::new();
    for &kind in kinds {
        match counts.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, n)) => *n += 1,
            None => counts.push((kind, 1)),
        }
    }
    counts
        .into_iter()
        .max_by_key(|&(_, n)| n)
        .map(|(k, _)| k)
        .expect("non-empty kind list")
}

/// Merge same-family geometries, flattening any multi members.
fn merge_family(family: GeometryFamily, members: &[&Geometry<f64>]) -> Geometry<f64> {
    match family {
        GeometryFamily::Point => {
            let mut points = Vec::new();
            for geometry in members {
                match geometry {
                    Geometry::Point(p) => points.push(*p),
                    Geometry::MultiPoint(mp) => points.extend(mp.0.iter().copied()),
                    _ => {}
                }
            }
            Geometry::MultiPoint(MultiPoint(points))
        }
        GeometryFamily::Line => {
            let mut lines = Vec::new();
            for geometry in members {
                match geometry {
                    Geometry::LineString(ls) => lines.push(ls.clone()),
                    Geometry::MultiLineString(mls) => lines.extend(mls.0.iter().cloned()),
                    _ => {}
                }
            }
            Geometry::MultiLineString(MultiLineString(lines))
        }
        GeometryFamily::Polygon => {
            let mut polygons = Vec::new();
            for geometry in members {
                match geometry {
                    Geometry::Polygon(p) => polygons.push(p.clone()),
                    Geometry::MultiPolygon(mp) => polygons.extend(mp.0.iter().cloned()),
                    _ => {}
                }
            }
            Geometry::MultiPolygon(MultiPolygon(polygons))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_set::{Feature, SourceCrs};
    use geo::{point, Coord, LineString};

    fn set_of(geometries: Vec<Geometry<f64>>) -> FeatureSet {
        FeatureSet::new(
            geometries.into_iter().map(Feature::bare).collect(),
            SourceCrs::WGS84,
        )
    }

    #[test]
    fn single_feature_stays_verbatim() {
        let set = set_of(vec![Geometry::Point(point!(x: 3.0, y: 4.0))]);
        let merged = merge_features(&set).unwrap();
        assert_eq!(merged.kind, GeometryKind::Point);
        assert!(matches!(merged.geometry, Geometry::Point(_)));
    }

    #[test]
    fn points_merge_in_order() {
        let set = set_of(vec![
            Geometry::Point(point!(x: 0.0, y: 0.0)),
            Geometry::Point(point!(x: 1.0, y: 1.0)),
            Geometry::Point(point!(x: 2.0, y: 2.0)),
        ]);
        let merged = merge_features(&set).unwrap();
        assert_eq!(merged.kind, GeometryKind::MultiPoint);
        match merged.geometry {
            Geometry::MultiPoint(mp) => {
                assert_eq!(mp.0.len(), 3);
                assert_eq!(mp.0[0].x(), 0.0);
                assert_eq!(mp.0[2].x(), 2.0);
            }
            other => panic!("expected MultiPoint, got {other:?}"),
        }
    }

    #[test]
    fn majority_family_wins_and_minority_is_dropped() {
        let line = Geometry::LineString(LineString(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
        ]));
        let set = set_of(vec![
            Geometry::Point(point!(x: 0.0, y: 0.0)),
            Geometry::Point(point!(x: 1.0, y: 0.0)),
            line,
        ]);
        let merged = merge_features(&set).unwrap();
        assert_eq!(merged.kind, GeometryKind::MultiPoint);
        match merged.geometry {
            Geometry::MultiPoint(mp) => assert_eq!(mp.0.len(), 2),
            other => panic!("expected MultiPoint, got {other:?}"),
        }
    }

    #[test]
    fn multipoint_members_flatten() {
        let set = set_of(vec![
            Geometry::MultiPoint(MultiPoint(vec![point!(x: 0.0, y: 0.0), point!(x: 1.0, y: 0.0)])),
            Geometry::Point(point!(x: 2.0, y: 0.0)),
            Geometry::Point(point!(x: 2.5, y: 0.0)),
        ]);
        let merged = merge_features(&set).unwrap();
        match merged.geometry {
            Geometry::MultiPoint(mp) => assert_eq!(mp.0.len(), 4),
            other => panic!("expected MultiPoint, got {other:?}"),
        }
    }
}
