use std::str::FromStr;

use anyhow::{anyhow, Result};
use geo::Geometry;
use serde::{Deserialize, Serialize};

/// The six geometry tags a layer may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

/// Geometry family: single and multi variants collapse together for merging
/// and statistics purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryFamily {
    Point,
    Line,
    Polygon,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::MultiPolygon => "MultiPolygon",
        }
    }

    pub fn family(&self) -> GeometryFamily {
        match self {
            GeometryKind::Point | GeometryKind::MultiPoint => GeometryFamily::Point,
            GeometryKind::LineString | GeometryKind::MultiLineString => GeometryFamily::Line,
            GeometryKind::Polygon | GeometryKind::MultiPolygon => GeometryFamily::Polygon,
        }
    }

    /// The multi-variant of this kind's family.
    pub fn multi(&self) -> GeometryKind {
        match self.family() {
            GeometryFamily::Point => GeometryKind::MultiPoint,
            GeometryFamily::Line => GeometryKind::MultiLineString,
            GeometryFamily::Polygon => GeometryKind::MultiPolygon,
        }
    }

    /// Tag of a concrete geometry, if it is one of the six supported kinds.
    pub fn of(geometry: &Geometry<f64>) -> Option<GeometryKind> {
        match geometry {
            Geometry::Point(_) => Some(GeometryKind::Point),
            Geometry::Line(_) | Geometry::LineString(_) => Some(GeometryKind::LineString),
            Geometry::Polygon(_) => Some(GeometryKind::Polygon),
            Geometry::MultiPoint(_) => Some(GeometryKind::MultiPoint),
            Geometry::MultiLineString(_) => Some(GeometryKind::MultiLineString),
            Geometry::MultiPolygon(_) => Some(GeometryKind::MultiPolygon),
            Geometry::Rect(_) | Geometry::Triangle(_) => Some(GeometryKind::Polygon),
            Geometry::GeometryCollection(_) => None,
        }
    }
}

impl FromStr for GeometryKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "point" => Ok(GeometryKind::Point),
            "linestring" => Ok(GeometryKind::LineString),
            "polygon" => Ok(GeometryKind::Polygon),
            "multipoint" => Ok(GeometryKind::MultiPoint),
            "multilinestring" => Ok(GeometryKind::MultiLineString),
            "multipolygon" => Ok(GeometryKind::MultiPolygon),
            _ => Err(anyhow!("unknown geometry type: {s}")),
        }
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_and_multi() {
        assert_eq!(GeometryKind::Point.multi(), GeometryKind::MultiPoint);
        assert_eq!(GeometryKind::LineString.multi(), GeometryKind::MultiLineString);
        assert_eq!(GeometryKind::MultiPolygon.multi(), GeometryKind::MultiPolygon);
        assert_eq!(GeometryKind::MultiPoint.family(), GeometryFamily::Point);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("MULTIPOINT".parse::<GeometryKind>().unwrap(), GeometryKind::MultiPoint);
        assert!("GeometryCollection".parse::<GeometryKind>().is_err());
    }
}
