use std::io::Read;
use std::path::Path;

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use kml::Kml;
use log::warn;
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::feature_set::{Feature, FeatureSet, SourceCrs};

/// Parse a KML file: placemarks anywhere in the document, including nested
/// Folders and Documents. KML is always WGS84.
pub fn parse_kml(path: &Path) -> Result<FeatureSet> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::UnreadableFile(format!("{}: {e}", path.display())))?;
    let document: Kml = content
        .parse()
        .map_err(|e| PipelineError::UnreadableFile(format!("invalid KML: {e}")))?;

    let mut features = Vec::new();
    collect_placemarks(&document, &mut features);
    Ok(FeatureSet::new(features, SourceCrs::WGS84))
}

/// Parse a KMZ container: a ZIP whose first member ending in `.kml` is the
/// document. The member is extracted into the scratch directory and handed to
/// the KML parser.
pub fn parse_kmz(path: &Path, scratch: &Path) -> Result<FeatureSet> {
    let file = std::fs::File::open(path)
        .map_err(|e| PipelineError::UnreadableFile(format!("{}: {e}", path.display())))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| PipelineError::UnreadableFile(format!("invalid KMZ archive: {e}")))?;

    let member = (0..archive.len())
        .filter_map(|i| archive.name_for_index(i).map(|n| (i, n.to_string())))
        .find(|(_, name)| name.to_ascii_lowercase().ends_with(".kml"))
        .map(|(i, _)| i)
        .ok_or_else(|| {
            PipelineError::NoGeometryFound("KMZ archive contains no KML document".to_string())
        })?;

    let mut content = String::new();
    archive
        .by_index(member)
        .map_err(|e| PipelineError::UnreadableFile(format!("invalid KMZ member: {e}")))?
        .read_to_string(&mut content)
        .map_err(|e| PipelineError::UnreadableFile(format!("invalid KMZ member: {e}")))?;

    let extracted = scratch.join("doc.kml");
    std::fs::write(&extracted, content)
        .map_err(|e| PipelineError::UnreadableFile(format!("failed to stage KML: {e}")))?;
    parse_kml(&extracted)
}

fn collect_placemarks(node: &Kml, features: &mut Vec<Feature>) {
    match node {
        Kml::KmlDocument(doc) => {
            for element in &doc.elements {
                collect_placemarks(element, features);
            }
        }
        Kml::Document { elements, .. } | Kml::Folder { elements, .. } => {
            for element in elements {
                collect_placemarks(element, features);
            }
        }
        Kml::Placemark(placemark) => {
            // Placemarks without geometry carry no feature.
            let Some(kml_geometry) = &placemark.geometry else { return };
            let Some(geometry) = convert_geometry(kml_geometry) else {
                warn!("skipping placemark with unsupported KML geometry");
                return;
            };

            let mut properties = Map::new();
            if let Some(name) = &placemark.name {
                properties.insert("name".to_string(), Value::String(name.clone()));
            }
            if let Some(description) = &placemark.description {
                properties.insert("description".to_string(), Value::String(description.clone()));
            }
            features.push(Feature::new(geometry, properties));
        }
        _ => {}
    }
}

fn coord(c: &kml::types::Coord) -> Coord<f64> {
    Coord { x: c.x, y: c.y }
}

fn ring(r: &kml::types::LinearRing) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = r.coords.iter().map(coord).collect();
    if coords.len() >= 2 && coords[0] != coords[coords.len() - 1] {
        coords.push(coords[0]);
    }
    LineString(coords)
}

fn convert_geometry(geometry: &kml::types::Geometry) -> Option<Geometry<f64>> {
    use kml::types::Geometry as KmlGeometry;

    match geometry {
        KmlGeometry::Point(p) => Some(Geometry::Point(Point::from(coord(&p.coord)))),
        KmlGeometry::LineString(ls) => Some(Geometry::LineString(LineString(
            ls.coords.iter().map(coord).collect(),
        ))),
        KmlGeometry::LinearRing(r) => Some(Geometry::LineString(ring(r))),
        KmlGeometry::Polygon(p) => Some(Geometry::Polygon(Polygon::new(
            ring(&p.outer),
            p.inner.iter().map(ring).collect(),
        ))),
        KmlGeometry::MultiGeometry(multi) => convert_multi(multi),
        _ => None,
    }
}

/// A homogeneous MultiGeometry becomes the corresponding multi variant; a
/// mixed one falls back to its first convertible member.
fn convert_multi(multi: &kml::types::MultiGeometry) -> Option<Geometry<f64>> {
    let members: Vec<Geometry<f64>> = multi
        .geometries
        .iter()
        .filter_map(convert_geometry)
        .collect();
    if members.is_empty() {
        return None;
    }

    if members.iter().all(|g| matches!(g, Geometry::Point(_))) {
        return Some(Geometry::MultiPoint(MultiPoint(
            members
                .into_iter()
                .filter_map(|g| match g {
                    Geometry::Point(p) => Some(p),
                    _ => None,
                })
                .collect(),
        )));
    }
    if members.iter().all(|g| matches!(g, Geometry::LineString(_))) {
        return Some(Geometry::MultiLineString(MultiLineString(
            members
                .into_iter()
                .filter_map(|g| match g {
                    Geometry::LineString(ls) => Some(ls),
                    _ => None,
                })
                .collect(),
        )));
    }
    if members.iter().all(|g| matches!(g, Geometry::Polygon(_))) {
        return Some(Geometry::MultiPolygon(MultiPolygon(
            members
                .into_iter()
                .filter_map(|g| match g {
                    Geometry::Polygon(p) => Some(p),
                    _ => None,
                })
                .collect(),
        )));
    }

    warn!("mixed KML MultiGeometry; keeping first member only");
    members.into_iter().next()
}
