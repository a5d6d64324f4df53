use anyhow::{anyhow, bail, Result};
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde_json::{json, Value};
use shapefile as shp;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two lon/lat coordinates, in meters.
pub fn haversine_distance_m(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let delta_lat = (b.y - a.y).to_radians();
    let delta_lon = (b.x - a.x).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Sum of haversine segment lengths along a line string, in meters.
pub fn haversine_length_m(line: &LineString<f64>) -> f64 {
    line.0
        .windows(2)
        .map(|w| haversine_distance_m(w[0], w[1]))
        .sum()
}

// ---------------------------------------------------------------------------
// GeoJSON geometry <-> geo
// ---------------------------------------------------------------------------

fn coord_json(c: &Coord<f64>) -> Value {
    json!([c.x, c.y])
}

fn ring_json(ls: &LineString<f64>) -> Value {
    Value::Array(ls.coords().map(coord_json).collect())
}

fn polygon_json(p: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_json(p.exterior())];
    rings.extend(p.interiors().iter().map(ring_json));
    Value::Array(rings)
}

/// Serialize a geometry as a GeoJSON geometry object.
pub fn geometry_to_json(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Point(p) => json!({"type": "Point", "coordinates": [p.x(), p.y()]}),
        Geometry::Line(l) => json!({
            "type": "LineString",
            "coordinates": [[l.start.x, l.start.y], [l.end.x, l.end.y]],
        }),
        Geometry::LineString(ls) => json!({"type": "LineString", "coordinates": ring_json(ls)}),
        Geometry::Polygon(p) => json!({"type": "Polygon", "coordinates": polygon_json(p)}),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.0.iter().map(|p| json!([p.x(), p.y()])).collect::<Vec<_>>(),
        }),
        Geometry::MultiLineString(mls) => json!({
            "type": "MultiLineString",
            "coordinates": mls.0.iter().map(ring_json).collect::<Vec<_>>(),
        }),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon_json).collect::<Vec<_>>(),
        }),
        Geometry::Rect(r) => geometry_to_json(&Geometry::Polygon(r.to_polygon())),
        Geometry::Triangle(t) => geometry_to_json(&Geometry::Polygon(t.to_polygon())),
        Geometry::GeometryCollection(gc) => json!({
            "type": "GeometryCollection",
            "geometries": gc.0.iter().map(geometry_to_json).collect::<Vec<_>>(),
        }),
    }
}

fn parse_coord(value: &Value) -> Result<Coord<f64>> {
    let arr = value.as_array().ok_or_else(|| anyhow!("coordinate is not an array"))?;
    if arr.len() < 2 {
        bail!("coordinate has fewer than two components");
    }
    let x = arr[0].as_f64().ok_or_else(|| anyhow!("x is not a number"))?;
    let y = arr[1].as_f64().ok_or_else(|| anyhow!("y is not a number"))?;
    Ok(Coord { x, y })
}

fn parse_ring(value: &Value) -> Result<LineString<f64>> {
    let arr = value.as_array().ok_or_else(|| anyhow!("ring is not an array"))?;
    let mut coords = arr.iter().map(parse_coord).collect::<Result<Vec<_>>>()?;
    // Ensure rings are closed; source files are often sloppy here.
    if coords.len() >= 2 && coords[0] != coords[coords.len() - 1] {
        coords.push(coords[0]);
    }
    Ok(LineString(coords))
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let rings = value.as_array().ok_or_else(|| anyhow!("polygon is not an array"))?;
    let mut iter = rings.iter();
    let exterior = parse_ring(iter.next().ok_or_else(|| anyhow!("polygon has no rings"))?)?;
    let interiors = iter.map(parse_ring).collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

/// Parse a GeoJSON geometry object into a geo geometry. Only the six
/// supported kinds are accepted.
pub fn json_to_geometry(value: &Value) -> Result<Geometry<f64>> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("geometry has no type"))?;
    let coords = value
        .get("coordinates")
        .ok_or_else(|| anyhow!("geometry has no coordinates"))?;

    Ok(match kind {
        "Point" => Geometry::Point(Point::from(parse_coord(coords)?)),
        "LineString" => {
            let arr = coords.as_array().ok_or_else(|| anyhow!("coordinates not an array"))?;
            Geometry::LineString(LineString(
                arr.iter().map(parse_coord).collect::<Result<Vec<_>>>()?,
            ))
        }
        "Polygon" => Geometry::Polygon(parse_polygon(coords)?),
        "MultiPoint" => {
            let arr = coords.as_array().ok_or_else(|| anyhow!("coordinates not an array"))?;
            Geometry::MultiPoint(MultiPoint(
                arr.iter()
                    .map(|c| parse_coord(c).map(Point::from))
                    .collect::<Result<Vec<_>>>()?,
            ))
        }
        "MultiLineString" => {
            let arr = coords.as_array().ok_or_else(|| anyhow!("coordinates not an array"))?;
            let lines = arr
                .iter()
                .map(|l| {
                    let pts = l.as_array().ok_or_else(|| anyhow!("line not an array"))?;
                    Ok(LineString(pts.iter().map(parse_coord).collect::<Result<Vec<_>>>()?))
                })
                .collect::<Result<Vec<_>>>()?;
            Geometry::MultiLineString(MultiLineString(lines))
        }
        "MultiPolygon" => {
            let arr = coords.as_array().ok_or_else(|| anyhow!("coordinates not an array"))?;
            Geometry::MultiPolygon(MultiPolygon(
                arr.iter().map(parse_polygon).collect::<Result<Vec<_>>>()?,
            ))
        }
        other => bail!("unsupported geometry type: {other}"),
    })
}

// ---------------------------------------------------------------------------
// Shapefile <-> geo
// ---------------------------------------------------------------------------

fn close_ring(coords: &mut Vec<Coord<f64>>) {
    if !coords.is_empty() && coords[0] != coords[coords.len() - 1] {
        coords.push(coords[0]);
    }
}

fn rings_to_polygons<P>(rings: &[shp::PolygonRing<P>], xy: impl Fn(&P) -> (f64, f64)) -> MultiPolygon<f64> {
    // Shapefile stores each outer ring followed by its holes.
    let mut polys: Vec<Polygon<f64>> = Vec::new();
    let mut exterior: Option<LineString<f64>> = None;
    let mut holes: Vec<LineString<f64>> = Vec::new();

    for ring in rings {
        let mut coords: Vec<Coord<f64>> = ring
            .points()
            .iter()
            .map(|p| {
                let (x, y) = xy(p);
                Coord { x, y }
            })
            .collect();
        close_ring(&mut coords);
        let ls = LineString(coords);

        match ring {
            shp::PolygonRing::Outer(_) => {
                if let Some(ext) = exterior.take() {
                    polys.push(Polygon::new(ext, std::mem::take(&mut holes)));
                }
                exterior = Some(ls);
            }
            shp::PolygonRing::Inner(_) => holes.push(ls),
        }
    }
    if let Some(ext) = exterior {
        polys.push(Polygon::new(ext, holes));
    }
    MultiPolygon(polys)
}

fn parts_to_lines<P>(parts: &[Vec<P>], xy: impl Fn(&P) -> (f64, f64)) -> MultiLineString<f64> {
    MultiLineString(
        parts
            .iter()
            .map(|part| {
                LineString(
                    part.iter()
                        .map(|p| {
                            let (x, y) = xy(p);
                            Coord { x, y }
                        })
                        .collect(),
                )
            })
            .collect(),
    )
}

/// Convert a shapefile record shape to a geo geometry. Measured (M) and 3D
/// (Z) variants lose their extra dimension. `NullShape` maps to `None`.
pub fn shape_to_geometry(shape: &shp::Shape) -> Result<Option<Geometry<f64>>> {
    use shp::Shape;

    let geometry = match shape {
        Shape::NullShape => return Ok(None),
        Shape::Point(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointM(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointZ(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::Multipoint(mp) => Geometry::MultiPoint(MultiPoint(
            mp.points().iter().map(|p| Point::new(p.x, p.y)).collect(),
        )),
        Shape::MultipointM(mp) => Geometry::MultiPoint(MultiPoint(
            mp.points().iter().map(|p| Point::new(p.x, p.y)).collect(),
        )),
        Shape::MultipointZ(mp) => Geometry::MultiPoint(MultiPoint(
            mp.points().iter().map(|p| Point::new(p.x, p.y)).collect(),
        )),
        Shape::Polyline(pl) => simplify_lines(parts_to_lines(pl.parts(), |p| (p.x, p.y))),
        Shape::PolylineM(pl) => simplify_lines(parts_to_lines(pl.parts(), |p| (p.x, p.y))),
        Shape::PolylineZ(pl) => simplify_lines(parts_to_lines(pl.parts(), |p| (p.x, p.y))),
        Shape::Polygon(pg) => simplify_polygons(rings_to_polygons(pg.rings(), |p| (p.x, p.y))),
        Shape::PolygonM(pg) => simplify_polygons(rings_to_polygons(pg.rings(), |p| (p.x, p.y))),
        Shape::PolygonZ(pg) => simplify_polygons(rings_to_polygons(pg.rings(), |p| (p.x, p.y))),
        _ => bail!("unsupported shapefile shape type (multipatch)"),
    };
    Ok(Some(geometry))
}

/// Single-part multi geometries collapse to their simple variant so that a
/// one-line shapefile imports as a LineString, not a MultiLineString.
fn simplify_lines(mut mls: MultiLineString<f64>) -> Geometry<f64> {
    if mls.0.len() == 1 {
        Geometry::LineString(mls.0.remove(0))
    } else {
        Geometry::MultiLineString(mls)
    }
}

fn simplify_polygons(mut mp: MultiPolygon<f64>) -> Geometry<f64> {
    if mp.0.len() == 1 {
        Geometry::Polygon(mp.0.remove(0))
    } else {
        Geometry::MultiPolygon(mp)
    }
}

fn shp_point(c: Coord<f64>) -> shp::Point {
    shp::Point { x: c.x, y: c.y }
}

fn signed_area(pts: &[shp::Point]) -> f64 {
    let mut a = 0.0;
    for w in pts.windows(2) {
        a += w[0].x * w[1].y - w[1].x * w[0].y;
    }
    a / 2.0
}

fn close_shp_ring(pts: &mut Vec<shp::Point>) {
    if !pts.is_empty() {
        let (first, last) = (pts[0], pts[pts.len() - 1]);
        if first.x != last.x || first.y != last.y {
            pts.push(first);
        }
    }
}

/// Convert polygons to shapefile rings: exterior CW, holes CCW, closed.
pub fn polygons_to_shp(mp: &MultiPolygon<f64>) -> shp::Polygon {
    let mut rings: Vec<shp::PolygonRing<shp::Point>> = Vec::new();

    for poly in &mp.0 {
        let mut ext: Vec<shp::Point> = poly.exterior().coords().copied().map(shp_point).collect();
        close_shp_ring(&mut ext);
        if signed_area(&ext) > 0.0 {
            ext.reverse(); // make CW
        }
        rings.push(shp::PolygonRing::Outer(ext));

        for hole in poly.interiors() {
            let mut pts: Vec<shp::Point> = hole.coords().copied().map(shp_point).collect();
            close_shp_ring(&mut pts);
            if signed_area(&pts) < 0.0 {
                pts.reverse(); // make CCW
            }
            rings.push(shp::PolygonRing::Inner(pts));
        }
    }

    shp::Polygon::with_rings(rings)
}

pub fn lines_to_shp(mls: &MultiLineString<f64>) -> shp::Polyline {
    shp::Polyline::with_parts(
        mls.0
            .iter()
            .map(|ls| ls.coords().copied().map(shp_point).collect())
            .collect(),
    )
}

pub fn points_to_shp(mp: &MultiPoint<f64>) -> shp::Multipoint {
    shp::Multipoint::new(mp.0.iter().map(|p| shp_point(p.0)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_equator_degree() {
        // One degree of longitude on the equator is ~111.2 km.
        let d = haversine_distance_m(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 });
        assert!((d - 111_195.0).abs() < 500.0, "{d}");
    }

    #[test]
    fn geojson_roundtrip() {
        let poly = Geometry::Polygon(Polygon::new(
            LineString(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 2.0, y: 0.0 },
                Coord { x: 2.0, y: 2.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        ));
        let value = geometry_to_json(&poly);
        let back = json_to_geometry(&value).unwrap();
        assert_eq!(poly, back);
    }

    #[test]
    fn json_parser_closes_open_rings() {
        let value = serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]],
        });
        match json_to_geometry(&value).unwrap() {
            Geometry::Polygon(p) => {
                let coords = &p.exterior().0;
                assert_eq!(coords.first(), coords.last());
            }
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn shapefile_polygon_roundtrip_orientation() {
        let mp = MultiPolygon(vec![Polygon::new(
            LineString(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 4.0, y: 0.0 },
                Coord { x: 4.0, y: 4.0 },
                Coord { x: 0.0, y: 4.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![LineString(vec![
                Coord { x: 1.0, y: 1.0 },
                Coord { x: 2.0, y: 1.0 },
                Coord { x: 2.0, y: 2.0 },
                Coord { x: 1.0, y: 2.0 },
                Coord { x: 1.0, y: 1.0 },
            ])],
        )]);
        let shp_poly = polygons_to_shp(&mp);
        let shape = shp::Shape::Polygon(shp_poly);
        let back = shape_to_geometry(&shape).unwrap().unwrap();
        match back {
            Geometry::Polygon(p) => {
                assert_eq!(p.interiors().len(), 1);
                assert_eq!(p.exterior().0.len(), 5);
            }
            other => panic!("expected polygon, got {other:?}"),
        }
    }
}
