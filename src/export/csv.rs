use geo::Geometry;
use wkt::ToWkt;

use crate::error::Result;
use crate::types::{GeometryFamily, Layer};

/// CSV with a UTF-8 byte-order marker for spreadsheet compatibility.
///
/// Point layers emit one row per sub-point with explicit longitude/latitude
/// columns; line and polygon layers emit a single row with a WKT geometry
/// column and the layer's measurement.
pub fn render(layer: &Layer) -> Result<Vec<u8>> {
    let mut out = String::from("\u{feff}");
    let description = layer.description.clone().unwrap_or_default();

    match layer.geometry_kind.family() {
        GeometryFamily::Point => {
            out.push_str("id,name,layer_type,status,longitude,latitude,description\n");
            match &layer.geometry {
                Geometry::Point(p) => {
                    out.push_str(&row(&[
                        &layer.id.to_string(),
                        &layer.name,
                        layer.layer_type.as_str(),
                        layer.status.as_str(),
                        &p.x().to_string(),
                        &p.y().to_string(),
                        &description,
                    ]));
                }
                Geometry::MultiPoint(mp) => {
                    for (idx, p) in mp.0.iter().enumerate() {
                        out.push_str(&row(&[
                            &format!("{}_{idx}", layer.id),
                            &format!("{} - Point {}", layer.name, idx + 1),
                            layer.layer_type.as_str(),
                            layer.status.as_str(),
                            &p.x().to_string(),
                            &p.y().to_string(),
                            &description,
                        ]));
                    }
                }
                _ => {}
            }
        }
        GeometryFamily::Line => {
            out.push_str("id,name,layer_type,status,length_km,wkt,description\n");
            out.push_str(&row(&[
                &layer.id.to_string(),
                &layer.name,
                layer.layer_type.as_str(),
                layer.status.as_str(),
                &layer.stats.length_km.map(|v| v.to_string()).unwrap_or_default(),
                &layer.geometry.wkt_string(),
                &description,
            ]));
        }
        GeometryFamily::Polygon => {
            out.push_str("id,name,layer_type,status,area_km2,wkt,description\n");
            out.push_str(&row(&[
                &layer.id.to_string(),
                &layer.name,
                layer.layer_type.as_str(),
                layer.status.as_str(),
                &layer.stats.area_km2.map(|v| v.to_string()).unwrap_or_default(),
                &layer.geometry.wkt_string(),
                &description,
            ]));
        }
    }

    Ok(out.into_bytes())
}

fn row(fields: &[&str]) -> String {
    let mut line = fields.iter().map(|f| quote(f)).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

fn quote(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::{line_layer, point_layer};

    #[test]
    fn multipoint_explodes_to_rows() {
        let layer = point_layer(5, "wells");
        let text = String::from_utf8(render(&layer).unwrap()).unwrap();
        assert!(text.starts_with('\u{feff}'), "BOM prefix");
        let lines: Vec<&str> = text.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines.len(), 4, "header plus three points");
        assert!(lines[0].starts_with("id,name,layer_type,status,longitude,latitude"));
        assert!(lines[1].starts_with("5_0,wells - Point 1,"));
        assert!(lines[3].contains("3,3"));
    }

    #[test]
    fn line_layer_emits_wkt_row() {
        let layer = line_layer(6, "road");
        let text = String::from_utf8(render(&layer).unwrap()).unwrap();
        let lines: Vec<&str> = text.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("length_km"));
        assert!(lines[1].contains("LINESTRING"));
        assert!(lines[1].contains("111.2"));
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let mut layer = point_layer(7, "wells, north");
        layer.geometry = geo::Geometry::Point(geo::point!(x: 1.0, y: 2.0));
        layer.geometry_kind = crate::types::GeometryKind::Point;
        let text = String::from_utf8(render(&layer).unwrap()).unwrap();
        assert!(text.contains("\"wells, north\""));
    }
}
