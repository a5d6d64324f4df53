use geo::Geometry;

use crate::error::{PipelineError, Result};
use crate::export::xml_escape;
use crate::types::{GeometryFamily, Layer};

/// GPX 1.1, waypoints only: one `<wpt>` per point or sub-point. Any
/// non-point layer is rejected.
pub fn render(layer: &Layer) -> Result<Vec<u8>> {
    if layer.geometry_kind.family() != GeometryFamily::Point {
        return Err(PipelineError::UnsupportedFormat(format!(
            "GPX export is only available for point layers (layer is {})",
            layer.geometry_kind.as_str()
        )));
    }

    let description = xml_escape(layer.description.as_deref().unwrap_or(""));
    let mut lines = vec![
        r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_string(),
        r#"<gpx version="1.1" creator="geolayers" xmlns="http://www.topografix.com/GPX/1/1">"#
            .to_string(),
        "  <metadata>".to_string(),
        format!("    <name>{}</name>", xml_escape(&layer.name)),
        format!("    <desc>{description}</desc>"),
        "  </metadata>".to_string(),
    ];

    let mut waypoint = |lon: f64, lat: f64, name: &str| {
        lines.push(format!(r#"  <wpt lat="{lat}" lon="{lon}">"#));
        lines.push(format!("    <name>{}</name>", xml_escape(name)));
        lines.push(format!("    <desc>{description}</desc>"));
        lines.push(format!("    <type>{}</type>", layer.layer_type.as_str()));
        lines.push("  </wpt>".to_string());
    };

    match &layer.geometry {
        Geometry::Point(p) => waypoint(p.x(), p.y(), &layer.name),
        Geometry::MultiPoint(mp) => {
            for (idx, p) in mp.0.iter().enumerate() {
                waypoint(p.x(), p.y(), &format!("{} - Point {}", layer.name, idx + 1));
            }
        }
        _ => {
            return Err(PipelineError::UnsupportedFormat(
                "GPX export requires a point geometry".to_string(),
            ))
        }
    }

    lines.push("</gpx>".to_string());
    Ok(lines.join("\n").into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::{point_layer, polygon_layer};

    #[test]
    fn three_points_make_three_waypoints() {
        let layer = point_layer(1, "wells");
        let text = String::from_utf8(render(&layer).unwrap()).unwrap();
        assert_eq!(text.matches("<wpt ").count(), 3);
        assert!(text.contains(r#"<wpt lat="2" lon="2">"#));
        assert!(text.contains("<name>wells - Point 2</name>"));
    }

    #[test]
    fn polygon_layer_is_rejected() {
        let layer = polygon_layer(2, "area");
        assert!(matches!(
            render(&layer),
            Err(PipelineError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn names_are_escaped() {
        let mut layer = point_layer(3, "wells & pads");
        layer.geometry = geo::Geometry::Point(geo::point!(x: 1.0, y: 2.0));
        layer.geometry_kind = crate::types::GeometryKind::Point;
        let text = String::from_utf8(render(&layer).unwrap()).unwrap();
        assert!(text.contains("wells &amp; pads"));
    }
}
