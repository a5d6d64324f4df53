use std::io::{Cursor, Write};

use geo::{Geometry, LineString, Point, Polygon};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{PipelineError, Result};
use crate::export::xml_escape;
use crate::types::{GeometryFamily, Layer, StyleConfig};

/// KML document: one placemark per sub-geometry of the canonical geometry,
/// styled from the layer's style configuration, each carrying an HTML
/// description block.
pub fn render(layer: &Layer) -> Result<Vec<u8>> {
    let mut doc = String::new();
    doc.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    doc.push('\n');
    doc.push_str(r#"<kml xmlns="http://www.opengis.net/kml/2.2">"#);
    doc.push('\n');
    doc.push_str("<Document>\n");
    doc.push_str(&format!("  <name>{}</name>\n", xml_escape(&layer.name)));
    doc.push_str(&style_block(&layer.style, layer.geometry_kind.family()));

    let description = description_html(layer);
    let mut placemark = |name: &str, geometry_xml: String| {
        doc.push_str("  <Placemark>\n");
        doc.push_str(&format!("    <name>{}</name>\n", xml_escape(name)));
        doc.push_str("    <styleUrl>#layerStyle</styleUrl>\n");
        doc.push_str(&format!(
            "    <description><![CDATA[{description}]]></description>\n"
        ));
        doc.push_str(&geometry_xml);
        doc.push_str("  </Placemark>\n");
    };

    match &layer.geometry {
        Geometry::Point(p) => placemark(&layer.name, point_xml(p)),
        Geometry::MultiPoint(mp) => {
            for (idx, p) in mp.0.iter().enumerate() {
                placemark(&format!("{} - Point {}", layer.name, idx + 1), point_xml(p));
            }
        }
        Geometry::LineString(ls) => placemark(&layer.name, line_xml(ls)),
        Geometry::MultiLineString(mls) => {
            for (idx, ls) in mls.0.iter().enumerate() {
                placemark(&format!("{} - Segment {}", layer.name, idx + 1), line_xml(ls));
            }
        }
        Geometry::Polygon(p) => placemark(&layer.name, polygon_xml(p)),
        Geometry::MultiPolygon(mp) => {
            for (idx, p) in mp.0.iter().enumerate() {
                placemark(&format!("{} - Zone {}", layer.name, idx + 1), polygon_xml(p));
            }
        }
        other => {
            return Err(PipelineError::UnsupportedFormat(format!(
                "KML export has no mapping for this geometry ({other:?})"
            )))
        }
    }

    doc.push_str("</Document>\n</kml>\n");
    Ok(doc.into_bytes())
}

/// KMZ: the KML document wrapped as a single-entry archive named `doc.kml`.
pub fn render_kmz(layer: &Layer) -> Result<Vec<u8>> {
    let kml = render(layer)?;
    let mut cursor = Cursor::new(Vec::new());
    let mut archive = ZipWriter::new(&mut cursor);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    archive
        .start_file("doc.kml", options)
        .and_then(|()| archive.write_all(&kml).map_err(Into::into))
        .and_then(|()| archive.finish().map(|_| ()))
        .map_err(|e| PipelineError::Validation(anyhow::anyhow!("failed to build KMZ: {e}")))?;
    Ok(cursor.into_inner())
}

fn style_block(style: &StyleConfig, family: GeometryFamily) -> String {
    let mut block = String::from("  <Style id=\"layerStyle\">\n");
    match family {
        GeometryFamily::Point => {
            let icon = style
                .icon_url
                .clone()
                .unwrap_or_else(|| {
                    "http://maps.google.com/mapfiles/kml/pushpin/ylw-pushpin.png".to_string()
                });
            block.push_str("    <IconStyle>\n");
            block.push_str(&format!("      <color>{}</color>\n", kml_color(&style.color, 255)));
            block.push_str("      <scale>1.2</scale>\n");
            block.push_str(&format!(
                "      <Icon><href>{}</href></Icon>\n",
                xml_escape(&icon)
            ));
            block.push_str("    </IconStyle>\n");
        }
        GeometryFamily::Line => {
            block.push_str("    <LineStyle>\n");
            block.push_str(&format!("      <color>{}</color>\n", kml_color(&style.color, 255)));
            block.push_str(&format!("      <width>{}</width>\n", style.weight));
            block.push_str("    </LineStyle>\n");
        }
        GeometryFamily::Polygon => {
            let alpha = (style.fill_opacity.clamp(0.0, 1.0) * 255.0) as u8;
            block.push_str("    <PolyStyle>\n");
            block.push_str(&format!(
                "      <color>{}</color>\n",
                kml_color(&style.fill_color, alpha)
            ));
            block.push_str("    </PolyStyle>\n");
            block.push_str("    <LineStyle>\n");
            block.push_str(&format!("      <color>{}</color>\n", kml_color(&style.color, 255)));
            block.push_str(&format!("      <width>{}</width>\n", style.weight));
            block.push_str("    </LineStyle>\n");
        }
    }
    block.push_str("  </Style>\n");
    block
}

/// `#rrggbb` to KML's `aabbggrr`.
fn kml_color(hex: &str, alpha: u8) -> String {
    let hex = hex.trim_start_matches('#');
    let component = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    };
    let (r, g, b) = (component(0..2), component(2..4), component(4..6));
    format!("{alpha:02x}{b:02x}{g:02x}{r:02x}")
}

fn description_html(layer: &Layer) -> String {
    let mut parts = vec![
        format!("<h3>{}</h3>", xml_escape(&layer.name)),
        format!("<p><b>Type:</b> {}</p>", layer.layer_type.as_str()),
        format!("<p><b>Status:</b> {}</p>", layer.status.as_str()),
    ];
    if let Some(description) = &layer.description {
        parts.push(format!("<p><b>Description:</b> {}</p>", xml_escape(description)));
    }
    if let Some(area) = layer.stats.area_km2 {
        parts.push(format!("<p><b>Area:</b> {area:.2} km&sup2;</p>"));
    }
    if let Some(length) = layer.stats.length_km {
        parts.push(format!("<p><b>Length:</b> {length:.2} km</p>"));
    }
    if let Some(count) = layer.stats.point_count.filter(|&c| c > 1) {
        parts.push(format!("<p><b>Points:</b> {count}</p>"));
    }
    parts.join("\n")
}

fn point_xml(p: &Point<f64>) -> String {
    format!("    <Point><coordinates>{},{}</coordinates></Point>\n", p.x(), p.y())
}

fn coordinates(ls: &LineString<f64>) -> String {
    ls.coords()
        .map(|c| format!("{},{}", c.x, c.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn line_xml(ls: &LineString<f64>) -> String {
    format!(
        "    <LineString><coordinates>{}</coordinates></LineString>\n",
        coordinates(ls)
    )
}

fn polygon_xml(p: &Polygon<f64>) -> String {
    let mut xml = String::from("    <Polygon>\n");
    xml.push_str(&format!(
        "      <outerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></outerBoundaryIs>\n",
        coordinates(p.exterior())
    ));
    for interior in p.interiors() {
        xml.push_str(&format!(
            "      <innerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></innerBoundaryIs>\n",
            coordinates(interior)
        ));
    }
    xml.push_str("    </Polygon>\n");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::{point_layer, polygon_layer};

    #[test]
    fn multipoint_makes_one_placemark_per_point() {
        let layer = point_layer(1, "wells");
        let text = String::from_utf8(render(&layer).unwrap()).unwrap();
        assert_eq!(text.matches("<Placemark>").count(), 3);
        assert!(text.contains("<name>wells - Point 1</name>"));
        assert!(text.contains("<IconStyle>"));
        assert!(text.contains("<![CDATA[<h3>wells</h3>"));
    }

    #[test]
    fn polygon_styles_carry_fill_alpha() {
        let mut layer = polygon_layer(2, "area");
        layer.style.fill_color = "#22c55e".to_string();
        layer.style.fill_opacity = 0.5;
        let text = String::from_utf8(render(&layer).unwrap()).unwrap();
        // 0.5 alpha = 0x7f; color is aabbggrr.
        assert!(text.contains("<color>7f5ec522</color>"), "{text}");
        assert!(text.contains("outerBoundaryIs"));
    }

    #[test]
    fn kmz_is_single_entry_archive() {
        let layer = point_layer(3, "wells");
        let bytes = render_kmz(&layer).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.by_index(0).unwrap().name(), "doc.kml");
    }

    #[test]
    fn color_conversion() {
        assert_eq!(kml_color("#3b82f6", 255), "fff6823b");
        assert_eq!(kml_color("22c55e", 128), "805ec522");
    }
}
