use wkt::ToWkt;

use crate::error::Result;
use crate::types::Layer;

/// Plain-text WKT, prefixed by a metadata comment block.
pub fn render(layer: &Layer) -> Result<Vec<u8>> {
    let mut out = String::new();
    out.push_str(&format!("# Layer: {}\n", layer.name));
    out.push_str(&format!("# Type: {}\n", layer.geometry_kind.as_str()));
    out.push_str(&format!("# Status: {}\n", layer.status.as_str()));
    out.push_str("# SRID: 4326 (WGS84)\n");
    out.push('\n');
    out.push_str(&layer.geometry.wkt_string());
    out.push('\n');
    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::{point_layer, polygon_layer};

    #[test]
    fn wkt_carries_metadata_header() {
        let layer = point_layer(1, "wells");
        let text = String::from_utf8(render(&layer).unwrap()).unwrap();
        assert!(text.starts_with("# Layer: wells\n"));
        assert!(text.contains("# Type: MultiPoint"));
        assert!(text.contains("# SRID: 4326"));
        assert!(text.contains("MULTIPOINT"));
    }

    #[test]
    fn polygon_wkt_geometry() {
        let layer = polygon_layer(2, "area");
        let text = String::from_utf8(render(&layer).unwrap()).unwrap();
        assert!(text.contains("POLYGON"));
    }
}
