//! Georeferenced TIFF import: non-nodata pixel regions become polygon
//! features, one per contiguous region, carrying the pixel value.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use geo::{Coord, Geometry, LineString, Polygon};
use log::debug;
use serde_json::{Map, Number, Value};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::error::{PipelineError, Result};
use crate::feature_set::{Feature, FeatureSet, SourceCrs};

/// Affine pixel-to-world mapping from the GeoTIFF pixel scale and tiepoint.
struct PixelTransform {
    origin_x: f64,
    origin_y: f64,
    scale_x: f64,
    scale_y: f64,
}

impl PixelTransform {
    /// World coordinates of grid vertex (col, row). Row grows downward, y
    /// grows upward.
    fn world(&self, col: f64, row: f64) -> Coord<f64> {
        Coord {
            x: self.origin_x + col * self.scale_x,
            y: self.origin_y - row * self.scale_y,
        }
    }
}

pub fn parse_tiff(path: &Path) -> Result<FeatureSet> {
    let file = File::open(path)
        .map_err(|e| PipelineError::UnreadableFile(format!("{}: {e}", path.display())))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| PipelineError::UnreadableFile(format!("invalid TIFF: {e}")))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| PipelineError::UnreadableFile(format!("invalid TIFF: {e}")))?;
    let (width, height) = (width as usize, height as usize);

    let transform = read_transform(&mut decoder)?;
    let nodata = read_nodata(&mut decoder);
    let crs = read_crs(&mut decoder);

    let band = read_band(&mut decoder)?;
    if band.len() != width * height {
        return Err(PipelineError::UnreadableFile(format!(
            "expected a single-band raster ({} samples for {}x{})",
            band.len(),
            width,
            height
        )));
    }

    let mask: Vec<bool> = band
        .iter()
        .map(|&v| !v.is_nan() && nodata.map_or(true, |nd| v != nd))
        .collect();

    let mut features = Vec::new();
    let mut labels = vec![0u32; width * height];
    let mut next_label = 1u32;

    for start in 0..band.len() {
        if !mask[start] || labels[start] != 0 {
            continue;
        }
        // Flood-fill one contiguous region of equal pixel value.
        let value = band[start];
        let label = next_label;
        next_label += 1;

        let mut pixels = Vec::new();
        let mut stack = vec![start];
        labels[start] = label;
        while let Some(idx) = stack.pop() {
            pixels.push(idx);
            let (col, row) = (idx % width, idx / width);
            let mut push = |c: isize, r: isize| {
                if c < 0 || r < 0 || c as usize >= width || r as usize >= height {
                    return;
                }
                let n = r as usize * width + c as usize;
                if mask[n] && labels[n] == 0 && band[n] == value {
                    labels[n] = label;
                    stack.push(n);
                }
            };
            push(col as isize - 1, row as isize);
            push(col as isize + 1, row as isize);
            push(col as isize, row as isize - 1);
            push(col as isize, row as isize + 1);
        }

        let polygon = trace_region(&pixels, &labels, label, width, height, &transform);
        let mut properties = Map::new();
        properties.insert(
            "raster_val".to_string(),
            Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null),
        );
        features.push(Feature::new(Geometry::Polygon(polygon), properties));
    }
    debug!("vectorized {} raster regions", features.len());

    Ok(FeatureSet::new(features, crs))
}

fn read_transform(decoder: &mut Decoder<BufReader<File>>) -> Result<PixelTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| {
            PipelineError::UnreadableFile(
                "TIFF is not georeferenced (no pixel scale tag)".to_string(),
            )
        })?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| {
            PipelineError::UnreadableFile("TIFF is not georeferenced (no tiepoint tag)".to_string())
        })?;
    if scale.len() < 2 || tiepoint.len() < 5 {
        return Err(PipelineError::UnreadableFile(
            "malformed GeoTIFF georeferencing tags".to_string(),
        ));
    }
    // Tiepoint maps raster (i, j) to world (x, y).
    Ok(PixelTransform {
        origin_x: tiepoint[3] - tiepoint[0] * scale[0],
        origin_y: tiepoint[4] + tiepoint[1] * scale[1],
        scale_x: scale[0],
        scale_y: scale[1],
    })
}

fn read_nodata(decoder: &mut Decoder<BufReader<File>>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok())
}

/// EPSG code from the GeoKey directory: projected key first, geographic key
/// as fallback.
fn read_crs(decoder: &mut Decoder<BufReader<File>>) -> SourceCrs {
    let Ok(keys) = decoder.get_tag_u64_vec(Tag::GeoKeyDirectoryTag) else {
        return SourceCrs::Undeclared;
    };
    let mut geographic = None;
    let mut projected = None;
    for entry in keys.chunks(4).skip(1) {
        if entry.len() < 4 || entry[1] != 0 {
            continue; // value stored in another tag
        }
        match entry[0] {
            2048 => geographic = Some(entry[3] as u32),
            3072 => projected = Some(entry[3] as u32),
            _ => {}
        }
    }
    match projected.or(geographic) {
        Some(code) if code != 0 && code != 32767 => SourceCrs::Epsg(code),
        _ => SourceCrs::Undeclared,
    }
}

fn read_band(decoder: &mut Decoder<BufReader<File>>) -> Result<Vec<f64>> {
    let image = decoder
        .read_image()
        .map_err(|e| PipelineError::UnreadableFile(format!("failed to decode TIFF: {e}")))?;
    Ok(match image {
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::F64(data) => data,
        _ => {
            return Err(PipelineError::UnreadableFile(
                "unsupported TIFF sample format".to_string(),
            ))
        }
    })
}

/// Trace the rectilinear outline of one labeled region. Boundary edges are
/// emitted with the region interior on the left, then chained into rings;
/// the largest ring is the exterior, the rest are holes.
fn trace_region(
    pixels: &[usize],
    labels: &[u32],
    label: u32,
    width: usize,
    height: usize,
    transform: &PixelTransform,
) -> Polygon<f64> {
    let in_region = |col: isize, row: isize| -> bool {
        if col < 0 || row < 0 || col as usize >= width || row as usize >= height {
            return false;
        }
        labels[row as usize * width + col as usize] == label
    };

    // Directed boundary edges between grid vertices (col, row).
    let mut edges: HashMap<(usize, usize), Vec<(usize, usize)>> = HashMap::new();
    let mut add_edge = |from: (usize, usize), to: (usize, usize)| {
        edges.entry(from).or_default().push(to);
    };

    for &idx in pixels {
        let (c, r) = (idx % width, idx / width);
        let (ci, ri) = (c as isize, r as isize);
        if !in_region(ci, ri - 1) {
            add_edge((c, r), (c + 1, r));
        }
        if !in_region(ci + 1, ri) {
            add_edge((c + 1, r), (c + 1, r + 1));
        }
        if !in_region(ci, ri + 1) {
            add_edge((c + 1, r + 1), (c, r + 1));
        }
        if !in_region(ci - 1, ri) {
            add_edge((c, r + 1), (c, r));
        }
    }

    // Chain edges into closed rings.
    let mut rings: Vec<Vec<(usize, usize)>> = Vec::new();
    loop {
        let Some(&start) = edges.keys().next() else { break };
        let mut ring = vec![start];
        let mut current = start;
        loop {
            let next = match edges.get_mut(&current) {
                Some(nexts) => nexts.pop(),
                None => None,
            };
            let Some(next) = next else { break };
            if edges.get(&current).is_some_and(|v| v.is_empty()) {
                edges.remove(&current);
            }
            ring.push(next);
            current = next;
            if current == start {
                break;
            }
        }
        if ring.len() > 2 {
            rings.push(ring);
        }
    }

    let to_line = |ring: &[(usize, usize)]| -> LineString<f64> {
        LineString(
            ring.iter()
                .map(|&(c, r)| transform.world(c as f64, r as f64))
                .collect(),
        )
    };

    // The ring with the largest planar extent is the exterior.
    rings.sort_by(|a, b| {
        ring_extent(b, transform)
            .partial_cmp(&ring_extent(a, transform))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut iter = rings.iter();
    let exterior = iter.next().map(|r| to_line(r)).unwrap_or_else(|| LineString(vec![]));
    let interiors: Vec<LineString<f64>> = iter.map(|r| to_line(r)).collect();
    Polygon::new(exterior, interiors)
}

fn ring_extent(ring: &[(usize, usize)], transform: &PixelTransform) -> f64 {
    let mut area = 0.0;
    for w in ring.windows(2) {
        let a = transform.world(w[0].0 as f64, w[0].1 as f64);
        let b = transform.world(w[1].0 as f64, w[1].1 as f64);
        area += a.x * b.y - b.x * a.y;
    }
    (area / 2.0).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_transform() -> PixelTransform {
        PixelTransform { origin_x: 0.0, origin_y: 0.0, scale_x: 1.0, scale_y: 1.0 }
    }

    #[test]
    fn traces_single_pixel() {
        // One labeled pixel at (0, 0) in a 2x2 grid.
        let labels = vec![1, 0, 0, 0];
        let polygon = trace_region(&[0], &labels, 1, 2, 2, &unit_transform());
        // Unit square outline: 4 edges, 5 coords with closure.
        assert_eq!(polygon.exterior().0.len(), 5);
        assert!(polygon.interiors().is_empty());
    }

    #[test]
    fn traces_region_with_hole() {
        // 3x3 ring of labeled pixels around an unlabeled center.
        let width = 3;
        let mut labels = vec![1u32; 9];
        labels[4] = 0; // center pixel
        let pixels: Vec<usize> = (0..9).filter(|&i| i != 4).collect();
        let polygon = trace_region(&pixels, &labels, 1, width, 3, &unit_transform());
        assert_eq!(polygon.interiors().len(), 1);
    }
}
