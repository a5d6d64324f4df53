use std::fs::File;
use std::path::Path;

use geo::{Geometry, Point};
use log::debug;
use polars::frame::DataFrame;
use polars::prelude::{CsvReadOptions, DataType, SerReader};
use serde_json::{Map, Number, Value};

use crate::error::{PipelineError, Result};
use crate::feature_set::{Feature, FeatureSet, SourceCrs};

/// Candidate coordinate column names, matched case-insensitively and in this
/// priority order.
const LON_CANDIDATES: [&str; 5] = ["longitude", "lon", "lng", "x", "long"];
const LAT_CANDIDATES: [&str; 3] = ["latitude", "lat", "y"];

/// Delimiters probed for `.txt` files, in priority order; the first that
/// yields at least two columns wins.
const TXT_DELIMITERS: [u8; 4] = [b'\t', b' ', b',', b';'];

/// Parse a comma-separated table of point coordinates.
pub fn parse_csv(path: &Path) -> Result<FeatureSet> {
    let df = read_dataframe(path, b',')?;
    dataframe_to_features(df)
}

/// Parse a delimited `.txt` table, probing delimiters first.
pub fn parse_txt(path: &Path) -> Result<FeatureSet> {
    for delimiter in TXT_DELIMITERS {
        match read_dataframe(path, delimiter) {
            Ok(df) if df.width() >= 2 => {
                debug!("txt delimiter resolved to {:?}", delimiter as char);
                return dataframe_to_features(df);
            }
            _ => continue,
        }
    }
    Err(PipelineError::UnreadableFile(
        "unrecognized TXT layout: no delimiter yields two columns".to_string(),
    ))
}

fn read_dataframe(path: &Path, separator: u8) -> Result<DataFrame> {
    let file = File::open(path)
        .map_err(|e| PipelineError::UnreadableFile(format!("{}: {e}", path.display())))?;
    CsvReadOptions::default()
        .with_has_header(true)
        .map_parse_options(|po| po.with_separator(separator))
        .into_reader_with_file_handle(file)
        .finish()
        .map_err(|e| PipelineError::UnreadableFile(format!("failed to read table: {e}")))
}

/// Locate the coordinate columns: named match first, then the first two
/// numeric columns in column order.
fn coordinate_columns(df: &DataFrame) -> Result<(String, String)> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let lower: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();

    let find = |candidates: &[&str]| -> Option<String> {
        for candidate in candidates {
            if let Some(idx) = lower.iter().position(|n| n == candidate) {
                return Some(names[idx].clone());
            }
        }
        None
    };

    let lon = find(&LON_CANDIDATES);
    let lat = find(&LAT_CANDIDATES);
    if let (Some(lon), Some(lat)) = (lon, lat) {
        return Ok((lon, lat));
    }

    // Fallback: first two numeric columns in column order.
    let numeric: Vec<String> = names
        .iter()
        .filter(|name| {
            df.column(name)
                .map(|col| is_numeric(col.dtype()))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    if numeric.len() >= 2 {
        return Ok((numeric[0].clone(), numeric[1].clone()));
    }

    Err(PipelineError::UnreadableFile(
        "coordinate columns not found (no longitude/latitude names, fewer than two numeric columns)"
            .to_string(),
    ))
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int32
            | DataType::Int64
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn dataframe_to_features(df: DataFrame) -> Result<FeatureSet> {
    let (lon_col, lat_col) = coordinate_columns(&df)?;

    let lon_cast = df
        .column(&lon_col)
        .and_then(|c| c.cast(&DataType::Float64))
        .map_err(|e| PipelineError::UnreadableFile(format!("bad longitude column: {e}")))?;
    let lat_cast = df
        .column(&lat_col)
        .and_then(|c| c.cast(&DataType::Float64))
        .map_err(|e| PipelineError::UnreadableFile(format!("bad latitude column: {e}")))?;
    let lon = lon_cast
        .f64()
        .map_err(|e| PipelineError::UnreadableFile(format!("bad longitude column: {e}")))?;
    let lat = lat_cast
        .f64()
        .map_err(|e| PipelineError::UnreadableFile(format!("bad latitude column: {e}")))?;

    // Pre-extract every column as row-wise JSON values for the property maps.
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let mut columns: Vec<(String, Vec<Value>)> = Vec::with_capacity(names.len());
    for name in &names {
        let column = df
            .column(name)
            .map_err(|e| PipelineError::UnreadableFile(e.to_string()))?;
        let values: Vec<Value> = if is_numeric(column.dtype()) {
            let cast = column
                .cast(&DataType::Float64)
                .map_err(|e| PipelineError::UnreadableFile(e.to_string()))?;
            let floats = cast
                .f64()
                .map_err(|e| PipelineError::UnreadableFile(e.to_string()))?;
            floats
                .into_iter()
                .map(|v| {
                    v.and_then(Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                })
                .collect()
        } else {
            let cast = column
                .cast(&DataType::String)
                .map_err(|e| PipelineError::UnreadableFile(e.to_string()))?;
            let strings = cast
                .str()
                .map_err(|e| PipelineError::UnreadableFile(e.to_string()))?;
            strings
                .into_iter()
                .map(|v| v.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null))
                .collect()
        };
        columns.push((name.clone(), values));
    }

    let mut features = Vec::with_capacity(df.height());
    let mut skipped = 0usize;
    for row in 0..df.height() {
        let (Some(x), Some(y)) = (lon.get(row), lat.get(row)) else {
            skipped += 1;
            continue;
        };
        let mut properties = Map::new();
        for (name, values) in &columns {
            properties.insert(name.clone(), values[row].clone());
        }
        features.push(Feature::new(Geometry::Point(Point::new(x, y)), properties));
    }
    if skipped > 0 {
        debug!("skipped {skipped} rows with null coordinates");
    }

    // Plain coordinate tables carry no CRS declaration; they are taken as
    // geographic WGS84.
    Ok(FeatureSet::new(features, SourceCrs::WGS84))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn csv_named_columns_any_order() {
        let f = write_file(".csv", "id,name,Lon,LAT\n1,alpha,10.5,45.25\n2,beta,11.0,46.0\n");
        let set = parse_csv(f.path()).unwrap();
        assert_eq!(set.len(), 2);
        match &set.features[0].geometry {
            Geometry::Point(p) => {
                assert!((p.x() - 10.5).abs() < 1e-9);
                assert!((p.y() - 45.25).abs() < 1e-9);
            }
            other => panic!("expected point, got {other:?}"),
        }
        assert_eq!(set.features[1].properties["name"], "beta");
    }

    #[test]
    fn csv_numeric_fallback() {
        let f = write_file(".csv", "a,b,label\n1.5,2.5,first\n3.0,4.0,second\n");
        let set = parse_csv(f.path()).unwrap();
        assert_eq!(set.len(), 2);
        match &set.features[1].geometry {
            Geometry::Point(p) => assert_eq!((p.x(), p.y()), (3.0, 4.0)),
            other => panic!("expected point, got {other:?}"),
        }
    }

    #[test]
    fn csv_without_coordinates_fails() {
        let f = write_file(".csv", "name,color\nalpha,red\n");
        assert!(matches!(
            parse_csv(f.path()),
            Err(PipelineError::UnreadableFile(_))
        ));
    }

    #[test]
    fn txt_probes_delimiters() {
        let f = write_file(".txt", "lon\tlat\tname\n5.5\t6.5\tsite\n");
        let set = parse_txt(f.path()).unwrap();
        assert_eq!(set.len(), 1);

        let f = write_file(".txt", "lon;lat\n1.0;2.0\n");
        let set = parse_txt(f.path()).unwrap();
        assert_eq!(set.len(), 1);
    }
}
