use std::path::Path;

use anyhow::Context;
use log::{info, warn};
use serde_json::{Map, Number, Value};
use shapefile::dbase::FieldValue;

use crate::common::{extract_zip, find_files_by_extension, shape_to_geometry};
use crate::error::{PipelineError, Result};
use crate::feature_set::{Feature, FeatureSet, SourceCrs};

/// Parse a Shapefile. The geometry file must be accompanied by its `.shx`
/// index and `.dbf` attribute siblings; a missing one is reported by name,
/// not as a generic parse error.
pub fn parse_shapefile(path: &Path) -> Result<FeatureSet> {
    for extension in ["shx", "dbf"] {
        if !path.with_extension(extension).exists() {
            return Err(PipelineError::MissingCompanionFile { extension });
        }
    }

    let crs = read_prj(path)?;

    let mut reader = shapefile::Reader::from_path(path)
        .map_err(|e| PipelineError::UnreadableFile(format!("failed to open shapefile: {e}")))?;

    let mut features = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result
            .map_err(|e| PipelineError::UnreadableFile(format!("error reading shape: {e}")))?;
        let Some(geometry) = shape_to_geometry(&shape).map_err(PipelineError::Validation)? else {
            continue; // null shape
        };
        features.push(Feature::new(geometry, record_to_properties(record)));
    }

    Ok(FeatureSet::new(features, crs))
}

/// ZIP-wrapped Shapefile: extract to scratch, locate the geometry file
/// recursively, delegate.
pub fn parse_zip_archive(path: &Path, scratch: &Path) -> Result<FeatureSet> {
    let dest = scratch.join("archive");
    std::fs::create_dir_all(&dest)
        .context("failed to prepare extraction directory")
        .map_err(PipelineError::Validation)?;
    extract_zip(path, &dest)
        .map_err(|e| PipelineError::UnreadableFile(format!("{e:#}")))?;
    parse_extracted(&dest)
}

/// RAR-wrapped Shapefile. Requires the `rar` feature (native unrar library).
#[cfg(feature = "rar")]
pub fn parse_rar_archive(path: &Path, scratch: &Path) -> Result<FeatureSet> {
    let dest = scratch.join("archive");
    std::fs::create_dir_all(&dest)
        .context("failed to prepare extraction directory")
        .map_err(PipelineError::Validation)?;

    let mut archive = unrar::Archive::new(&path.to_path_buf())
        .open_for_processing()
        .map_err(|e| PipelineError::UnreadableFile(format!("invalid RAR archive: {e}")))?;
    while let Some(header) = archive
        .read_header()
        .map_err(|e| PipelineError::UnreadableFile(format!("invalid RAR archive: {e}")))?
    {
        archive = if header.entry().is_file() {
            header
                .extract_with_base(&dest)
                .map_err(|e| PipelineError::UnreadableFile(format!("RAR extraction failed: {e}")))?
        } else {
            header
                .skip()
                .map_err(|e| PipelineError::UnreadableFile(format!("RAR extraction failed: {e}")))?
        };
    }

    parse_extracted(&dest)
}

#[cfg(not(feature = "rar"))]
pub fn parse_rar_archive(_path: &Path, _scratch: &Path) -> Result<FeatureSet> {
    Err(PipelineError::MissingCapability(
        "RAR extraction is not compiled in (enable the `rar` feature)".to_string(),
    ))
}

/// Locate exactly one `.shp` inside an extracted archive. More than one:
/// first in traversal order wins (traversal order is platform-dependent;
/// the choice is logged).
fn parse_extracted(dir: &Path) -> Result<FeatureSet> {
    let candidates = find_files_by_extension(dir, "shp");
    let shp_path = match candidates.as_slice() {
        [] => {
            return Err(PipelineError::NoGeometryFound(
                "archive contains no shapefile".to_string(),
            ))
        }
        [only] => only.clone(),
        [first, ..] => {
            warn!(
                "archive contains {} shapefiles; using first found: {}",
                candidates.len(),
                first.display()
            );
            first.clone()
        }
    };
    info!("archive geometry file: {}", shp_path.display());
    parse_shapefile(&shp_path)
}

/// Source CRS from the optional `.prj` sibling. Recognizes the geographic and
/// projected systems this pipeline supports; anything else fails the import
/// rather than silently assuming WGS84.
fn read_prj(shp_path: &Path) -> Result<SourceCrs> {
    let prj_path = shp_path.with_extension("prj");
    if !prj_path.exists() {
        return Ok(SourceCrs::Undeclared);
    }
    let wkt = std::fs::read_to_string(&prj_path)
        .map_err(|e| PipelineError::UnreadableFile(format!("{}: {e}", prj_path.display())))?;
    let upper = wkt.to_ascii_uppercase();

    if let Some(caps) = regex::Regex::new(r"UTM_ZONE_(\d+)([NS])")
        .expect("static pattern")
        .captures(&upper)
    {
        let zone: u32 = caps[1].parse().unwrap_or(0);
        if (1..=60).contains(&zone) {
            let nad83 = upper.contains("NAD_1983") || upper.contains("NAD83");
            let south = &caps[2] == "S";
            let code = match (nad83, south) {
                (true, false) => 26900 + zone,
                (false, false) => 32600 + zone,
                (false, true) => 32700 + zone,
                (true, true) => {
                    return Err(PipelineError::Validation(anyhow::anyhow!(
                        "unsupported projection in {}: NAD83 southern UTM",
                        prj_path.display()
                    )))
                }
            };
            return Ok(SourceCrs::Epsg(code));
        }
    }

    if upper.contains("WEB_MERCATOR") || upper.contains("PSEUDO-MERCATOR") || upper.contains("3857")
    {
        return Ok(SourceCrs::Epsg(3857));
    }
    if upper.contains("WGS_1984") || upper.contains("WGS 84") || upper.contains("WGS84") {
        return Ok(SourceCrs::Epsg(4326));
    }
    if upper.contains("NAD_1983") || upper.contains("NAD83") {
        return Ok(SourceCrs::Epsg(4269));
    }

    Err(PipelineError::Validation(anyhow::anyhow!(
        "unrecognized coordinate system in {}",
        prj_path.display()
    )))
}

fn record_to_properties(record: shapefile::dbase::Record) -> Map<String, Value> {
    let mut properties = Map::new();
    for (field, value) in record {
        let json = match value {
            FieldValue::Character(v) => v.map(Value::String).unwrap_or(Value::Null),
            FieldValue::Memo(v) => Value::String(v),
            FieldValue::Numeric(v) => v
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Float(v) => v
                .and_then(|f| Number::from_f64(f as f64))
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Integer(v) => Value::Number(v.into()),
            FieldValue::Double(v) => Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
            FieldValue::Logical(v) => v.map(Value::Bool).unwrap_or(Value::Null),
            FieldValue::Date(v) => v
                .map(|d| Value::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day())))
                .unwrap_or(Value::Null),
            other => Value::String(format!("{other:?}")),
        };
        properties.insert(field, json);
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Coord, LineString, MultiPolygon, Polygon};
    use std::fs;

    /// Write a one-polygon shapefile with one attribute and return the `.shp`
    /// path.
    fn write_fixture(dir: &Path) -> std::path::PathBuf {
        let shp_path = dir.join("zones.shp");
        let table = shapefile::dbase::TableWriterBuilder::new()
            .add_character_field("NAME".try_into().unwrap(), 40);
        let mut writer = shapefile::Writer::from_path(&shp_path, table).unwrap();

        let polygon = crate::common::polygons_to_shp(&MultiPolygon(vec![Polygon::new(
            LineString(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 1.0, y: 0.0 },
                Coord { x: 1.0, y: 1.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        )]));
        let mut record = shapefile::dbase::Record::default();
        record.insert(
            "NAME".to_string(),
            FieldValue::Character(Some("zone one".to_string())),
        );
        writer.write_shape_and_record(&polygon, &record).unwrap();
        drop(writer);
        shp_path
    }

    #[test]
    fn reads_shapes_and_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let shp_path = write_fixture(dir.path());
        let set = parse_shapefile(&shp_path).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.features[0].properties["NAME"], "zone one");
        assert!(matches!(set.features[0].geometry, geo::Geometry::Polygon(_)));
        assert_eq!(set.crs, SourceCrs::Undeclared);
    }

    #[test]
    fn missing_dbf_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let shp_path = write_fixture(dir.path());
        fs::remove_file(shp_path.with_extension("dbf")).unwrap();
        match parse_shapefile(&shp_path) {
            Err(PipelineError::MissingCompanionFile { extension }) => assert_eq!(extension, "dbf"),
            other => panic!("expected MissingCompanionFile, got {other:?}"),
        }
    }

    #[test]
    fn prj_recognition() {
        let dir = tempfile::tempdir().unwrap();
        let shp_path = write_fixture(dir.path());

        fs::write(
            shp_path.with_extension("prj"),
            r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]]]"#,
        )
        .unwrap();
        assert_eq!(parse_shapefile(&shp_path).unwrap().crs, SourceCrs::Epsg(4326));

        fs::write(
            shp_path.with_extension("prj"),
            r#"PROJCS["WGS_1984_UTM_Zone_33N",GEOGCS["GCS_WGS_1984",...]]"#,
        )
        .unwrap();
        assert_eq!(parse_shapefile(&shp_path).unwrap().crs, SourceCrs::Epsg(32633));

        fs::write(shp_path.with_extension("prj"), r#"PROJCS["Mystery_Projection"]"#).unwrap();
        assert!(parse_shapefile(&shp_path).is_err());
    }

    #[test]
    fn zip_archive_roundtrip() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let shp_path = write_fixture(dir.path());

        let zip_path = dir.path().join("zones.zip");
        let mut zip = zip::ZipWriter::new(fs::File::create(&zip_path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for ext in ["shp", "shx", "dbf"] {
            zip.start_file(format!("data/zones.{ext}"), options).unwrap();
            zip.write_all(&fs::read(shp_path.with_extension(ext)).unwrap()).unwrap();
        }
        zip.finish().unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let set = parse_zip_archive(&zip_path, scratch.path()).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn zip_without_shapefile_is_no_geometry() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("plain.zip");
        let mut zip = zip::ZipWriter::new(fs::File::create(&zip_path).unwrap());
        zip.start_file("readme.txt", zip::write::SimpleFileOptions::default()).unwrap();
        zip.write_all(b"no geometry").unwrap();
        zip.finish().unwrap();

        let scratch = tempfile::tempdir().unwrap();
        assert!(matches!(
            parse_zip_archive(&zip_path, scratch.path()),
            Err(PipelineError::NoGeometryFound(_))
        ));
    }
}
