use std::io::{Cursor, Write};

use geo::{Geometry, MultiLineString};
use shapefile::dbase::{FieldValue, Record, TableWriterBuilder};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::common::{lines_to_shp, points_to_shp, polygons_to_shp, scratch_dir};
use crate::error::{PipelineError, Result};
use crate::types::Layer;

/// ESRI WKT written to the `.prj` companion; everything stored is WGS84.
const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// One attribute row for the whole layer, geometry as-is, packaged as a ZIP
/// of the companion files. Intermediate files go through a scratch directory
/// that is removed on every exit path.
pub fn render(layer: &Layer) -> Result<Vec<u8>> {
    let scratch = scratch_dir("geolayers-export-").map_err(PipelineError::Validation)?;
    let stem = format!("layer_{}", layer.id);
    let shp_path = scratch.path().join(format!("{stem}.shp"));

    write_shapefile(layer, &shp_path)?;
    std::fs::write(shp_path.with_extension("prj"), WGS84_PRJ)
        .map_err(|e| PipelineError::Validation(anyhow::anyhow!("failed to write .prj: {e}")))?;

    let mut cursor = Cursor::new(Vec::new());
    let mut archive = ZipWriter::new(&mut cursor);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for extension in ["shp", "shx", "dbf", "prj", "cpg"] {
        let companion = shp_path.with_extension(extension);
        if !companion.exists() {
            continue;
        }
        let bytes = std::fs::read(&companion)
            .map_err(|e| PipelineError::Validation(anyhow::anyhow!("failed to read companion: {e}")))?;
        archive
            .start_file(format!("{stem}.{extension}"), options)
            .and_then(|()| archive.write_all(&bytes).map_err(Into::into))
            .map_err(|e| {
                PipelineError::Validation(anyhow::anyhow!("failed to build archive: {e}"))
            })?;
    }
    archive
        .finish()
        .map_err(|e| PipelineError::Validation(anyhow::anyhow!("failed to finish archive: {e}")))?;

    Ok(cursor.into_inner())
}

fn write_shapefile(layer: &Layer, shp_path: &std::path::Path) -> Result<()> {
    let table = TableWriterBuilder::new()
        .add_numeric_field(field("ID"), 10, 0)
        .add_character_field(field("NAME"), 80)
        .add_character_field(field("LAYERTYPE"), 50)
        .add_character_field(field("STATUS"), 50)
        .add_numeric_field(field("AREA_KM2"), 18, 4)
        .add_numeric_field(field("LENGTH_KM"), 18, 4);
    let mut writer = shapefile::Writer::from_path(shp_path, table)
        .map_err(|e| PipelineError::Validation(anyhow::anyhow!("failed to create shapefile: {e}")))?;

    let mut record = Record::default();
    record.insert("ID".to_string(), FieldValue::Numeric(Some(layer.id as f64)));
    record.insert(
        "NAME".to_string(),
        FieldValue::Character(Some(truncate(&layer.name, 80))),
    );
    record.insert(
        "LAYERTYPE".to_string(),
        FieldValue::Character(Some(layer.layer_type.as_str().to_string())),
    );
    record.insert(
        "STATUS".to_string(),
        FieldValue::Character(Some(layer.status.as_str().to_string())),
    );
    record.insert("AREA_KM2".to_string(), FieldValue::Numeric(layer.stats.area_km2));
    record.insert("LENGTH_KM".to_string(), FieldValue::Numeric(layer.stats.length_km));

    let write_error =
        |e: shapefile::Error| PipelineError::Validation(anyhow::anyhow!("shapefile write: {e}"));
    match &layer.geometry {
        Geometry::Point(p) => writer
            .write_shape_and_record(&shapefile::Point { x: p.x(), y: p.y() }, &record)
            .map_err(write_error)?,
        Geometry::MultiPoint(mp) => writer
            .write_shape_and_record(&points_to_shp(mp), &record)
            .map_err(write_error)?,
        Geometry::LineString(ls) => writer
            .write_shape_and_record(&lines_to_shp(&MultiLineString(vec![ls.clone()])), &record)
            .map_err(write_error)?,
        Geometry::MultiLineString(mls) => writer
            .write_shape_and_record(&lines_to_shp(mls), &record)
            .map_err(write_error)?,
        Geometry::Polygon(p) => writer
            .write_shape_and_record(&polygons_to_shp(&geo::MultiPolygon(vec![p.clone()])), &record)
            .map_err(write_error)?,
        Geometry::MultiPolygon(mp) => writer
            .write_shape_and_record(&polygons_to_shp(mp), &record)
            .map_err(write_error)?,
        _ => {
            return Err(PipelineError::UnsupportedFormat(
                "shapefile export has no mapping for this geometry".to_string(),
            ))
        }
    }
    Ok(())
}

fn field(name: &str) -> shapefile::dbase::FieldName {
    name.try_into().expect("static field name")
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::{point_layer, polygon_layer};

    #[test]
    fn archive_contains_companions() {
        let layer = polygon_layer(4, "area");
        let bytes = render(&layer).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"layer_4.shp".to_string()));
        assert!(names.contains(&"layer_4.shx".to_string()));
        assert!(names.contains(&"layer_4.dbf".to_string()));
        assert!(names.contains(&"layer_4.prj".to_string()));
    }

    #[test]
    fn multipoint_layer_roundtrips_through_reader() {
        let layer = point_layer(5, "wells");
        let bytes = render(&layer).unwrap();

        // Unpack and read back with the shapefile reader.
        let dir = tempfile::tempdir().unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        archive.extract(dir.path()).unwrap();
        let mut reader = shapefile::Reader::from_path(dir.path().join("layer_5.shp")).unwrap();
        let rows: Vec<_> = reader
            .iter_shapes_and_records()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 1, "one attribute row per layer");
        match &rows[0].0 {
            shapefile::Shape::Multipoint(mp) => assert_eq!(mp.points().len(), 3),
            other => panic!("expected multipoint, got {other}"),
        }
    }
}
