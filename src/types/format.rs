use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Logical format of an uploaded source file, detected from its extension.
///
/// Archives carry their own tags because they need an extraction step before
/// the Shapefile parser can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileFormat {
    #[serde(rename = "KML")]
    Kml,
    #[serde(rename = "KMZ")]
    Kmz,
    #[serde(rename = "SHP")]
    Shp,
    /// Shapefile wrapped in a ZIP archive.
    #[serde(rename = "SHP_ZIP")]
    ShpZip,
    /// Shapefile wrapped in a RAR archive.
    #[serde(rename = "SHP_RAR")]
    ShpRar,
    #[serde(rename = "GEOJSON")]
    GeoJson,
    #[serde(rename = "CSV")]
    Csv,
    #[serde(rename = "TXT")]
    Txt,
    #[serde(rename = "TIFF")]
    Tiff,
}

impl FileFormat {
    /// Extension table. Pure and total: anything not listed is unsupported.
    const EXTENSIONS: [(&'static str, FileFormat); 11] = [
        ("kml", FileFormat::Kml),
        ("kmz", FileFormat::Kmz),
        ("shp", FileFormat::Shp),
        ("zip", FileFormat::ShpZip),
        ("rar", FileFormat::ShpRar),
        ("geojson", FileFormat::GeoJson),
        ("json", FileFormat::GeoJson),
        ("csv", FileFormat::Csv),
        ("txt", FileFormat::Txt),
        ("tif", FileFormat::Tiff),
        ("tiff", FileFormat::Tiff),
    ];

    /// Detect the format of `path` from its extension (case-insensitive).
    pub fn detect(path: &Path) -> Result<FileFormat, PipelineError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Self::EXTENSIONS
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, f)| *f)
            .ok_or_else(|| PipelineError::UnsupportedFormat(format!(".{ext}")))
    }

    pub fn supported_extensions() -> Vec<&'static str> {
        Self::EXTENSIONS.iter().map(|(e, _)| *e).collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Kml => "KML",
            FileFormat::Kmz => "KMZ",
            FileFormat::Shp => "SHP",
            FileFormat::ShpZip => "SHP_ZIP",
            FileFormat::ShpRar => "SHP_RAR",
            FileFormat::GeoJson => "GEOJSON",
            FileFormat::Csv => "CSV",
            FileFormat::Txt => "TXT",
            FileFormat::Tiff => "TIFF",
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target format for layer export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    GeoJson,
    Kml,
    Kmz,
    Shp,
    Csv,
    Wkt,
    Gpx,
}

impl ExportFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::GeoJson => "application/geo+json",
            ExportFormat::Kml => "application/vnd.google-earth.kml+xml",
            ExportFormat::Kmz => "application/vnd.google-earth.kmz",
            ExportFormat::Shp => "application/x-shapefile",
            ExportFormat::Csv => "text/csv",
            ExportFormat::Wkt => "text/plain",
            ExportFormat::Gpx => "application/gpx+xml",
        }
    }

    /// File extension of the rendered output. Shapefile exports are delivered
    /// as a ZIP of companion files.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::GeoJson => "geojson",
            ExportFormat::Kml => "kml",
            ExportFormat::Kmz => "kmz",
            ExportFormat::Shp => "zip",
            ExportFormat::Csv => "csv",
            ExportFormat::Wkt => "wkt",
            ExportFormat::Gpx => "gpx",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::GeoJson => "GEOJSON",
            ExportFormat::Kml => "KML",
            ExportFormat::Kmz => "KMZ",
            ExportFormat::Shp => "SHP",
            ExportFormat::Csv => "CSV",
            ExportFormat::Wkt => "WKT",
            ExportFormat::Gpx => "GPX",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, PipelineError> {
        match s.to_ascii_lowercase().as_str() {
            "geojson" | "json" => Ok(ExportFormat::GeoJson),
            "kml" => Ok(ExportFormat::Kml),
            "kmz" => Ok(ExportFormat::Kmz),
            "shp" | "shapefile" => Ok(ExportFormat::Shp),
            "csv" => Ok(ExportFormat::Csv),
            "wkt" => Ok(ExportFormat::Wkt),
            "gpx" => Ok(ExportFormat::Gpx),
            other => Err(PipelineError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
