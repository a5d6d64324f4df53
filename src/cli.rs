use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/// Layer pipeline CLI (argument schema only)
#[derive(Parser, Debug)]
#[command(name = "geolayers", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Layer store snapshot file
    #[arg(long, default_value = "layers.json", value_hint = ValueHint::FilePath)]
    pub store: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a geospatial file as a new layer
    Import(ImportArgs),

    /// Analyze a file without creating a layer
    Preview(PreviewArgs),

    /// Export a stored layer to an interchange format
    Export(ExportArgs),

    /// Export several layers into one ZIP archive
    ExportBatch(ExportBatchArgs),

    /// List stored layers or upload history
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Input file (.kml, .kmz, .shp, .zip, .rar, .geojson, .json, .csv, .txt, .tif)
    #[arg(value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Layer name (required)
    #[arg(long)]
    pub name: String,

    /// Free-text description
    #[arg(long, default_value = "")]
    pub description: String,

    /// deposit, infrastructure, zone or custom
    #[arg(long, default_value = "custom")]
    pub layer_type: String,

    /// active, in-development, exploratory or closed
    #[arg(long, default_value = "active")]
    pub status: String,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Layer id
    pub id: u64,

    /// geojson, kml, kmz, shp, csv, wkt or gpx (case-insensitive)
    pub format: String,

    /// Output file (defaults to the generated export filename)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ExportBatchArgs {
    /// Layer ids
    #[arg(required = true)]
    pub ids: Vec<u64>,

    /// Target format for every layer in the batch
    #[arg(long)]
    pub format: String,

    /// Output archive path
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Substring filter over layer names and descriptions
    #[arg(long)]
    pub search: Option<String>,

    /// Show upload history instead of layers
    #[arg(long)]
    pub history: bool,
}
