use anyhow::Result;
use clap::Parser;

use geolayers::cli::{Cli, Commands};
use geolayers::commands;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match &cli.command {
        Commands::Import(args) => commands::import(&cli, args),
        Commands::Preview(args) => commands::preview(&cli, args),
        Commands::Export(args) => commands::export(&cli, args),
        Commands::ExportBatch(args) => commands::export_batch(&cli, args),
        Commands::List(args) => commands::list(&cli, args),
    }
}
