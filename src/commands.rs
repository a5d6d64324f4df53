use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::capability::GeometryCapability;
use crate::cli::{Cli, ExportArgs, ExportBatchArgs, ImportArgs, ListArgs, PreviewArgs};
use crate::export;
use crate::import::ImportService;
use crate::store::{JsonStore, LayerStore};
use crate::types::{ExportFormat, LayerConfig};

pub fn import(cli: &Cli, args: &ImportArgs) -> Result<()> {
    let config = LayerConfig::parse(&args.name, &args.description, &args.layer_type, &args.status)?;
    let mut store = JsonStore::open(&cli.store)?;
    let capability = GeometryCapability::detect();

    let outcome = ImportService::new(&mut store, capability).import_file(&args.file, &config)?;
    println!(
        "Imported layer {} ({} features) from {}",
        outcome.layer_id,
        outcome.feature_count,
        args.file.display()
    );
    Ok(())
}

pub fn preview(cli: &Cli, args: &PreviewArgs) -> Result<()> {
    let mut store = JsonStore::open(&cli.store)?;
    let capability = GeometryCapability::detect();

    let preview = ImportService::new(&mut store, capability).preview(&args.file)?;
    println!("Format:        {}", preview.file_format);
    println!("Features:      {}", preview.feature_count);
    if let Some(main) = &preview.main_geometry_type {
        println!("Main geometry: {main}");
    }
    for (kind, count) in &preview.geometry_types {
        println!("  {kind}: {count}");
    }
    if let Some(bounds) = preview.bounds {
        println!("Bounds:        [{:.5}, {:.5}, {:.5}, {:.5}]", bounds[0], bounds[1], bounds[2], bounds[3]);
    }
    println!("CRS:           {}", preview.crs);
    println!("Size:          {} bytes", preview.file_size_bytes);
    Ok(())
}

pub fn export(cli: &Cli, args: &ExportArgs) -> Result<()> {
    let store = JsonStore::open(&cli.store)?;
    let format: ExportFormat = args.format.parse()?;
    let layer = store
        .layer(args.id)
        .ok_or_else(|| anyhow!("layer {} not found", args.id))?;

    let rendered = export::export_layer(layer, format)?;
    let path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&rendered.filename));
    std::fs::write(&path, &rendered.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Exported layer {} to {} ({})", args.id, path.display(), rendered.mime_type);
    Ok(())
}

pub fn export_batch(cli: &Cli, args: &ExportBatchArgs) -> Result<()> {
    let store = JsonStore::open(&cli.store)?;
    let format: ExportFormat = args.format.parse()?;

    let rendered = export::export_batch(&store, &args.ids, format)?;
    let path = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&rendered.filename));
    std::fs::write(&path, &rendered.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Exported {} layers to {}", args.ids.len(), path.display());
    Ok(())
}

pub fn list(cli: &Cli, args: &ListArgs) -> Result<()> {
    let store = JsonStore::open(&cli.store)?;

    if args.history {
        for record in store.uploads() {
            println!(
                "#{} {} [{:?}] {} -> layer {:?} ({} features)",
                record.id,
                record.original_filename,
                record.status,
                record.file_format,
                record.layer_id,
                record.feature_count.unwrap_or(0),
            );
        }
        return Ok(());
    }

    let layers = match &args.search {
        Some(query) => store.search_layers(query),
        None => store.layers(),
    };
    for layer in layers {
        let measure = if let Some(area) = layer.stats.area_km2 {
            format!("{area:.2} km2")
        } else if let Some(length) = layer.stats.length_km {
            format!("{length:.2} km")
        } else if let Some(count) = layer.stats.point_count {
            format!("{count} points")
        } else {
            "-".to_string()
        };
        println!(
            "#{} {} [{}] {} {} {}",
            layer.id,
            layer.name,
            layer.layer_type.as_str(),
            layer.geometry_kind.as_str(),
            layer.status.as_str(),
            measure,
        );
    }
    Ok(())
}
