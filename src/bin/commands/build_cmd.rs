use anyhow::{Context, Result};
use geoglot::{build_database, GeoConfig, Language, RebuildOptions, RebuildStatus};
use std::path::PathBuf;
use std::time::Instant;

use crate::cli_utils::{format_bytes, format_number};

pub fn cmd_build(
    config: Option<PathBuf>,
    locations: Option<PathBuf>,
    blocks: Option<PathBuf>,
    output: Option<PathBuf>,
    languages: Option<Vec<String>>,
    json_output: bool,
) -> Result<()> {
    let mut config = match config {
        Some(path) => GeoConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => GeoConfig::default(),
    };
    if let Some(path) = locations {
        config = config.with_locations_path(path);
    }
    if let Some(path) = blocks {
        config = config.with_blocks_path(path);
    }
    if let Some(path) = output {
        config = config.with_database_path(path);
    }
    if let Some(codes) = languages {
        let parsed = codes
            .iter()
            .map(|c| c.parse::<Language>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid --languages")?;
        config = config.with_languages(parsed);
    }
    config.validate().context("Invalid configuration")?;

    let options = RebuildOptions {
        languages: config.languages.clone(),
        generated_at: None,
    };

    let start = Instant::now();
    let (snapshot, summary) = build_database(
        &config.locations_path,
        &config.blocks_path,
        &config.database_path,
        &options,
    )
    .with_context(|| format!("Failed to build {}", config.database_path.display()))?;
    let elapsed = start.elapsed();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", summary.message());
    println!("  Output:     {}", config.database_path.display());
    println!("  Family:     {}", summary.address_family);
    println!("  Networks:   {}", format_number(summary.record_count));
    println!("  Locations:  {}", format_number(summary.location_count));
    println!("  Size:       {}", format_bytes(snapshot.as_bytes().len()));
    println!("  Skipped:    {}", format_number(summary.skipped));
    println!("  Ignored:    {}", format_number(summary.ignored));
    println!("  Replaced:   {}", format_number(summary.replaced));
    println!("  Time:       {:.2}s", elapsed.as_secs_f64());

    if summary.status == RebuildStatus::PartialSuccess {
        println!();
        println!("Problems:");
        for diagnostic in summary.diagnostics.iter().take(20) {
            println!("  {}", diagnostic);
        }
        if summary.diagnostics.len() > 20 {
            println!("  ... and {} more", summary.diagnostics.len() - 20);
        }
    }

    Ok(())
}
