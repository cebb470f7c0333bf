use anyhow::{Context, Result};
use geoglot::Snapshot;
use std::path::PathBuf;

pub fn cmd_query(database: PathBuf, address: String, quiet: bool) -> Result<()> {
    let snapshot = Snapshot::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let result = snapshot
        .lookup(&address)
        .with_context(|| format!("Query failed for: {}", address))?;
    let found = result.is_some();

    if !quiet {
        // `null` when not found
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    std::process::exit(if found { 0 } else { 1 });
}
