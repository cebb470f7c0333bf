use anyhow::{Context, Result};
use geoglot::Snapshot;
use std::path::PathBuf;

pub fn cmd_list(database: PathBuf, offset: usize, limit: usize) -> Result<()> {
    let snapshot = Snapshot::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let records = snapshot
        .list(offset, limit)
        .with_context(|| format!("Listing failed at offset {}", offset))?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
