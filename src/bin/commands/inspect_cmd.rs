use anyhow::{Context, Result};
use geoglot::Snapshot;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{format_bytes, format_number, format_unix_timestamp};

pub fn cmd_inspect(database: PathBuf, json_output: bool) -> Result<()> {
    let snapshot = Snapshot::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;
    let info = snapshot.info();

    if json_output {
        let mut output = serde_json::to_value(&info)?;
        output["file"] = json!(database.display().to_string());
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database:   {}", database.display());
    println!("Family:     {}", info.address_family);
    println!("Networks:   {}", format_number(info.record_count as usize));
    println!("Locations:  {}", format_number(info.location_count as usize));
    println!("Nodes:      {}", format_number(info.node_count as usize));
    println!("Size:       {}", format_bytes(info.size));
    println!("Built:      {}", format_unix_timestamp(info.generated_at));
    println!("Checksum:   {}", info.checksum);
    Ok(())
}
