//! Rebuild pipeline: feeds in, published database out
//!
//! [`build_database`] runs ingest, merge, build and publish in order. Nothing
//! at the output path changes unless every step succeeds. Row-level problems
//! do not stop the rebuild; they are returned in the [`RebuildSummary`].

use crate::config::Language;
use crate::database_builder::DatabaseBuilder;
use crate::diagnostic::{Diagnostic, DiagnosticKind, Table};
use crate::error::{GeoError, Result};
use crate::ingest::{ingest_blocks, ingest_locations, BlockReader, LocationReader};
use crate::merge::{merge, LocationIndex};
use crate::snapshot::Snapshot;
use crate::writer;
use log::{info, warn};
use serde::Serialize;
use std::path::Path;

/// Overall outcome of a rebuild that published a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildStatus {
    /// Every row made it in
    Success,
    /// Published, but some rows had problems
    PartialSuccess,
}

/// Report of a completed rebuild
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildSummary {
    /// Success or partial success
    pub status: RebuildStatus,
    /// Networks in the new database
    pub record_count: usize,
    /// Distinct location records in the new database
    pub location_count: usize,
    /// Block rows that did not make it in (invalid or unresolved)
    pub skipped: usize,
    /// Location rows in languages that are not enabled
    pub ignored: usize,
    /// Networks listed more than once
    pub replaced: usize,
    /// "IPv4" or "IPv6"
    pub address_family: String,
    /// Build timestamp (unix seconds)
    pub generated_at: u64,
    /// Every row-level problem, locations table first
    pub diagnostics: Vec<Diagnostic>,
}

impl RebuildSummary {
    /// One-line description
    pub fn message(&self) -> String {
        match self.status {
            RebuildStatus::Success => {
                format!("Database rebuilt with {} records.", self.record_count)
            }
            RebuildStatus::PartialSuccess => format!(
                "Database rebuilt with {} records, but {} rows had problems.",
                self.record_count,
                self.diagnostics.len()
            ),
        }
    }
}

/// Knobs for a rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildOptions {
    /// Languages read from the locations table
    pub languages: Vec<Language>,
    /// Fixed build timestamp; the current time when `None`
    pub generated_at: Option<u64>,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            languages: vec![Language::En, Language::Ar],
            generated_at: None,
        }
    }
}

/// Build a database from the two feeds and publish it at `output`
///
/// Fails with [`GeoError::BuildAborted`] when no block row survives, leaving
/// `output` untouched.
pub fn build_database(
    locations: &Path,
    blocks: &Path,
    output: &Path,
    options: &RebuildOptions,
) -> Result<(Snapshot, RebuildSummary)> {
    if options.languages.is_empty() {
        return Err(GeoError::Config("no languages enabled".to_string()));
    }
    info!(
        "Rebuilding {} from {} and {}",
        output.display(),
        locations.display(),
        blocks.display()
    );

    let locs = ingest_locations(LocationReader::from_path(locations, &options.languages)?)?;
    let blks = ingest_blocks(BlockReader::from_path(blocks)?)?;

    let (index, duplicate_keys) = LocationIndex::build(locs.rows);
    let merged = merge(&index, blks.rows);
    let skipped = blks.diagnostics.len() + merged.unresolved;

    if merged.records.is_empty() {
        let reason = format!(
            "no block row could be joined to a location ({} invalid, {} unresolved, {} locations)",
            blks.diagnostics.len(),
            merged.unresolved,
            index.len()
        );
        warn!("Rebuild of {} aborted: {}", output.display(), reason);
        return Err(GeoError::BuildAborted(reason));
    }

    let mut builder = DatabaseBuilder::new();
    if let Some(ts) = options.generated_at {
        builder = builder.with_generated_at(ts);
    }
    builder.extend(merged.records.iter().cloned());
    let built = builder.build()?;
    let stats = built.stats;

    let mut diagnostics = locs.diagnostics;
    diagnostics.extend(duplicate_keys);
    diagnostics.extend(blks.diagnostics);
    diagnostics.extend(merged.diagnostics);
    diagnostics.extend(stats.replaced.iter().map(|&i| {
        Diagnostic::new(
            Table::Blocks,
            merged.lines[i],
            DiagnosticKind::DuplicateNetwork,
            format!("{} listed again; this row replaces the earlier one", merged.records[i].cidr),
        )
    }));

    let snapshot = writer::publish(&built.bytes, output, stats.record_count as u32)?;

    let status = if diagnostics.is_empty() {
        RebuildStatus::Success
    } else {
        warn!("{} rows had problems during rebuild", diagnostics.len());
        RebuildStatus::PartialSuccess
    };
    let summary = RebuildSummary {
        status,
        record_count: stats.record_count,
        location_count: stats.location_count,
        skipped,
        ignored: locs.ignored,
        replaced: stats.replaced.len(),
        address_family: stats.family.to_string(),
        generated_at: stats.generated_at,
        diagnostics,
    };
    info!("{}", summary.message());
    Ok((snapshot, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const LOCATIONS: &str = "\
geoname_id,locale_code,continent_code,continent_name,country_iso_code,country_name,city_name,time_zone
2147714,en,OC,Oceania,AU,Australia,Sydney,Australia/Sydney
2147714,ar,OC,أوقيانوسيا,AU,أستراليا,سيدني,Australia/Sydney
";

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn options() -> RebuildOptions {
        RebuildOptions {
            generated_at: Some(1_700_000_000),
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let locs = write(dir.path(), "loc.csv", LOCATIONS);
        let blocks = write(dir.path(), "blocks.csv", "network,geoname_id\n1.0.0.0/24,2147714\n");
        let out = dir.path().join("geo.gdb");

        let (snapshot, summary) = build_database(&locs, &blocks, &out, &options()).unwrap();
        assert_eq!(summary.status, RebuildStatus::Success);
        assert_eq!(summary.record_count, 1);
        assert_eq!(summary.address_family, "IPv4");
        assert_eq!(summary.generated_at, 1_700_000_000);
        assert_eq!(snapshot.lookup("1.0.0.1").unwrap().unwrap().location.city.ar, "سيدني");
        assert!(out.exists());
    }

    #[test]
    fn test_partial_success_collects_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let locs = write(dir.path(), "loc.csv", LOCATIONS);
        let blocks = write(
            dir.path(),
            "blocks.csv",
            "network,geoname_id\n1.0.0.0/24,2147714\nbogus,2147714\n2.0.0.0/8,42\n1.0.0.0/24,2147714\n",
        );
        let out = dir.path().join("geo.gdb");

        let (_, summary) = build_database(&locs, &blocks, &out, &options()).unwrap();
        assert_eq!(summary.status, RebuildStatus::PartialSuccess);
        assert_eq!(summary.record_count, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.replaced, 1);
        let kinds: Vec<_> = summary.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::InvalidCidr,
                DiagnosticKind::UnresolvedJoin,
                DiagnosticKind::DuplicateNetwork,
            ]
        );
        assert_eq!(summary.diagnostics[2].line, 5);
    }

    #[test]
    fn test_nothing_joined_aborts_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let locs = write(dir.path(), "loc.csv", LOCATIONS);
        let blocks = write(dir.path(), "blocks.csv", "network,geoname_id\n1.0.0.0/24,x\n");
        let out = dir.path().join("geo.gdb");

        let err = build_database(&locs, &blocks, &out, &options()).unwrap_err();
        assert!(matches!(err, GeoError::BuildAborted(_)));
        assert!(!out.exists());
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = write(dir.path(), "blocks.csv", "network,geoname_id\n");
        let err = build_database(
            &dir.path().join("missing.csv"),
            &blocks,
            &dir.path().join("geo.gdb"),
            &options(),
        )
        .unwrap_err();
        assert!(matches!(err, GeoError::Io(_)));
    }
}
