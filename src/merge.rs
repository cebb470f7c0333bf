//! Record Merger
//!
//! Joins the locations table with the blocks table. Location rows arrive one
//! per language and are folded into a single bilingual [`LocationRecord`] per
//! `geoname_id`; each block row is then paired with the record its key names.

use crate::config::Language;
use crate::diagnostic::{Diagnostic, DiagnosticKind, Table};
use crate::ingest::{BlockRow, LocationRow};
use crate::record::{LocationRecord, MergedRecord};
use log::debug;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
struct Entry {
    record: LocationRecord,
    seen_en: bool,
    seen_ar: bool,
}

/// Bilingual location records keyed by `geoname_id`
#[derive(Debug, Default)]
pub struct LocationIndex {
    entries: FxHashMap<u32, Entry>,
}

impl LocationIndex {
    /// Fold location rows into one record per key
    ///
    /// A second row for the same key and language replaces the first and is
    /// reported as [`DiagnosticKind::DuplicateKey`]. Codes and time zone take
    /// the last non-empty value seen for the key.
    pub fn build<I>(rows: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = LocationRow>,
    {
        let mut entries: FxHashMap<u32, Entry> = FxHashMap::default();
        let mut diagnostics = Vec::new();

        for row in rows {
            let entry = entries.entry(row.geoname_id).or_insert_with(|| Entry {
                record: LocationRecord {
                    geoname_id: row.geoname_id,
                    ..Default::default()
                },
                ..Default::default()
            });

            let seen = match row.language {
                Language::En => &mut entry.seen_en,
                Language::Ar => &mut entry.seen_ar,
            };
            if *seen {
                diagnostics.push(Diagnostic::new(
                    Table::Locations,
                    row.line,
                    DiagnosticKind::DuplicateKey,
                    format!(
                        "geoname_id {} repeated for '{}'; this row replaces the earlier one",
                        row.geoname_id, row.language
                    ),
                ));
            }
            *seen = true;

            let record = &mut entry.record;
            let (continent, country, city) = match row.language {
                Language::En => (
                    &mut record.continent.names.en,
                    &mut record.country.names.en,
                    &mut record.city.en,
                ),
                Language::Ar => (
                    &mut record.continent.names.ar,
                    &mut record.country.names.ar,
                    &mut record.city.ar,
                ),
            };
            *continent = row.continent_name;
            *country = row.country_name;
            *city = row.city_name;

            if !row.continent_code.is_empty() {
                record.continent.code = row.continent_code;
            }
            if !row.country_iso_code.is_empty() {
                record.country.iso_code = row.country_iso_code;
            }
            if !row.time_zone.is_empty() {
                record.time_zone = row.time_zone;
            }
        }

        debug!("Indexed {} locations", entries.len());
        (Self { entries }, diagnostics)
    }

    /// Location for a key, without any block-level fields
    pub fn get(&self, geoname_id: u32) -> Option<&LocationRecord> {
        self.entries.get(&geoname_id).map(|e| &e.record)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of joining blocks with locations
#[derive(Debug, Default)]
pub struct MergeOutput {
    /// One record per resolved block row, in input order
    pub records: Vec<MergedRecord>,
    /// Blocks table line of each entry in `records`
    pub lines: Vec<u64>,
    /// One [`DiagnosticKind::UnresolvedJoin`] per dropped row
    pub diagnostics: Vec<Diagnostic>,
    /// Number of dropped rows
    pub unresolved: usize,
}

/// Join block rows with the location index
pub fn merge<I>(index: &LocationIndex, blocks: I) -> MergeOutput
where
    I: IntoIterator<Item = BlockRow>,
{
    let mut out = MergeOutput::default();
    for block in blocks {
        let Some(base) = index.get(block.geoname_id) else {
            out.unresolved += 1;
            out.diagnostics.push(Diagnostic::new(
                Table::Blocks,
                block.line,
                DiagnosticKind::UnresolvedJoin,
                format!(
                    "{}: geoname_id {} has no location",
                    block.network, block.geoname_id
                ),
            ));
            continue;
        };

        let location = LocationRecord {
            latitude: block.latitude,
            longitude: block.longitude,
            postal_code: block.postal_code,
            ..base.clone()
        };
        out.records.push(MergedRecord::new(block.network, location));
        out.lines.push(block.line);
    }
    debug!(
        "Merged {} records ({} unresolved)",
        out.records.len(),
        out.unresolved
    );
    out
}
