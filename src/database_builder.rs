//! Database Builder
//!
//! Turns a sequence of [`MergedRecord`]s into the bytes of a database file:
//! records are inserted into an [`IpTreeBuilder`], the surviving payloads are
//! encoded into a deduplicated data section, and the header, node table and
//! data section are assembled by [`format::assemble`].
//!
//! # Example
//!
//! ```
//! use geoglot::{DatabaseBuilder, LocationRecord, MergedRecord, Snapshot};
//!
//! let mut builder = DatabaseBuilder::new();
//! let location = LocationRecord { geoname_id: 1, ..Default::default() };
//! builder.add_record(MergedRecord::new("10.0.0.0/8".parse()?, location));
//!
//! let built = builder.build()?;
//! let snapshot = Snapshot::from_bytes(built.bytes)?;
//! assert!(snapshot.lookup("10.1.2.3")?.is_some());
//! # Ok::<(), geoglot::GeoError>(())
//! ```

use crate::data_section::DataEncoder;
use crate::error::{GeoError, Result};
use crate::format;
use crate::ip_tree_builder::IpTreeBuilder;
use crate::record::{AddressFamily, MergedRecord};
use std::time::{SystemTime, UNIX_EPOCH};

/// Builder statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStats {
    /// Address family chosen for the database
    pub family: AddressFamily,
    /// Networks in the database
    pub record_count: usize,
    /// Distinct location records in the data section
    pub location_count: usize,
    /// Trie nodes
    pub node_count: usize,
    /// Size of the data section in bytes
    pub data_size: usize,
    /// Indices of records that replaced an earlier record for the same network
    pub replaced: Vec<usize>,
    /// Build timestamp written to the header
    pub generated_at: u64,
}

/// A built database file and its statistics
#[derive(Debug, Clone)]
pub struct BuiltDatabase {
    /// Complete file contents
    pub bytes: Vec<u8>,
    /// What went into it
    pub stats: BuildStats,
}

/// Database builder
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    records: Vec<MergedRecord>,
    generated_at: Option<u64>,
}

impl DatabaseBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the generation timestamp instead of using the current time
    pub fn with_generated_at(mut self, unix_secs: u64) -> Self {
        self.generated_at = Some(unix_secs);
        self
    }

    /// Add a record
    pub fn add_record(&mut self, record: MergedRecord) {
        self.records.push(record);
    }

    /// Add many records
    pub fn extend<I: IntoIterator<Item = MergedRecord>>(&mut self, records: I) {
        self.records.extend(records);
    }

    /// Number of records added so far
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records were added
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build the database file
    ///
    /// The database is IPv6 if any record is IPv6, otherwise IPv4. For the
    /// same records and timestamp the output is byte-for-byte identical.
    pub fn build(&self) -> Result<BuiltDatabase> {
        let family = if self
            .records
            .iter()
            .any(|r| r.network.family() == AddressFamily::V6)
        {
            AddressFamily::V6
        } else {
            AddressFamily::V4
        };

        let mut tree = IpTreeBuilder::new(family);
        let mut replaced = Vec::new();
        for (position, record) in self.records.iter().enumerate() {
            let index = u32::try_from(position)
                .map_err(|_| GeoError::ResourceLimit("too many records".to_string()))?;
            if tree.insert(&record.network, index)?.is_some() {
                replaced.push(position);
            }
        }

        // Encode surviving records in input order so offsets are reproducible
        let mut live: Vec<u32> = tree.payloads().collect();
        live.sort_unstable();
        let mut encoder = DataEncoder::new();
        let mut offsets = vec![format::NONE; self.records.len()];
        for index in live {
            let record = &self.records[index as usize];
            offsets[index as usize] = encoder.encode(record.network.family(), &record.location)?;
        }

        let nodes = tree.to_node_table(|index| Ok(offsets[index as usize]))?;
        let record_count = tree.payload_count();
        let location_count = encoder.unique_count();
        let data_size = encoder.size();
        let data = encoder.into_bytes();
        let generated_at = self.generated_at.unwrap_or_else(unix_now);

        let bytes = format::assemble(
            family,
            record_count as u32,
            location_count as u32,
            &nodes,
            &data,
            generated_at,
        )?;

        Ok(BuiltDatabase {
            bytes,
            stats: BuildStats {
                family,
                record_count,
                location_count,
                node_count: nodes.len(),
                data_size,
                replaced,
                generated_at,
            },
        })
    }
}

/// Current time as unix seconds (0 if the clock is before the epoch)
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
