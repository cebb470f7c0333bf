//! Geoglot - Bilingual GeoIP Lookup Database
//!
//! Geoglot compiles GeoLite2-style CSV feeds (network blocks plus
//! per-language location names) into a compact binary trie, and answers
//! longest-prefix-match lookups with English and Arabic names for the
//! continent, country and city of an IP address.
//!
//! # Quick Start
//!
//! ```rust
//! use geoglot::{DatabaseBuilder, LocalizedName, LocationRecord, MergedRecord, Snapshot};
//!
//! let mut builder = DatabaseBuilder::new();
//! let sydney = LocationRecord {
//!     geoname_id: 2147714,
//!     city: LocalizedName::new("Sydney", "سيدني"),
//!     ..Default::default()
//! };
//! builder.add_record(MergedRecord::new("1.0.0.0/24".parse()?, sydney));
//!
//! let snapshot = Snapshot::from_bytes(builder.build()?.bytes)?;
//! let hit = snapshot.lookup("1.0.0.5")?.expect("covered");
//! assert_eq!(hit.cidr, "1.0.0.0/24");
//! assert_eq!(hit.location.city.ar, "سيدني");
//! assert!(snapshot.lookup("8.8.8.8")?.is_none());
//! # Ok::<(), geoglot::GeoError>(())
//! ```
//!
//! For a live service, [`GeoDatabase`] keeps the current snapshot and
//! rebuilds from the feeds without interrupting lookups.
//!
//! # Architecture
//!
//! ```text
//! locations.csv ─┐
//!                ├─ ingest ─ merge ─ DatabaseBuilder ─ writer::publish
//! blocks.csv ────┘                                          │
//!                                                    [file on disk]
//!                                                           │ mmap
//!                                  GeoDatabase ── ArcSwap<Snapshot> ── lookup / list
//! ```
//!
//! # File Format
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  Header (56 bytes, checksummed body) │
//! ├──────────────────────────────────────┤
//! │  Node table (12 bytes per node)      │
//! ├──────────────────────────────────────┤
//! │  Data section (deduplicated records) │
//! └──────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Configuration and language selection
pub mod config;
/// Data section encoding/decoding
pub mod data_section;
/// Live database handle with atomic rebuilds
pub mod database;
/// Builds database files from merged records
pub mod database_builder;
/// Per-row problems found while reading feeds
pub mod diagnostic;
/// Error types
pub mod error;
pub mod file_reader;
/// On-disk layout
pub mod format;
pub mod ingest;
/// IP tree builder
pub mod ip_tree_builder;
pub mod merge;
pub mod rebuild;
/// Networks, locations and merged records
pub mod record;
pub mod snapshot;
pub mod writer;

// Re-exports for Rust consumers

pub use crate::config::{GeoConfig, Language};
pub use crate::database::GeoDatabase;
pub use crate::database_builder::{BuildStats, BuiltDatabase, DatabaseBuilder};
pub use crate::diagnostic::{Diagnostic, DiagnosticKind, Table};
pub use crate::error::{GeoError, Result};
pub use crate::rebuild::{build_database, RebuildOptions, RebuildStatus, RebuildSummary};
pub use crate::record::{
    AddressFamily, Continent, Country, LocalizedName, LocationRecord, MergedRecord, NetworkKey,
};
pub use crate::snapshot::{Snapshot, SnapshotInfo, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
