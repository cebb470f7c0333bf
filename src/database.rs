//! Rebuild Coordinator: the live database handle
//!
//! A [`GeoDatabase`] owns the snapshot currently serving queries and swaps
//! it for a freshly built one on rebuild. Readers never wait: each query runs
//! against the snapshot that was current when it started, and the swap is a
//! single atomic pointer store.
//!
//! ```rust,no_run
//! use geoglot::{GeoConfig, GeoDatabase};
//!
//! let db = GeoDatabase::open(GeoConfig::default())?;
//! if let Some(record) = db.lookup("1.0.0.5")? {
//!     println!("{}: {} / {}", record.cidr, record.location.city.en, record.location.city.ar);
//! }
//!
//! let summary = db.rebuild_from_config()?;
//! println!("{}", summary.message());
//! # Ok::<(), geoglot::GeoError>(())
//! ```

use crate::config::GeoConfig;
use crate::error::{GeoError, Result};
use crate::rebuild::{build_database, RebuildOptions, RebuildSummary};
use crate::record::MergedRecord;
use crate::snapshot::Snapshot;
use arc_swap::ArcSwap;
use log::{info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Live, rebuildable database
pub struct GeoDatabase {
    config: GeoConfig,
    current: ArcSwap<Snapshot>,
    rebuilding: AtomicBool,
    /// Bumped on every successful swap
    generation: AtomicU64,
}

/// Holds the single rebuild slot; releases it on drop
struct RebuildGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RebuildGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| GeoError::RebuildInProgress)?;
        Ok(Self { flag })
    }
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl GeoDatabase {
    /// Open the configured database file, building it first if it is missing
    pub fn open(config: GeoConfig) -> Result<Self> {
        config.validate()?;
        let snapshot = if config.database_path.exists() {
            let snapshot = Snapshot::open(&config.database_path)?;
            info!(
                "Loaded {} ({} records)",
                config.database_path.display(),
                snapshot.record_count()
            );
            snapshot
        } else {
            info!(
                "{} not found, building from {}",
                config.database_path.display(),
                config.blocks_path.display()
            );
            let options = RebuildOptions {
                languages: config.languages.clone(),
                generated_at: None,
            };
            let (snapshot, _) = build_database(
                &config.locations_path,
                &config.blocks_path,
                &config.database_path,
                &options,
            )?;
            snapshot
        };
        Ok(Self::from_snapshot(config, snapshot))
    }

    /// Wrap a snapshot that is already loaded
    pub fn from_snapshot(config: GeoConfig, snapshot: Snapshot) -> Self {
        Self {
            config,
            current: ArcSwap::from_pointee(snapshot),
            rebuilding: AtomicBool::new(false),
            generation: AtomicU64::new(1),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &GeoConfig {
        &self.config
    }

    /// The snapshot serving queries right now
    ///
    /// Hold on to it to run several queries against the same data.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Number of snapshots this handle has served, starting at 1
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether a rebuild is running
    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::Acquire)
    }

    /// Look up an address in the current snapshot
    pub fn lookup(&self, query: &str) -> Result<Option<MergedRecord>> {
        self.current.load().lookup(query)
    }

    /// List records of the current snapshot
    pub fn list(&self, offset: usize, limit: usize) -> Result<Vec<MergedRecord>> {
        self.current.load().list(offset, limit)
    }

    /// Rebuild from the given feeds and swap the result in
    ///
    /// Fails with [`GeoError::RebuildInProgress`] if another rebuild is
    /// running on this handle. On any failure the current snapshot keeps
    /// serving.
    pub fn rebuild(&self, locations: &Path, blocks: &Path) -> Result<RebuildSummary> {
        let _guard = RebuildGuard::acquire(&self.rebuilding)?;
        let options = RebuildOptions {
            languages: self.config.languages.clone(),
            generated_at: None,
        };

        match build_database(locations, blocks, &self.config.database_path, &options) {
            Ok((snapshot, summary)) => {
                self.current.store(Arc::new(snapshot));
                let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                info!(
                    "Swapped in new database (generation {}, {} records)",
                    generation, summary.record_count
                );
                Ok(summary)
            }
            Err(e) => {
                warn!("Rebuild failed, keeping current database: {}", e);
                Err(e)
            }
        }
    }

    /// Rebuild from the feeds named in the configuration
    pub fn rebuild_from_config(&self) -> Result<RebuildSummary> {
        let locations = self.config.locations_path.clone();
        let blocks = self.config.blocks_path.clone();
        self.rebuild(&locations, &blocks)
    }
}

impl std::fmt::Debug for GeoDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoDatabase")
            .field("database_path", &self.config.database_path)
            .field("generation", &self.generation())
            .field("rebuilding", &self.is_rebuilding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_builder::DatabaseBuilder;
    use crate::record::LocationRecord;

    fn snapshot() -> Snapshot {
        let mut builder = DatabaseBuilder::new();
        builder.add_record(MergedRecord::new(
            "1.0.0.0/24".parse().unwrap(),
            LocationRecord {
                geoname_id: 1,
                ..Default::default()
            },
        ));
        Snapshot::from_bytes(builder.build().unwrap().bytes).unwrap()
    }

    #[test]
    fn test_handle_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GeoDatabase>();
        assert_send_sync::<Snapshot>();
    }

    #[test]
    fn test_concurrent_rebuild_is_rejected() {
        let db = GeoDatabase::from_snapshot(GeoConfig::default(), snapshot());
        let held = RebuildGuard::acquire(&db.rebuilding).unwrap();
        assert!(db.is_rebuilding());

        let err = db
            .rebuild(Path::new("unused.csv"), Path::new("unused.csv"))
            .unwrap_err();
        assert_eq!(err, GeoError::RebuildInProgress);
        // Still serving
        assert!(db.lookup("1.0.0.1").unwrap().is_some());

        drop(held);
        assert!(!db.is_rebuilding());
    }

    #[test]
    fn test_guard_released_after_failed_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let config = GeoConfig::default().with_database_path(dir.path().join("geo.gdb"));
        let db = GeoDatabase::from_snapshot(config, snapshot());

        let missing = dir.path().join("missing.csv");
        assert!(db.rebuild(&missing, &missing).is_err());
        assert!(!db.is_rebuilding());
        assert_eq!(db.generation(), 1);
        assert!(db.lookup("1.0.0.1").unwrap().is_some());
    }
}
