//! Atomic publication of database files
//!
//! A new database is written next to its destination, verified through a
//! fresh memory map, and only then renamed over the destination. Readers of
//! the old file keep their mapping; readers opening the path afterwards see
//! the new file. A failure at any step leaves the destination untouched.

use crate::error::{GeoError, Result};
use crate::snapshot::Snapshot;
use log::{debug, info};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write `bytes` to `path` atomically and return the verified snapshot
///
/// `expected_records` must match the record count in the written header.
pub fn publish(bytes: &[u8], path: &Path, expected_records: u32) -> Result<Snapshot> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| {
        GeoError::WriteFailure(format!("cannot create {}: {}", dir.display(), e))
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
        GeoError::WriteFailure(format!("cannot create temp file in {}: {}", dir.display(), e))
    })?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| GeoError::WriteFailure(format!("writing {}: {}", tmp.path().display(), e)))?;
    debug!("Wrote {} bytes to {}", bytes.len(), tmp.path().display());

    let snapshot =
        Snapshot::map_file(tmp.as_file()).map_err(|e| verify_error(e, tmp.path()))?;
    if snapshot.record_count() != expected_records {
        return Err(GeoError::CorruptArtifact(format!(
            "written file has {} records, expected {}",
            snapshot.record_count(),
            expected_records
        )));
    }

    set_readonly(tmp.as_file())?;

    tmp.persist(path).map_err(|e| {
        GeoError::WriteFailure(format!("cannot rename into {}: {}", path.display(), e.error))
    })?;
    info!(
        "Published {} ({} records, {} bytes)",
        path.display(),
        expected_records,
        bytes.len()
    );
    Ok(snapshot)
}

/// I/O while re-reading the temp file is a write failure; a bad file stays
/// `CorruptArtifact`
fn verify_error(err: GeoError, tmp: &Path) -> GeoError {
    match err {
        GeoError::Io(msg) => GeoError::WriteFailure(format!("{}: {}", tmp.display(), msg)),
        other => other,
    }
}

#[cfg(unix)]
fn set_readonly(file: &std::fs::File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o444))
        .map_err(|e| GeoError::WriteFailure(format!("cannot set permissions: {}", e)))
}

#[cfg(not(unix))]
fn set_readonly(_file: &std::fs::File) -> Result<()> {
    Ok(())
}
