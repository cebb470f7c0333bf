//! Error types for the geoglot library

use thiserror::Error;

/// Result type alias for geoglot operations
pub type Result<T> = std::result::Result<T, GeoError>;

/// Main error type for geoglot operations
///
/// Row-level problems found while ingesting never surface as a `GeoError`
/// from a rebuild; they are collected as [`Diagnostic`](crate::Diagnostic)s.
/// The `InvalidCidr`, `InvalidRow` and `UnresolvedJoin` variants exist so
/// that the parsing helpers used by the ingestor can report them in typed form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeoError {
    /// Query input is not an IP address
    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    /// Network column could not be parsed as a CIDR
    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    /// Malformed ingestion row
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Block row references a location that does not exist
    #[error("Unresolved join key: {0}")]
    UnresolvedJoin(String),

    /// Table header is not one we know how to read
    #[error("Unrecognized table schema: {0}")]
    Schema(String),

    /// The rebuild produced nothing worth publishing
    #[error("Build aborted: {0}")]
    BuildAborted(String),

    /// Another rebuild already holds the writer slot
    #[error("A rebuild is already in progress")]
    RebuildInProgress,

    /// Writing or publishing the database file failed
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// A database file failed validation
    #[error("Corrupt database: {0}")]
    CorruptArtifact(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource limit exceeded (e.g., too many trie nodes)
    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for GeoError {
    fn from(err: std::io::Error) -> Self {
        GeoError::Io(err.to_string())
    }
}
