//! Per-row diagnostics collected during a rebuild

use serde::Serialize;
use std::fmt;

/// Input table a diagnostic refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Location names table
    Locations,
    /// Network blocks table
    Blocks,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Table::Locations => write!(f, "locations"),
            Table::Blocks => write!(f, "blocks"),
        }
    }
}

/// What went wrong with a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Missing column, bad number or undecodable bytes
    InvalidRow,
    /// Network column is not a CIDR
    InvalidCidr,
    /// Block row's key matches no location
    UnresolvedJoin,
    /// Location key repeated for the same language
    DuplicateKey,
    /// Network listed more than once; the later row won
    DuplicateNetwork,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::InvalidRow => "invalid row",
            DiagnosticKind::InvalidCidr => "invalid CIDR",
            DiagnosticKind::UnresolvedJoin => "unresolved join",
            DiagnosticKind::DuplicateKey => "duplicate key",
            DiagnosticKind::DuplicateNetwork => "duplicate network",
        };
        f.write_str(s)
    }
}

/// A problem with one input row; never fatal on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Table the row came from
    pub source: Table,
    /// 1-based line number in the table (0 when unknown)
    pub line: u64,
    /// Category
    pub kind: DiagnosticKind,
    /// Human-readable detail
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic
    pub fn new(source: Table, line: u64, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            source,
            line,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} line {}: {}: {}",
            self.source, self.line, self.kind, self.message
        )
    }
}
