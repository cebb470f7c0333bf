//! Configuration for a geoglot deployment
//!
//! ```rust,no_run
//! use geoglot::GeoConfig;
//!
//! let config = GeoConfig::from_json_file("geoglot.json")?
//!     .with_database_path("/var/lib/geoglot/city.gdb");
//! config.validate()?;
//! # Ok::<(), geoglot::GeoError>(())
//! ```

use crate::error::{GeoError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A language the database carries names for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English
    En,
    /// Arabic
    Ar,
}

impl Language {
    /// Locale code as it appears in the feeds
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ar => "ar",
        }
    }

    /// Parse a feed locale code; an empty code means English
    pub fn from_locale(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.is_empty() || code.eq_ignore_ascii_case("en") {
            Some(Language::En)
        } else if code.eq_ignore_ascii_case("ar") {
            Some(Language::Ar)
        } else {
            None
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "ar" => Ok(Language::Ar),
            other => Err(GeoError::Config(format!("unsupported language '{}'", other))),
        }
    }
}

/// Where the feeds and the database live, and which languages to load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeoConfig {
    /// Location names table
    pub locations_path: PathBuf,
    /// Network blocks table
    pub blocks_path: PathBuf,
    /// Database file to load and publish
    pub database_path: PathBuf,
    /// Languages loaded from the locations table
    pub languages: Vec<Language>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            locations_path: PathBuf::from("./db/GeoLite2-City-Locations.csv"),
            blocks_path: PathBuf::from("./db/GeoLite2-City-Blocks-IPv4.csv"),
            database_path: PathBuf::from("./db/GeoLite2-City-Custom.gdb"),
            languages: vec![Language::En, Language::Ar],
        }
    }
}

impl GeoConfig {
    /// Load from a JSON file; missing keys take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GeoError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| GeoError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Set the locations table path
    pub fn with_locations_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.locations_path = path.into();
        self
    }

    /// Set the blocks table path
    pub fn with_blocks_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.blocks_path = path.into();
        self
    }

    /// Set the database path
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the enabled languages
    pub fn with_languages(mut self, languages: Vec<Language>) -> Self {
        self.languages = languages;
        self
    }

    /// Reject configurations that cannot produce a database
    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            return Err(GeoError::Config("no languages enabled".to_string()));
        }
        for (i, lang) in self.languages.iter().enumerate() {
            if self.languages[..i].contains(lang) {
                return Err(GeoError::Config(format!("language '{}' listed twice", lang)));
            }
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(GeoError::Config("database_path is empty".to_string()));
        }
        Ok(())
    }
}
