//! Record Ingestor
//!
//! Reads the two feed tables into typed rows:
//!
//! - the **locations** table, one row per location and language
//!   (`geoname_id`, `locale_code`, continent/country/city names, `time_zone`)
//! - the **blocks** table, one row per network (`network`, `geoname_id`,
//!   `registered_country_geoname_id`, `postal_code`, `latitude`, `longitude`)
//!
//! Readers are lazy iterators over `Result<Result<Row, Diagnostic>>`. The
//! outer error is fatal (the input could not be read at all); the inner one
//! is a problem with a single row, which the caller collects and moves past.
//!
//! ```
//! use geoglot::ingest::BlockReader;
//!
//! let csv = "network,geoname_id\n1.0.0.0/24,2147714\nbogus,1\n";
//! let mut rows = BlockReader::new(csv.as_bytes())?;
//! assert!(rows.next().unwrap()?.is_ok());
//! assert!(rows.next().unwrap()?.is_err());
//! assert!(rows.next().is_none());
//! # Ok::<(), geoglot::GeoError>(())
//! ```

use crate::config::Language;
use crate::diagnostic::{Diagnostic, DiagnosticKind, Table};
use crate::error::{GeoError, Result};
use crate::file_reader;
use crate::record::NetworkKey;
use csv::{StringRecord, StringRecordsIntoIter};
use log::debug;
use std::io::Read;
use std::path::Path;

/// Item type of the row readers
pub type RowResult<T> = Result<std::result::Result<T, Diagnostic>>;

/// One row of the locations table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRow {
    /// Join key
    pub geoname_id: u32,
    /// Language of the names in this row
    pub language: Language,
    /// Two-letter continent code
    pub continent_code: String,
    /// Continent name in `language`
    pub continent_name: String,
    /// ISO country code
    pub country_iso_code: String,
    /// Country name in `language`
    pub country_name: String,
    /// City name in `language`
    pub city_name: String,
    /// IANA time zone
    pub time_zone: String,
    /// Line in the table
    pub line: u64,
}

/// One row of the blocks table
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRow {
    /// Network
    pub network: NetworkKey,
    /// Join key (`geoname_id`, else `registered_country_geoname_id`)
    pub geoname_id: u32,
    /// Latitude in degrees
    pub latitude: Option<f64>,
    /// Longitude in degrees
    pub longitude: Option<f64>,
    /// Postal code
    pub postal_code: Option<String>,
    /// Line in the table
    pub line: u64,
}

/// Everything read from one table
#[derive(Debug, Clone, Default)]
pub struct Ingested<T> {
    /// Rows that parsed
    pub rows: Vec<T>,
    /// Rows that did not
    pub diagnostics: Vec<Diagnostic>,
    /// Rows skipped on purpose (languages not enabled)
    pub ignored: usize,
}

/// Column lookup for a header row
struct HeaderMap {
    table: Table,
    names: Vec<String>,
}

impl HeaderMap {
    fn new(table: Table, headers: &StringRecord) -> Self {
        let names = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_ascii_lowercase())
            .collect();
        Self { table, names }
    }

    fn optional(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn required(&self, name: &str) -> Result<usize> {
        self.optional(name).ok_or_else(|| {
            GeoError::Schema(format!(
                "{} table has no '{}' column (found: {})",
                self.table,
                name,
                self.names.join(",")
            ))
        })
    }
}

/// csv reader plus the bookkeeping shared by both row readers
struct TableRows<R: Read> {
    table: Table,
    records: StringRecordsIntoIter<R>,
    done: bool,
}

impl<R: Read> TableRows<R> {
    fn open(table: Table, reader: R) -> Result<(Self, HeaderMap)> {
        let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = csv.headers().map_err(|e| {
            if e.is_io_error() {
                GeoError::Io(format!("reading {} header: {}", table, e))
            } else {
                GeoError::Schema(format!("{} header is unreadable: {}", table, e))
            }
        })?;
        let map = HeaderMap::new(table, headers);
        let rows = Self {
            table,
            records: csv.into_records(),
            done: false,
        };
        Ok((rows, map))
    }

    fn next_record(&mut self) -> Option<RowResult<(StringRecord, u64)>> {
        if self.done {
            return None;
        }
        match self.records.next()? {
            Ok(record) => {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                Some(Ok(Ok((record, line))))
            }
            Err(err) if err.is_io_error() => {
                self.done = true;
                Some(Err(GeoError::Io(format!("reading {} table: {}", self.table, err))))
            }
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(0);
                Some(Ok(Err(Diagnostic::new(
                    self.table,
                    line,
                    DiagnosticKind::InvalidRow,
                    format!("undecodable row: {}", err),
                ))))
            }
        }
    }

    fn diagnostic(&self, line: u64, kind: DiagnosticKind, message: String) -> Diagnostic {
        Diagnostic::new(self.table, line, kind, message)
    }

    /// Trimmed value of a required column
    fn required<'r>(
        &self,
        record: &'r StringRecord,
        index: usize,
        name: &str,
        line: u64,
    ) -> std::result::Result<&'r str, Diagnostic> {
        record.get(index).map(str::trim).ok_or_else(|| {
            self.diagnostic(
                line,
                DiagnosticKind::InvalidRow,
                format!("row has {} fields, missing '{}'", record.len(), name),
            )
        })
    }
}

/// Trimmed value of an optional column, empty when absent
fn optional(record: &StringRecord, index: Option<usize>) -> &str {
    index.and_then(|i| record.get(i)).map(str::trim).unwrap_or("")
}

fn parse_key(value: &str, name: &str) -> std::result::Result<u32, String> {
    value
        .parse::<u32>()
        .map_err(|_| format!("{} '{}' is not a number", name, value))
}

fn parse_coordinate(value: &str, name: &str, limit: f64) -> std::result::Result<Option<f64>, String> {
    if value.is_empty() {
        return Ok(None);
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() <= limit => Ok(Some(v)),
        Ok(v) => Err(format!("{} {} is out of range", name, v)),
        Err(_) => Err(format!("{} '{}' is not a number", name, value)),
    }
}

struct LocationColumns {
    geoname_id: usize,
    locale_code: usize,
    continent_code: usize,
    continent_name: usize,
    country_iso_code: usize,
    country_name: usize,
    city_name: usize,
    time_zone: Option<usize>,
}

/// Lazy reader over the locations table
pub struct LocationReader<R: Read> {
    rows: TableRows<R>,
    columns: LocationColumns,
    languages: Vec<Language>,
    ignored: usize,
}

impl LocationReader<Box<dyn Read + Send>> {
    /// Open a locations table file (`.gz` is decompressed)
    pub fn from_path<P: AsRef<Path>>(path: P, languages: &[Language]) -> Result<Self> {
        let path = path.as_ref();
        let reader = file_reader::open(path)
            .map_err(|e| GeoError::Io(format!("cannot open {}: {}", path.display(), e)))?;
        Self::new(reader, languages)
    }
}

impl<R: Read> LocationReader<R> {
    /// Read the header and prepare to read rows in `languages`
    pub fn new(reader: R, languages: &[Language]) -> Result<Self> {
        let (rows, header) = TableRows::open(Table::Locations, reader)?;
        let columns = LocationColumns {
            geoname_id: header.required("geoname_id")?,
            locale_code: header.required("locale_code")?,
            continent_code: header.required("continent_code")?,
            continent_name: header.required("continent_name")?,
            country_iso_code: header.required("country_iso_code")?,
            country_name: header.required("country_name")?,
            city_name: header.required("city_name")?,
            time_zone: header.optional("time_zone"),
        };
        Ok(Self {
            rows,
            columns,
            languages: languages.to_vec(),
            ignored: 0,
        })
    }

    /// Rows skipped so far because their language is not enabled
    pub fn ignored(&self) -> usize {
        self.ignored
    }

    fn parse(&self, record: &StringRecord, line: u64) -> std::result::Result<Option<LocationRow>, Diagnostic> {
        let c = &self.columns;
        let locale = self.rows.required(record, c.locale_code, "locale_code", line)?;
        let language = match Language::from_locale(locale) {
            Some(lang) if self.languages.contains(&lang) => lang,
            _ => return Ok(None),
        };

        let id = self.rows.required(record, c.geoname_id, "geoname_id", line)?;
        let geoname_id = parse_key(id, "geoname_id")
            .map_err(|msg| self.rows.diagnostic(line, DiagnosticKind::InvalidRow, msg))?;

        Ok(Some(LocationRow {
            geoname_id,
            language,
            continent_code: self.rows.required(record, c.continent_code, "continent_code", line)?.to_string(),
            continent_name: self.rows.required(record, c.continent_name, "continent_name", line)?.to_string(),
            country_iso_code: self.rows.required(record, c.country_iso_code, "country_iso_code", line)?.to_string(),
            country_name: self.rows.required(record, c.country_name, "country_name", line)?.to_string(),
            city_name: self.rows.required(record, c.city_name, "city_name", line)?.to_string(),
            time_zone: optional(record, c.time_zone).to_string(),
            line,
        }))
    }
}

impl<R: Read> Iterator for LocationReader<R> {
    type Item = RowResult<LocationRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (record, line) = match self.rows.next_record()? {
                Ok(Ok(found)) => found,
                Ok(Err(diag)) => return Some(Ok(Err(diag))),
                Err(e) => return Some(Err(e)),
            };
            match self.parse(&record, line) {
                Ok(Some(row)) => return Some(Ok(Ok(row))),
                Ok(None) => self.ignored += 1,
                Err(diag) => return Some(Ok(Err(diag))),
            }
        }
    }
}

struct BlockColumns {
    network: usize,
    geoname_id: usize,
    registered_country_geoname_id: Option<usize>,
    postal_code: Option<usize>,
    latitude: Option<usize>,
    longitude: Option<usize>,
}

/// Lazy reader over the blocks table
pub struct BlockReader<R: Read> {
    rows: TableRows<R>,
    columns: BlockColumns,
}

impl BlockReader<Box<dyn Read + Send>> {
    /// Open a blocks table file (`.gz` is decompressed)
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = file_reader::open(path)
            .map_err(|e| GeoError::Io(format!("cannot open {}: {}", path.display(), e)))?;
        Self::new(reader)
    }
}

impl<R: Read> BlockReader<R> {
    /// Read the header and prepare to read rows
    pub fn new(reader: R) -> Result<Self> {
        let (rows, header) = TableRows::open(Table::Blocks, reader)?;
        let columns = BlockColumns {
            network: header.required("network")?,
            geoname_id: header.required("geoname_id")?,
            registered_country_geoname_id: header.optional("registered_country_geoname_id"),
            postal_code: header.optional("postal_code"),
            latitude: header.optional("latitude"),
            longitude: header.optional("longitude"),
        };
        Ok(Self { rows, columns })
    }

    fn parse(&self, record: &StringRecord, line: u64) -> std::result::Result<BlockRow, Diagnostic> {
        let c = &self.columns;
        let invalid = |msg: String| self.rows.diagnostic(line, DiagnosticKind::InvalidRow, msg);

        let network_str = self.rows.required(record, c.network, "network", line)?;
        let network: NetworkKey = network_str.parse().map_err(|e: GeoError| {
            self.rows
                .diagnostic(line, DiagnosticKind::InvalidCidr, e.to_string())
        })?;

        let city_key = self.rows.required(record, c.geoname_id, "geoname_id", line)?;
        let geoname_id = if !city_key.is_empty() {
            parse_key(city_key, "geoname_id").map_err(invalid)?
        } else {
            let country_key = optional(record, c.registered_country_geoname_id);
            if country_key.is_empty() {
                return Err(self.rows.diagnostic(
                    line,
                    DiagnosticKind::UnresolvedJoin,
                    format!("{} has no geoname_id or registered_country_geoname_id", network),
                ));
            }
            parse_key(country_key, "registered_country_geoname_id").map_err(invalid)?
        };

        let latitude = parse_coordinate(optional(record, c.latitude), "latitude", 90.0).map_err(invalid)?;
        let longitude =
            parse_coordinate(optional(record, c.longitude), "longitude", 180.0).map_err(invalid)?;
        let postal = optional(record, c.postal_code);

        Ok(BlockRow {
            network,
            geoname_id,
            latitude,
            longitude,
            postal_code: (!postal.is_empty()).then(|| postal.to_string()),
            line,
        })
    }
}

impl<R: Read> Iterator for BlockReader<R> {
    type Item = RowResult<BlockRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let (record, line) = match self.rows.next_record()? {
            Ok(Ok(found)) => found,
            Ok(Err(diag)) => return Some(Ok(Err(diag))),
            Err(e) => return Some(Err(e)),
        };
        Some(Ok(self.parse(&record, line)))
    }
}

/// Read a whole locations table
pub fn ingest_locations<R: Read>(mut reader: LocationReader<R>) -> Result<Ingested<LocationRow>> {
    let mut out = Ingested {
        rows: Vec::new(),
        diagnostics: Vec::new(),
        ignored: 0,
    };
    for item in reader.by_ref() {
        match item? {
            Ok(row) => out.rows.push(row),
            Err(diag) => out.diagnostics.push(diag),
        }
    }
    out.ignored = reader.ignored();
    debug!(
        "Read {} location rows ({} rejected, {} in other languages)",
        out.rows.len(),
        out.diagnostics.len(),
        out.ignored
    );
    Ok(out)
}

/// Read a whole blocks table
pub fn ingest_blocks<R: Read>(reader: BlockReader<R>) -> Result<Ingested<BlockRow>> {
    let mut out = Ingested {
        rows: Vec::new(),
        diagnostics: Vec::new(),
        ignored: 0,
    };
    for item in reader {
        match item? {
            Ok(row) => out.rows.push(row),
            Err(diag) => out.diagnostics.push(diag),
        }
    }
    debug!(
        "Read {} block rows ({} rejected)",
        out.rows.len(),
        out.diagnostics.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOTH: &[Language] = &[Language::En, Language::Ar];

    const LOCATIONS: &str = "\
geoname_id,locale_code,continent_code,continent_name,country_iso_code,country_name,city_name,time_zone
2147714,en,OC,Oceania,AU,Australia,Sydney,Australia/Sydney
2147714,ar,OC,أوقيانوسيا,AU,أستراليا,سيدني,Australia/Sydney
2147714,fr,OC,Océanie,AU,Australie,Sydney,Australia/Sydney
";

    fn locations(csv: &str, languages: &[Language]) -> Ingested<LocationRow> {
        ingest_locations(LocationReader::new(csv.as_bytes(), languages).unwrap()).unwrap()
    }

    fn blocks(csv: &str) -> Ingested<BlockRow> {
        ingest_blocks(BlockReader::new(csv.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_locale_rows() {
        let out = locations(LOCATIONS, BOTH);
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.ignored, 1);
        assert!(out.diagnostics.is_empty());
        assert_eq!(out.rows[0].language, Language::En);
        assert_eq!(out.rows[1].city_name, "سيدني");
        assert_eq!(out.rows[1].time_zone, "Australia/Sydney");
        assert_eq!(out.rows[1].line, 3);
    }

    #[test]
    fn test_disabled_language_is_ignored() {
        let out = locations(LOCATIONS, &[Language::En]);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.ignored, 2);
    }

    #[test]
    fn test_empty_locale_means_english() {
        let csv = "geoname_id,locale_code,continent_code,continent_name,country_iso_code,country_name,city_name\n\
                   5,,EU,Europe,DE,Germany,Berlin\n";
        let out = locations(csv, BOTH);
        assert_eq!(out.rows[0].language, Language::En);
        assert_eq!(out.rows[0].time_zone, "");
    }

    #[test]
    fn test_bom_and_case_in_header() {
        let csv = "\u{feff}GEONAME_ID,Locale_Code,continent_code,continent_name,country_iso_code,country_name,city_name\n\
                   5,en,EU,Europe,DE,Germany,Berlin\n";
        assert_eq!(locations(csv, BOTH).rows.len(), 1);
    }

    #[test]
    fn test_unknown_header_is_schema_error() {
        let result = LocationReader::new("id,name\n1,x\n".as_bytes(), BOTH);
        assert!(matches!(result, Err(GeoError::Schema(_))));
        let result = BlockReader::new("".as_bytes());
        assert!(matches!(result, Err(GeoError::Schema(_))));
    }

    #[test]
    fn test_bad_location_rows() {
        let csv = "geoname_id,locale_code,continent_code,continent_name,country_iso_code,country_name,city_name\n\
                   abc,en,EU,Europe,DE,Germany,Berlin\n\
                   6,en,EU\n\
                   7,en,EU,Europe,FR,France,Paris\n";
        let out = locations(csv, BOTH);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.diagnostics.len(), 2);
        assert_eq!(out.diagnostics[0].line, 2);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::InvalidRow);
        assert!(out.diagnostics[1].message.contains("continent_name"));
    }

    #[test]
    fn test_block_rows() {
        let csv = "network,geoname_id,registered_country_geoname_id,postal_code,latitude,longitude\n\
                   1.0.0.0/24,2147714,2077456,2000,-33.8688,151.2093\n\
                   2.0.0.0/8,,2077456,,,\n";
        let out = blocks(csv);
        assert!(out.diagnostics.is_empty());
        let first = &out.rows[0];
        assert_eq!(first.network.to_string(), "1.0.0.0/24");
        assert_eq!(first.geoname_id, 2147714);
        assert_eq!(first.postal_code.as_deref(), Some("2000"));
        assert_eq!(first.latitude, Some(-33.8688));
        let second = &out.rows[1];
        assert_eq!(second.geoname_id, 2077456);
        assert_eq!(second.postal_code, None);
        assert_eq!(second.latitude, None);
    }

    #[test]
    fn test_bad_block_rows() {
        let csv = "network,geoname_id,registered_country_geoname_id,latitude,longitude\n\
                   1.2.3/24,1,,,\n\
                   1.0.0.0/24,x,,,\n\
                   2.0.0.0/8,,,,\n\
                   3.0.0.0/8,1,,91,0\n\
                   4.0.0.0/8,1,,0,inf\n\
                   5.0.0.0/8,1,,10,20\n";
        let out = blocks(csv);
        assert_eq!(out.rows.len(), 1);
        let kinds: Vec<_> = out.diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::InvalidCidr,
                DiagnosticKind::InvalidRow,
                DiagnosticKind::UnresolvedJoin,
                DiagnosticKind::InvalidRow,
                DiagnosticKind::InvalidRow,
            ]
        );
        assert_eq!(out.diagnostics[0].source, Table::Blocks);
    }

    #[test]
    fn test_invalid_utf8_row_is_diagnostic() {
        let mut bytes = b"network,geoname_id\n1.0.0.0/24,".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(b"2.0.0.0/8,5\n");
        let out = ingest_blocks(BlockReader::new(bytes.as_slice()).unwrap()).unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].kind, DiagnosticKind::InvalidRow);
    }
}
