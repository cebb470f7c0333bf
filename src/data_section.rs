//! Data section encoding and decoding
//!
//! The data section is a flat blob of entries, each an encoded
//! [`LocationRecord`] tagged with the address family of the network it was
//! inserted under. Trie payloads refer to entries by byte offset into this
//! blob, and identical entries are stored once.
//!
//! # Format
//!
//! All integers are little-endian. Strings are a `u32` byte length followed
//! by UTF-8 bytes.
//!
//! ```text
//! family: u8           // 4 or 6
//! geoname_id: u32
//! country_iso, country_en, country_ar: str
//! continent_code, continent_en, continent_ar: str
//! city_en, city_ar: str
//! time_zone: str
//! flags: u8            // bit0 latitude, bit1 longitude, bit2 postal code
//! [latitude: f64]
//! [longitude: f64]
//! [postal_code: str]
//! ```

use crate::error::{GeoError, Result};
use crate::record::{AddressFamily, Continent, Country, LocalizedName, LocationRecord};
use rustc_hash::FxHashMap;
use xxhash_rust::xxh64::xxh64;

const FLAG_LATITUDE: u8 = 0x01;
const FLAG_LONGITUDE: u8 = 0x02;
const FLAG_POSTAL: u8 = 0x04;

/// Content identifier of an encoded record
pub fn content_id(encoded: &[u8]) -> u64 {
    xxh64(encoded, 0)
}

/// Encode a record onto the end of `buffer`
pub fn encode_location(record: &LocationRecord, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(&record.geoname_id.to_le_bytes());

    encode_str(&record.country.iso_code, buffer);
    encode_str(&record.country.names.en, buffer);
    encode_str(&record.country.names.ar, buffer);
    encode_str(&record.continent.code, buffer);
    encode_str(&record.continent.names.en, buffer);
    encode_str(&record.continent.names.ar, buffer);
    encode_str(&record.city.en, buffer);
    encode_str(&record.city.ar, buffer);
    encode_str(&record.time_zone, buffer);

    let mut flags = 0u8;
    if record.latitude.is_some() {
        flags |= FLAG_LATITUDE;
    }
    if record.longitude.is_some() {
        flags |= FLAG_LONGITUDE;
    }
    if record.postal_code.is_some() {
        flags |= FLAG_POSTAL;
    }
    buffer.push(flags);

    if let Some(lat) = record.latitude {
        buffer.extend_from_slice(&lat.to_le_bytes());
    }
    if let Some(lon) = record.longitude {
        buffer.extend_from_slice(&lon.to_le_bytes());
    }
    if let Some(postal) = &record.postal_code {
        encode_str(postal, buffer);
    }
}

fn encode_str(s: &str, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buffer.extend_from_slice(s.as_bytes());
}

/// A decoded data section entry
#[derive(Debug, Clone, PartialEq)]
pub struct DataEntry {
    /// Family of the network the record was stored under
    pub family: AddressFamily,
    /// The location
    pub location: LocationRecord,
    /// Content identifier of the location
    pub id: u64,
}

/// Data section encoder
///
/// Builds a data section by encoding entries and tracking offsets.
/// Identical entries get the same offset.
pub struct DataEncoder {
    /// Encoded data buffer
    buffer: Vec<u8>,
    /// Map from encoded entry to offset (for deduplication)
    dedup_map: FxHashMap<Vec<u8>, u32>,
}

impl DataEncoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            dedup_map: FxHashMap::default(),
        }
    }

    /// Encode a record stored under a `family` network and return its offset
    ///
    /// If an identical entry was encoded before, returns the existing offset.
    pub fn encode(&mut self, family: AddressFamily, record: &LocationRecord) -> Result<u32> {
        let mut temp = vec![family.as_u32() as u8];
        encode_location(record, &mut temp);

        if let Some(&offset) = self.dedup_map.get(&temp) {
            return Ok(offset);
        }

        // u32::MAX is the "no payload" sentinel in the node table
        let offset = u32::try_from(self.buffer.len())
            .ok()
            .filter(|&o| o != u32::MAX)
            .ok_or_else(|| {
                GeoError::ResourceLimit("data section exceeds 4 GiB".to_string())
            })?;
        self.buffer.extend_from_slice(&temp);
        self.dedup_map.insert(temp, offset);
        Ok(offset)
    }

    /// Number of distinct entries encoded
    pub fn unique_count(&self) -> usize {
        self.dedup_map.len()
    }

    /// Get current buffer size
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Get the final encoded data section
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for DataEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Data section decoder
///
/// Every read is bounds-checked; a truncated or garbled section yields
/// [`GeoError::CorruptArtifact`] rather than a panic.
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder over a data section
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Decode the entry at `offset`
    pub fn decode(&self, offset: u32) -> Result<DataEntry> {
        let mut cursor = Cursor {
            buffer: self.buffer,
            pos: offset as usize,
        };

        let tag = cursor.read_u8()?;
        let family = AddressFamily::from_u32(u32::from(tag)).ok_or_else(|| {
            GeoError::CorruptArtifact(format!(
                "invalid entry family {} at offset {}",
                tag, offset
            ))
        })?;

        let start = cursor.pos;
        let geoname_id = cursor.read_u32()?;
        let country = Country {
            iso_code: cursor.read_str()?,
            names: LocalizedName {
                en: cursor.read_str()?,
                ar: cursor.read_str()?,
            },
        };
        let continent = Continent {
            code: cursor.read_str()?,
            names: LocalizedName {
                en: cursor.read_str()?,
                ar: cursor.read_str()?,
            },
        };
        let city = LocalizedName {
            en: cursor.read_str()?,
            ar: cursor.read_str()?,
        };
        let time_zone = cursor.read_str()?;

        let flags = cursor.read_u8()?;
        if flags & !(FLAG_LATITUDE | FLAG_LONGITUDE | FLAG_POSTAL) != 0 {
            return Err(GeoError::CorruptArtifact(format!(
                "unknown record flags {:#04x} at offset {}",
                flags, offset
            )));
        }
        let latitude = if flags & FLAG_LATITUDE != 0 {
            Some(cursor.read_f64()?)
        } else {
            None
        };
        let longitude = if flags & FLAG_LONGITUDE != 0 {
            Some(cursor.read_f64()?)
        } else {
            None
        };
        let postal_code = if flags & FLAG_POSTAL != 0 {
            Some(cursor.read_str()?)
        } else {
            None
        };

        let id = content_id(&self.buffer[start..cursor.pos]);
        let location = LocationRecord {
            geoname_id,
            country,
            continent,
            city,
            time_zone,
            latitude,
            longitude,
            postal_code,
        };
        Ok(DataEntry {
            family,
            location,
            id,
        })
    }
}

struct Cursor<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buffer.len())
            .ok_or_else(|| {
                GeoError::CorruptArtifact(format!(
                    "record read of {} bytes at {} runs past data section ({} bytes)",
                    len,
                    self.pos,
                    self.buffer.len()
                ))
            })?;
        let bytes = &self.buffer[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(raw))
    }

    fn read_str(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let start = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            GeoError::CorruptArtifact(format!("invalid UTF-8 string at offset {}", start))
        })
    }
}
