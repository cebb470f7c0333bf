//! On-disk binary format for geoglot databases
//!
//! # Layout
//!
//! ```text
//! [Header: DatabaseHeader (56 bytes)]
//! [Node table: NodeEntry × node_count (12 bytes each)]
//! [Data section: encoded location records]
//! ```
//!
//! Every multi-byte value is little-endian and every struct has alignment 1,
//! so the file can be read in place from a memory map at any address.
//! Child and payload references are indices and byte offsets, never pointers.
//! The checksum covers every byte after the header.

use crate::error::{GeoError, Result};
use crate::record::AddressFamily;
use std::mem;
use xxhash_rust::xxh64::xxh64;
use zerocopy::byteorder::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Magic bytes identifying a geoglot database
pub const MAGIC: &[u8; 8] = b"GEOGLOT\0";

/// Current format version
pub const FORMAT_VERSION: u32 = 1;

/// Marker for an absent child or payload
pub const NONE: u32 = u32::MAX;

/// File header (56 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DatabaseHeader {
    /// Magic bytes: "GEOGLOT\0"
    pub magic: [u8; 8],
    /// Format version
    pub version: U32,
    /// 4 or 6
    pub address_family: U32,
    /// Number of networks (nodes carrying a payload)
    pub record_count: U32,
    /// Number of distinct entries in the data section
    pub location_count: U32,
    /// Number of trie nodes
    pub node_count: U32,
    /// Offset of the node table
    pub nodes_offset: U32,
    /// Offset of the data section
    pub data_offset: U32,
    /// Size of the data section in bytes
    pub data_size: U32,
    /// Unix timestamp (seconds) of the build
    pub generated_at: U64,
    /// XXH64 of all bytes after the header
    pub checksum: U64,
}

/// One trie node (12 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeEntry {
    /// Index of the child for bit 0, or [`NONE`]
    pub left: U32,
    /// Index of the child for bit 1, or [`NONE`]
    pub right: U32,
    /// Data section offset of this node's record, or [`NONE`]
    pub payload: U32,
}

impl NodeEntry {
    /// Create a node entry from raw values
    pub fn new(left: u32, right: u32, payload: u32) -> Self {
        Self {
            left: U32::new(left),
            right: U32::new(right),
            payload: U32::new(payload),
        }
    }

    /// Child for the given bit, if any
    #[inline]
    pub fn child(&self, bit: u8) -> Option<u32> {
        let raw = if bit == 0 {
            self.left.get()
        } else {
            self.right.get()
        };
        (raw != NONE).then_some(raw)
    }

    /// Payload offset, if any
    #[inline]
    pub fn payload(&self) -> Option<u32> {
        let raw = self.payload.get();
        (raw != NONE).then_some(raw)
    }
}

/// Size of the header in bytes
pub const HEADER_SIZE: usize = mem::size_of::<DatabaseHeader>();

/// Size of one node entry in bytes
pub const NODE_SIZE: usize = mem::size_of::<NodeEntry>();

/// Checksum of the body (everything after the header)
pub fn body_checksum(file: &[u8]) -> u64 {
    xxh64(&file[HEADER_SIZE.min(file.len())..], 0)
}

/// Validated view of a header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Address family
    pub family: AddressFamily,
    /// Networks
    pub record_count: u32,
    /// Distinct locations
    pub location_count: u32,
    /// Trie nodes
    pub node_count: u32,
    /// Byte range of the node table
    pub nodes: (usize, usize),
    /// Byte range of the data section
    pub data: (usize, usize),
    /// Build timestamp
    pub generated_at: u64,
    /// Stored checksum
    pub checksum: u64,
}

impl Layout {
    /// Parse and validate the header of `file`, including the checksum
    pub fn parse(file: &[u8]) -> Result<Self> {
        let (header, _) = DatabaseHeader::read_from_prefix(file).map_err(|_| {
            GeoError::CorruptArtifact(format!(
                "file too small: {} bytes (need at least {})",
                file.len(),
                HEADER_SIZE
            ))
        })?;

        if &header.magic != MAGIC {
            return Err(GeoError::CorruptArtifact(
                "bad magic bytes (not a geoglot database)".to_string(),
            ));
        }
        if header.version.get() != FORMAT_VERSION {
            return Err(GeoError::CorruptArtifact(format!(
                "unsupported format version {} (expected {})",
                header.version.get(),
                FORMAT_VERSION
            )));
        }
        let family = AddressFamily::from_u32(header.address_family.get()).ok_or_else(|| {
            GeoError::CorruptArtifact(format!(
                "invalid address family {}",
                header.address_family.get()
            ))
        })?;

        let node_count = header.node_count.get();
        if node_count == 0 || node_count == NONE {
            return Err(GeoError::CorruptArtifact(format!(
                "invalid node count {}",
                node_count
            )));
        }

        let nodes_start = header.nodes_offset.get() as usize;
        let nodes_end = nodes_start + node_count as usize * NODE_SIZE;
        let data_start = header.data_offset.get() as usize;
        let data_end = data_start + header.data_size.get() as usize;

        if nodes_start != HEADER_SIZE || data_start != nodes_end || data_end != file.len() {
            return Err(GeoError::CorruptArtifact(format!(
                "section bounds do not match file: nodes {}..{}, data {}..{}, file {} bytes",
                nodes_start,
                nodes_end,
                data_start,
                data_end,
                file.len()
            )));
        }

        let checksum = header.checksum.get();
        let actual = body_checksum(file);
        if checksum != actual {
            return Err(GeoError::CorruptArtifact(format!(
                "checksum mismatch: header {:016x}, content {:016x}",
                checksum, actual
            )));
        }

        Ok(Self {
            family,
            record_count: header.record_count.get(),
            location_count: header.location_count.get(),
            node_count,
            nodes: (nodes_start, nodes_end),
            data: (data_start, data_end),
            generated_at: header.generated_at.get(),
            checksum,
        })
    }

    /// Node table of `file`
    pub fn node_table<'a>(&self, file: &'a [u8]) -> Result<&'a [NodeEntry]> {
        <[NodeEntry]>::ref_from_bytes(&file[self.nodes.0..self.nodes.1])
            .map_err(|_| GeoError::CorruptArtifact("node table is malformed".to_string()))
    }

    /// Data section of `file`
    pub fn data_section<'a>(&self, file: &'a [u8]) -> &'a [u8] {
        &file[self.data.0..self.data.1]
    }
}

/// Assemble a complete database file
///
/// The checksum is computed here, so callers only supply the sections.
pub fn assemble(
    family: AddressFamily,
    record_count: u32,
    location_count: u32,
    nodes: &[NodeEntry],
    data: &[u8],
    generated_at: u64,
) -> Result<Vec<u8>> {
    let node_count = u32::try_from(nodes.len())
        .ok()
        .filter(|&n| n != NONE)
        .ok_or_else(|| GeoError::ResourceLimit(format!("{} trie nodes", nodes.len())))?;
    let nodes_bytes = nodes.as_bytes();
    let data_offset = HEADER_SIZE + nodes_bytes.len();
    let to_u32 = |value: usize, what: &str| {
        u32::try_from(value)
            .map_err(|_| GeoError::ResourceLimit(format!("{} of {} bytes exceeds 4 GiB", what, value)))
    };

    let mut header = DatabaseHeader {
        magic: *MAGIC,
        version: U32::new(FORMAT_VERSION),
        address_family: U32::new(family.as_u32()),
        record_count: U32::new(record_count),
        location_count: U32::new(location_count),
        node_count: U32::new(node_count),
        nodes_offset: U32::new(HEADER_SIZE as u32),
        data_offset: U32::new(to_u32(data_offset, "node table")?),
        data_size: U32::new(to_u32(data.len(), "data section")?),
        generated_at: U64::new(generated_at),
        checksum: U64::new(0),
    };

    let mut file = Vec::with_capacity(data_offset + data.len());
    file.extend_from_slice(header.as_bytes());
    file.extend_from_slice(nodes_bytes);
    file.extend_from_slice(data);

    header.checksum = U64::new(body_checksum(&file));
    file[..HEADER_SIZE].copy_from_slice(header.as_bytes());
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let nodes = [NodeEntry::new(1, NONE, NONE), NodeEntry::new(NONE, NONE, 0)];
        assemble(AddressFamily::V4, 1, 1, &nodes, b"payload", 1_700_000_000).unwrap()
    }

    #[test]
    fn test_struct_sizes() {
        assert_eq!(HEADER_SIZE, 56);
        assert_eq!(NODE_SIZE, 12);
    }

    #[test]
    fn test_parse_assembled_file() {
        let file = sample();
        let layout = Layout::parse(&file).unwrap();
        assert_eq!(layout.family, AddressFamily::V4);
        assert_eq!(layout.record_count, 1);
        assert_eq!(layout.node_count, 2);
        assert_eq!(layout.generated_at, 1_700_000_000);

        let nodes = layout.node_table(&file).unwrap();
        assert_eq!(nodes[0].child(0), Some(1));
        assert_eq!(nodes[0].child(1), None);
        assert_eq!(nodes[1].payload(), Some(0));
        assert_eq!(layout.data_section(&file), b"payload");
    }

    #[test]
    fn test_bad_magic() {
        let mut file = sample();
        file[0] = b'X';
        assert!(matches!(Layout::parse(&file), Err(GeoError::CorruptArtifact(_))));
    }

    #[test]
    fn test_flipped_body_byte_fails_checksum() {
        let mut file = sample();
        let last = file.len() - 1;
        file[last] ^= 0xFF;
        let err = Layout::parse(&file).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_truncated_file() {
        let file = sample();
        assert!(Layout::parse(&file[..20]).is_err());
        assert!(Layout::parse(&file[..file.len() - 1]).is_err());
    }
}
