//! Lookup Engine
//!
//! A [`Snapshot`] is one immutable, validated database file, either owned
//! in memory or memory-mapped, answering point lookups and ordered listings.
//! Snapshots are `Send + Sync` and are shared between threads behind `Arc`.
//!
//! # Examples
//!
//! ```no_run
//! use geoglot::Snapshot;
//!
//! let snapshot = Snapshot::open("db/GeoLite2-City-Custom.gdb")?;
//! if let Some(record) = snapshot.lookup("1.0.0.5")? {
//!     println!("{} -> {}", record.cidr, record.location.city.en);
//! }
//! # Ok::<(), geoglot::GeoError>(())
//! ```

use crate::data_section::DataDecoder;
use crate::error::{GeoError, Result};
use crate::format::{Layout, NodeEntry};
use crate::record::{
    bit_at, ip_to_bits, mask_bits, AddressFamily, MergedRecord, NetworkKey, IPV4_MAPPED_DEPTH,
    IPV4_MAPPED_PREFIX,
};
use memmap2::Mmap;
use serde::Serialize;
use std::fs::File;
use std::net::IpAddr;
use std::path::Path;

/// Upper bound on a single `list` page
pub const MAX_LIST_LIMIT: usize = 10_000;

/// Page size used when the caller does not choose one
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Storage for database data - either owned or memory-mapped
enum DatabaseStorage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl DatabaseStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            DatabaseStorage::Owned(v) => v.as_slice(),
            DatabaseStorage::Mmap(m) => &m[..],
        }
    }
}

/// Facts about a loaded snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    /// "IPv4" or "IPv6"
    pub address_family: String,
    /// Networks
    pub record_count: u32,
    /// Distinct location records
    pub location_count: u32,
    /// Trie nodes
    pub node_count: u32,
    /// Build timestamp (unix seconds)
    pub generated_at: u64,
    /// Body checksum, hex
    pub checksum: String,
    /// File size in bytes
    pub size: usize,
}

/// An immutable, loaded database
pub struct Snapshot {
    storage: DatabaseStorage,
    layout: Layout,
}

impl Snapshot {
    /// Open a database file using memory mapping
    ///
    /// The file is validated (header, section bounds, checksum, node table
    /// shape) before the snapshot is returned.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| GeoError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
        Self::map_file(&file)
            .map_err(|e| match e {
                GeoError::Io(msg) => GeoError::Io(format!("{}: {}", path.display(), msg)),
                other => other,
            })
    }

    /// Map an already open file
    pub(crate) fn map_file(file: &File) -> Result<Self> {
        // SAFETY: published database files are never modified in place; they
        // are only replaced by rename, which leaves existing mappings intact.
        let mmap = unsafe { Mmap::map(file) }
            .map_err(|e| GeoError::Io(format!("Failed to mmap: {}", e)))?;
        Self::from_storage(DatabaseStorage::Mmap(mmap))
    }

    /// Create a snapshot from raw bytes
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_storage(DatabaseStorage::Owned(data))
    }

    fn from_storage(storage: DatabaseStorage) -> Result<Self> {
        let layout = Layout::parse(storage.as_slice())?;
        check_node_table(layout.node_table(storage.as_slice())?, layout.record_count)?;
        Ok(Self { storage, layout })
    }

    /// Address family of the database
    pub fn family(&self) -> AddressFamily {
        self.layout.family
    }

    /// Number of networks
    pub fn record_count(&self) -> u32 {
        self.layout.record_count
    }

    /// Build timestamp (unix seconds)
    pub fn generated_at(&self) -> u64 {
        self.layout.generated_at
    }

    /// Raw file bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.storage.as_slice()
    }

    /// Header facts
    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            address_family: self.layout.family.to_string(),
            record_count: self.layout.record_count,
            location_count: self.layout.location_count,
            node_count: self.layout.node_count,
            generated_at: self.layout.generated_at,
            checksum: format!("{:016x}", self.layout.checksum),
            size: self.storage.as_slice().len(),
        }
    }

    fn nodes(&self) -> Result<&[NodeEntry]> {
        self.layout.node_table(self.storage.as_slice())
    }

    fn node<'n>(nodes: &'n [NodeEntry], id: u32) -> Result<&'n NodeEntry> {
        nodes.get(id as usize).ok_or_else(|| {
            GeoError::CorruptArtifact(format!(
                "node index {} exceeds node count {}",
                id,
                nodes.len()
            ))
        })
    }

    /// Look up an address given as a string
    ///
    /// Returns `Ok(None)` when no network covers the address, including an
    /// IPv6 query against an IPv4-only database.
    pub fn lookup(&self, query: &str) -> Result<Option<MergedRecord>> {
        let addr: IpAddr = query
            .trim()
            .parse()
            .map_err(|_| GeoError::InvalidAddress(query.to_string()))?;
        self.lookup_ip(addr)
    }

    /// Look up an IP address
    pub fn lookup_ip(&self, addr: IpAddr) -> Result<Option<MergedRecord>> {
        let bits = match (self.layout.family, addr) {
            (AddressFamily::V4, IpAddr::V6(_)) => return Ok(None),
            (AddressFamily::V4, IpAddr::V4(_)) | (AddressFamily::V6, IpAddr::V6(_)) => {
                ip_to_bits(addr)
            }
            (AddressFamily::V6, IpAddr::V4(_)) => IPV4_MAPPED_PREFIX | ip_to_bits(addr),
        };

        let width = self.layout.family.width();
        let nodes = self.nodes()?;
        let mut node = Self::node(nodes, 0)?;
        let mut best = None;

        for depth in 0..=width {
            if let Some(offset) = node.payload() {
                best = Some((offset, depth));
            }
            if depth == width {
                break;
            }
            match node.child(bit_at(bits, width, depth)) {
                Some(child) => node = Self::node(nodes, child)?,
                None => break,
            }
        }

        match best {
            Some((offset, depth)) => self
                .decode(mask_bits(bits, width, depth), depth, offset)
                .map(Some),
            None => Ok(None),
        }
    }

    /// List records in ascending network order
    ///
    /// A covering network comes before the more specific networks inside it.
    /// Skips `offset` records and returns at most `limit` (capped at
    /// [`MAX_LIST_LIMIT`]).
    pub fn list(&self, offset: usize, limit: usize) -> Result<Vec<MergedRecord>> {
        let limit = limit.min(MAX_LIST_LIMIT);
        let mut out = Vec::with_capacity(limit.min(self.layout.record_count as usize));
        if limit == 0 {
            return Ok(out);
        }

        let width = self.layout.family.width();
        let nodes = self.nodes()?;
        let mut skipped = 0usize;

        // (node id, path bits, depth); right pushed first so left pops first
        let mut stack: Vec<(u32, u128, u8)> = vec![(0, 0, 0)];
        while let Some((id, path, depth)) = stack.pop() {
            if usize::from(depth) > usize::from(width) {
                return Err(GeoError::CorruptArtifact(format!(
                    "trie deeper than {} bits",
                    width
                )));
            }
            let node = Self::node(nodes, id)?;

            if let Some(payload) = node.payload() {
                if skipped < offset {
                    skipped += 1;
                } else {
                    let bits = if depth == 0 { 0 } else { path << (width - depth) };
                    out.push(self.decode(bits, depth, payload)?);
                    if out.len() == limit {
                        break;
                    }
                }
            }

            if depth < width {
                if let Some(right) = node.child(1) {
                    stack.push((right, (path << 1) | 1, depth + 1));
                }
                if let Some(left) = node.child(0) {
                    stack.push((left, path << 1, depth + 1));
                }
            }
        }

        Ok(out)
    }

    /// Network for a payload found at `depth` with masked address `bits`
    ///
    /// `stored` is the family the record was inserted under. IPv4 records in
    /// an IPv6 database live at their `::ffff:` position and are reported as
    /// IPv4 again; IPv6 records in the same range stay IPv6.
    fn network_at(&self, bits: u128, depth: u8, stored: AddressFamily) -> Result<NetworkKey> {
        match (self.layout.family, stored) {
            (AddressFamily::V6, AddressFamily::V4) => {
                if depth < IPV4_MAPPED_DEPTH || bits >> 32 != IPV4_MAPPED_PREFIX >> 32 {
                    return Err(GeoError::CorruptArtifact(format!(
                        "IPv4 record at depth {} outside ::ffff:0:0/96",
                        depth
                    )));
                }
                NetworkKey::new(
                    AddressFamily::V4,
                    bits & u128::from(u32::MAX),
                    depth - IPV4_MAPPED_DEPTH,
                )
            }
            (AddressFamily::V4, AddressFamily::V6) => Err(GeoError::CorruptArtifact(
                "IPv6 record in an IPv4 database".to_string(),
            )),
            (family, _) => NetworkKey::new(family, bits, depth),
        }
    }

    fn decode(&self, bits: u128, depth: u8, offset: u32) -> Result<MergedRecord> {
        let data = self.layout.data_section(self.storage.as_slice());
        let entry = DataDecoder::new(data).decode(offset)?;
        let network = self.network_at(bits, depth, entry.family)?;
        Ok(MergedRecord {
            network,
            cidr: network.to_string(),
            id: entry.id,
            location: entry.location,
        })
    }
}

/// Check that the node table is a tree rooted at node 0
///
/// Children always sit after their parent and every node but the root has
/// exactly one parent, so walks terminate and visit each node once. The
/// number of payload nodes must equal the header's record count.
fn check_node_table(nodes: &[NodeEntry], record_count: u32) -> Result<()> {
    let mut referenced = vec![false; nodes.len()];
    let mut payloads = 0u64;

    for (id, node) in nodes.iter().enumerate() {
        for bit in 0..2 {
            if let Some(child) = node.child(bit) {
                let child = child as usize;
                if child <= id || child >= nodes.len() {
                    return Err(GeoError::CorruptArtifact(format!(
                        "node {} has child {} outside {}..{}",
                        id,
                        child,
                        id + 1,
                        nodes.len()
                    )));
                }
                if std::mem::replace(&mut referenced[child], true) {
                    return Err(GeoError::CorruptArtifact(format!(
                        "node {} has more than one parent",
                        child
                    )));
                }
            }
        }
        if node.payload().is_some() {
            payloads += 1;
        }
    }

    if let Some(orphan) = referenced.iter().skip(1).position(|&r| !r) {
        return Err(GeoError::CorruptArtifact(format!(
            "node {} is unreachable",
            orphan + 1
        )));
    }
    if payloads != u64::from(record_count) {
        return Err(GeoError::CorruptArtifact(format!(
            "node table holds {} records, header says {}",
            payloads, record_count
        )));
    }
    Ok(())
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("family", &self.layout.family)
            .field("record_count", &self.layout.record_count)
            .field("generated_at", &self.layout.generated_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_builder::DatabaseBuilder;
    use crate::record::{LocalizedName, LocationRecord};

    fn record(cidr: &str, city: &str) -> MergedRecord {
        let location = LocationRecord {
            geoname_id: 1,
            city: LocalizedName::new(city, ""),
            ..Default::default()
        };
        MergedRecord::new(cidr.parse().unwrap(), location)
    }

    fn snapshot(records: &[(&str, &str)]) -> Snapshot {
        let mut builder = DatabaseBuilder::new().with_generated_at(1);
        for (cidr, city) in records {
            builder.add_record(record(cidr, city));
        }
        Snapshot::from_bytes(builder.build().unwrap().bytes).unwrap()
    }

    fn city(snapshot: &Snapshot, addr: &str) -> Option<String> {
        snapshot
            .lookup(addr)
            .unwrap()
            .map(|r| r.location.city.en)
    }

    #[test]
    fn test_single_network() {
        let db = snapshot(&[("1.0.0.0/24", "Sydney")]);
        assert_eq!(city(&db, "1.0.0.0").as_deref(), Some("Sydney"));
        assert_eq!(city(&db, "1.0.0.255").as_deref(), Some("Sydney"));
        assert_eq!(city(&db, "1.0.1.0"), None);
        assert_eq!(city(&db, "0.255.255.255"), None);
    }

    #[test]
    fn test_reported_network_is_payload_depth() {
        let db = snapshot(&[("10.0.0.0/8", "X"), ("10.1.0.0/16", "Y")]);
        let hit = db.lookup("10.1.2.3").unwrap().unwrap();
        assert_eq!(hit.cidr, "10.1.0.0/16");
        let hit = db.lookup("10.2.0.1").unwrap().unwrap();
        assert_eq!(hit.cidr, "10.0.0.0/8");
    }

    #[test]
    fn test_default_route() {
        let db = snapshot(&[("0.0.0.0/0", "Anywhere"), ("8.8.8.8/32", "Host")]);
        assert_eq!(city(&db, "9.9.9.9").as_deref(), Some("Anywhere"));
        assert_eq!(city(&db, "8.8.8.8").as_deref(), Some("Host"));
    }

    #[test]
    fn test_invalid_address() {
        let db = snapshot(&[("1.0.0.0/24", "Sydney")]);
        assert!(matches!(
            db.lookup("not-an-ip"),
            Err(GeoError::InvalidAddress(_))
        ));
        assert!(matches!(db.lookup("1.0.0.0/24"), Err(GeoError::InvalidAddress(_))));
    }

    #[test]
    fn test_ipv6_query_on_v4_database_is_not_found() {
        let db = snapshot(&[("0.0.0.0/0", "Anywhere")]);
        assert_eq!(db.lookup("2001:db8::1").unwrap(), None);
    }

    #[test]
    fn test_mixed_family_database() {
        let db = snapshot(&[("1.0.0.0/24", "Sydney"), ("2001:db8::/32", "Doc")]);
        assert_eq!(db.family(), AddressFamily::V6);
        let hit = db.lookup("1.0.0.9").unwrap().unwrap();
        assert_eq!(hit.cidr, "1.0.0.0/24");
        assert_eq!(hit.family(), AddressFamily::V4);
        assert_eq!(city(&db, "2001:db8:1::5").as_deref(), Some("Doc"));
        assert_eq!(city(&db, "2001:db9::"), None);
        // IPv4-mapped form resolves to the same IPv4 network
        assert_eq!(city(&db, "::ffff:1.0.0.9").as_deref(), Some("Sydney"));
    }

    #[test]
    fn test_ipv6_record_in_mapped_range_stays_ipv6() {
        let db = snapshot(&[("::ffff:1.0.0.0/120", "Mapped"), ("2.0.0.0/8", "Native4")]);
        let hit = db.lookup("::ffff:1.0.0.5").unwrap().unwrap();
        assert_eq!(hit.cidr, "::ffff:1.0.0.0/120");
        assert_eq!(hit.family(), AddressFamily::V6);
        // An IPv4 query walks the same mapped path
        assert_eq!(db.lookup("1.0.0.5").unwrap().unwrap().cidr, "::ffff:1.0.0.0/120");

        let listed: Vec<String> = db.list(0, 10).unwrap().into_iter().map(|r| r.cidr).collect();
        assert_eq!(listed, vec!["::ffff:1.0.0.0/120", "2.0.0.0/8"]);
    }

    #[test]
    fn test_list_order_and_paging() {
        let db = snapshot(&[
            ("192.168.0.0/16", "C"),
            ("10.1.0.0/16", "B"),
            ("10.0.0.0/8", "A"),
            ("172.16.0.0/12", "D"),
        ]);
        let all: Vec<String> = db.list(0, 100).unwrap().into_iter().map(|r| r.cidr).collect();
        assert_eq!(
            all,
            vec!["10.0.0.0/8", "10.1.0.0/16", "172.16.0.0/12", "192.168.0.0/16"]
        );

        let page: Vec<String> = db.list(1, 2).unwrap().into_iter().map(|r| r.cidr).collect();
        assert_eq!(page, vec!["10.1.0.0/16", "172.16.0.0/12"]);
        assert!(db.list(4, 10).unwrap().is_empty());
        assert!(db.list(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_info() {
        let db = snapshot(&[("1.0.0.0/24", "Sydney")]);
        let info = db.info();
        assert_eq!(info.address_family, "IPv4");
        assert_eq!(info.record_count, 1);
        assert_eq!(info.generated_at, 1);
        assert_eq!(info.size, db.as_bytes().len());
    }

    fn load(nodes: &[NodeEntry], record_count: u32) -> Result<Snapshot> {
        use crate::format::assemble;
        let bytes = assemble(AddressFamily::V4, record_count, 0, nodes, &[], 0).unwrap();
        Snapshot::from_bytes(bytes)
    }

    #[test]
    fn test_corrupt_child_index() {
        use crate::format::NONE;
        // Root points at a node that does not exist
        let nodes = [NodeEntry::new(5, NONE, NONE)];
        assert!(matches!(load(&nodes, 0), Err(GeoError::CorruptArtifact(_))));
    }

    #[test]
    fn test_shared_children_are_rejected() {
        use crate::format::NONE;
        // Every node points both ways at its successor: a 33-node DAG with
        // 2^32 root-to-leaf paths
        let mut nodes: Vec<NodeEntry> = (1..=32).map(|i| NodeEntry::new(i, i, NONE)).collect();
        nodes.push(NodeEntry::new(NONE, NONE, NONE));
        assert!(matches!(load(&nodes, 0), Err(GeoError::CorruptArtifact(_))));
    }

    #[test]
    fn test_backward_child_is_rejected() {
        use crate::format::NONE;
        let nodes = [NodeEntry::new(1, NONE, NONE), NodeEntry::new(0, NONE, NONE)];
        assert!(matches!(load(&nodes, 0), Err(GeoError::CorruptArtifact(_))));
    }

    #[test]
    fn test_unreachable_node_is_rejected() {
        use crate::format::NONE;
        let nodes = [NodeEntry::new(NONE, NONE, NONE), NodeEntry::new(NONE, NONE, NONE)];
        assert!(matches!(load(&nodes, 0), Err(GeoError::CorruptArtifact(_))));
    }

    #[test]
    fn test_record_count_must_match_node_table() {
        let db = snapshot(&[("1.0.0.0/24", "Sydney"), ("2.0.0.0/8", "Other")]);
        let layout = Layout::parse(db.as_bytes()).unwrap();
        let nodes = layout.node_table(db.as_bytes()).unwrap().to_vec();
        let data = layout.data_section(db.as_bytes()).to_vec();

        let bytes = crate::format::assemble(AddressFamily::V4, 3, 2, &nodes, &data, 1).unwrap();
        assert!(matches!(
            Snapshot::from_bytes(bytes),
            Err(GeoError::CorruptArtifact(_))
        ));
        let bytes = crate::format::assemble(AddressFamily::V4, 2, 2, &nodes, &data, 1).unwrap();
        assert_eq!(Snapshot::from_bytes(bytes).unwrap().list(0, 10).unwrap().len(), 2);
    }
}
