//! IP Tree Builder
//!
//! Builds the binary trie used for longest-prefix-match lookups. Nodes live
//! in a flat arena and refer to their children by index, which is also how
//! the node table is laid out on disk.
//!
//! A network's payload sits on the node reached after walking its
//! `prefix_len` bits. Overlapping networks need no special handling here:
//! the lookup walk remembers the deepest payload on its path.

use crate::error::{GeoError, Result};
use crate::format::{NodeEntry, NONE};
use crate::record::{AddressFamily, NetworkKey, IPV4_MAPPED_DEPTH, IPV4_MAPPED_PREFIX};

/// IP tree builder using arena allocation
pub struct IpTreeBuilder {
    /// All nodes in the tree (arena, root at index 0)
    nodes: Vec<Node>,
    /// Address family (determines tree depth)
    family: AddressFamily,
    /// Number of nodes carrying a payload
    payload_count: usize,
}

/// A node in the IP tree
#[derive(Debug, Clone, Default)]
struct Node {
    /// Child for bit 0
    left: Option<u32>,
    /// Child for bit 1
    right: Option<u32>,
    /// Payload attached at this prefix
    payload: Option<u32>,
}

impl IpTreeBuilder {
    /// Create a tree builder for the given family
    pub fn new(family: AddressFamily) -> Self {
        Self {
            nodes: vec![Node::default()],
            family,
            payload_count: 0,
        }
    }

    /// Address family of the tree
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Number of allocated nodes (including the root)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of networks currently in the tree
    pub fn payload_count(&self) -> usize {
        self.payload_count
    }

    /// Insert a network with its payload
    ///
    /// Returns the payload it displaced when the exact same network was
    /// inserted before; the new payload always wins.
    pub fn insert(&mut self, network: &NetworkKey, payload: u32) -> Result<Option<u32>> {
        let (bits, prefix_len) = match (self.family, network.family()) {
            (AddressFamily::V4, AddressFamily::V4) | (AddressFamily::V6, AddressFamily::V6) => {
                (network.bits(), network.prefix_len())
            }
            (AddressFamily::V6, AddressFamily::V4) => (
                IPV4_MAPPED_PREFIX | network.bits(),
                IPV4_MAPPED_DEPTH + network.prefix_len(),
            ),
            (AddressFamily::V4, AddressFamily::V6) => {
                return Err(GeoError::InvalidCidr(format!(
                    "cannot insert IPv6 network {} into IPv4-only tree",
                    network
                )));
            }
        };
        self.insert_bits(bits, prefix_len, payload)
    }

    /// Walk `prefix_len` bits of `bits`, creating nodes as needed
    fn insert_bits(&mut self, bits: u128, prefix_len: u8, payload: u32) -> Result<Option<u32>> {
        let width = self.family.width();
        let mut node_id = 0usize;

        for depth in 0..prefix_len {
            let bit = crate::record::bit_at(bits, width, depth);
            let child = if bit == 0 {
                self.nodes[node_id].left
            } else {
                self.nodes[node_id].right
            };

            node_id = match child {
                Some(id) => id as usize,
                None => {
                    let new_id = self.allocate_node()?;
                    let current = &mut self.nodes[node_id];
                    if bit == 0 {
                        current.left = Some(new_id);
                    } else {
                        current.right = Some(new_id);
                    }
                    new_id as usize
                }
            };
        }

        let replaced = self.nodes[node_id].payload.replace(payload);
        if replaced.is_none() {
            self.payload_count += 1;
        }
        Ok(replaced)
    }

    /// Allocate a new node and return its ID
    fn allocate_node(&mut self) -> Result<u32> {
        let id = u32::try_from(self.nodes.len())
            .ok()
            .filter(|&id| id != NONE)
            .ok_or_else(|| {
                GeoError::ResourceLimit(format!(
                    "trie node count exceeds {}",
                    NONE - 1
                ))
            })?;
        self.nodes.push(Node::default());
        Ok(id)
    }

    /// Payloads in node order
    pub fn payloads(&self) -> impl Iterator<Item = u32> + '_ {
        self.nodes.iter().filter_map(|node| node.payload)
    }

    /// Produce the node table, translating each payload through `map_payload`
    pub fn to_node_table<F>(&self, mut map_payload: F) -> Result<Vec<NodeEntry>>
    where
        F: FnMut(u32) -> Result<u32>,
    {
        self.nodes
            .iter()
            .map(|node| {
                let payload = match node.payload {
                    Some(p) => map_payload(p)?,
                    None => NONE,
                };
                Ok(NodeEntry::new(
                    node.left.unwrap_or(NONE),
                    node.right.unwrap_or(NONE),
                    payload,
                ))
            })
            .collect()
    }
}
