//! Record types shared by the ingestor, builder and lookup engine
//!
//! A [`NetworkKey`] is a masked CIDR prefix; a [`LocationRecord`] carries the
//! bilingual names and coordinates for one location; a [`MergedRecord`] is
//! the pairing of the two that the database stores and returns.

use crate::error::{GeoError, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address family of a network or of a whole database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddressFamily {
    /// IPv4 only
    V4,
    /// IPv6 (IPv4 networks live at their IPv4-mapped position)
    V6,
}

impl AddressFamily {
    /// Number of address bits
    pub const fn width(self) -> u8 {
        match self {
            AddressFamily::V4 => 32,
            AddressFamily::V6 => 128,
        }
    }

    /// Value stored in the database header
    pub const fn as_u32(self) -> u32 {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 6,
        }
    }

    /// Parse the header value
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            4 => Some(AddressFamily::V4),
            6 => Some(AddressFamily::V6),
            _ => None,
        }
    }

    /// Family of an address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// Prefix of the IPv4-mapped IPv6 range (`::ffff:0:0/96`)
pub(crate) const IPV4_MAPPED_PREFIX: u128 = 0xffff_u128 << 32;

/// Bit depth at which IPv4 space starts inside an IPv6 trie
pub(crate) const IPV4_MAPPED_DEPTH: u8 = 96;

/// A CIDR network: address family, masked address bits and prefix length
///
/// `bits` holds the address as an integer in the family's width, so an
/// IPv4 network uses only the low 32 bits. Bits past `prefix_len` are
/// always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkKey {
    family: AddressFamily,
    bits: u128,
    prefix_len: u8,
}

impl NetworkKey {
    /// Build a key, masking host bits. Fails if the prefix is too long.
    pub fn new(family: AddressFamily, bits: u128, prefix_len: u8) -> Result<Self> {
        if prefix_len > family.width() {
            return Err(GeoError::InvalidCidr(format!(
                "prefix length {} exceeds {} for {}",
                prefix_len,
                family.width(),
                family
            )));
        }
        Ok(Self {
            family,
            bits: mask_bits(bits, family.width(), prefix_len),
            prefix_len,
        })
    }

    /// Host network (/32 or /128) for a single address
    pub fn host(addr: IpAddr) -> Self {
        let family = AddressFamily::of(&addr);
        Self {
            family,
            bits: ip_to_bits(addr),
            prefix_len: family.width(),
        }
    }

    /// Address family
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Masked address bits
    pub fn bits(&self) -> u128 {
        self.bits
    }

    /// Prefix length
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Network address
    pub fn addr(&self) -> IpAddr {
        bits_to_ip(self.family, self.bits)
    }

    /// Value of the prefix bit at `index` (0 = most significant)
    pub fn bit(&self, index: u8) -> u8 {
        bit_at(self.bits, self.family.width(), index)
    }

    /// Whether `addr` falls inside this network
    pub fn contains(&self, addr: IpAddr) -> bool {
        AddressFamily::of(&addr) == self.family
            && mask_bits(ip_to_bits(addr), self.family.width(), self.prefix_len) == self.bits
    }
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr(), self.prefix_len)
    }
}

impl FromStr for NetworkKey {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (addr_str, prefix_str) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let addr: IpAddr = addr_str
            .parse()
            .map_err(|_| GeoError::InvalidCidr(format!("'{}': bad address", s)))?;
        let family = AddressFamily::of(&addr);

        let prefix_len = match prefix_str {
            Some(p) => p
                .parse::<u8>()
                .map_err(|_| GeoError::InvalidCidr(format!("'{}': bad prefix length", s)))?,
            None => family.width(),
        };

        NetworkKey::new(family, ip_to_bits(addr), prefix_len)
            .map_err(|_| GeoError::InvalidCidr(format!("'{}': prefix length out of range", s)))
    }
}

impl Serialize for NetworkKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Zero every bit past `prefix_len` in a `width`-bit value
pub(crate) fn mask_bits(bits: u128, width: u8, prefix_len: u8) -> u128 {
    let shift = u32::from(width - prefix_len);
    if shift >= 128 {
        0
    } else {
        (bits >> shift) << shift
    }
}

/// Bit at `index` (0 = most significant) of a `width`-bit value
#[inline]
pub(crate) fn bit_at(bits: u128, width: u8, index: u8) -> u8 {
    ((bits >> (width - 1 - index)) & 1) as u8
}

/// Address as an integer in its family's width
pub(crate) fn ip_to_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

pub(crate) fn bits_to_ip(family: AddressFamily, bits: u128) -> IpAddr {
    match family {
        AddressFamily::V4 => IpAddr::V4(Ipv4Addr::from(bits as u32)),
        AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(bits)),
    }
}

/// A name in the two supported languages
///
/// Either side may be empty when the feed has no value for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct LocalizedName {
    /// English
    pub en: String,
    /// Arabic
    pub ar: String,
}

impl LocalizedName {
    /// Create from both languages
    pub fn new(en: impl Into<String>, ar: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            ar: ar.into(),
        }
    }
}

/// Country part of a location
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Country {
    /// ISO 3166-1 alpha-2 code
    pub iso_code: String,
    /// Localized names
    #[serde(flatten)]
    pub names: LocalizedName,
}

/// Continent part of a location
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Continent {
    /// Two-letter continent code
    pub code: String,
    /// Localized names
    #[serde(flatten)]
    pub names: LocalizedName,
}

/// Everything known about one location
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationRecord {
    /// Join key from the feeds
    pub geoname_id: u32,
    /// Country
    pub country: Country,
    /// Continent
    pub continent: Continent,
    /// City
    pub city: LocalizedName,
    /// IANA time zone, empty if unknown
    pub time_zone: String,
    /// Latitude in degrees
    pub latitude: Option<f64>,
    /// Longitude in degrees
    pub longitude: Option<f64>,
    /// Postal code
    pub postal_code: Option<String>,
}

impl LocationRecord {
    /// Stable content identifier (XXH64 of the encoded record)
    ///
    /// Two records with identical fields share an identifier and a single
    /// entry in the database's data section.
    pub fn content_id(&self) -> u64 {
        let mut buf = Vec::new();
        crate::data_section::encode_location(self, &mut buf);
        crate::data_section::content_id(&buf)
    }
}

/// A network joined with its location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    /// Network this record covers
    #[serde(skip)]
    pub network: NetworkKey,
    /// Canonical CIDR string of `network`
    #[serde(rename = "network")]
    pub cidr: String,
    /// Content identifier of `location`
    pub id: u64,
    /// Location data
    #[serde(flatten)]
    pub location: LocationRecord,
}

impl MergedRecord {
    /// Pair a network with a location, deriving the CIDR string and id
    pub fn new(network: NetworkKey, location: LocationRecord) -> Self {
        Self {
            network,
            cidr: network.to_string(),
            id: location.content_id(),
            location,
        }
    }

    /// Address family of the network ("ip version")
    pub fn family(&self) -> AddressFamily {
        self.network.family()
    }
}
