//! IPv4 CIDR blocks with validation at construction time.
//!
//! Network and cluster specs carry address ranges as [`CidrBlock`]
//! values rather than raw strings, so a malformed range is rejected
//! when the spec is built instead of surfacing during provisioning.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use schemars::{gen::SchemaGenerator, schema::Schema, JsonSchema};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// An IPv4 address range in CIDR notation, e.g. `10.0.0.0/16`.
///
/// The address must be the network address of the range: host bits
/// below the prefix must be zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CidrBlock {
    addr: Ipv4Addr,
    prefix: u8,
}

impl CidrBlock {
    /// Create a CIDR block, validating the prefix length and that no
    /// host bits are set in the address.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        let label = format!("{}/{}", addr, prefix);
        if prefix > 32 {
            return Err(Error::validation(
                label,
                "prefix length must be between 0 and 32",
            ));
        }
        if prefix < 32 {
            let host_mask = u32::MAX >> prefix;
            if u32::from(addr) & host_mask != 0 {
                return Err(Error::validation(
                    label,
                    "address has host bits set below the prefix",
                ));
            }
        }
        Ok(Self { addr, prefix })
    }

    /// Create a block from parts already known to satisfy the
    /// invariants. For compiled-in defaults only.
    pub(crate) const fn from_parts(addr: Ipv4Addr, prefix: u8) -> Self {
        Self { addr, prefix }
    }

    /// The network address of the range.
    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    /// The prefix length in bits.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether a subnet of `mask` bits fits inside this range.
    ///
    /// A subnet mask must be at least as long as the parent prefix;
    /// a coarser mask would describe a range larger than the parent.
    pub fn admits_mask(&self, mask: u8) -> bool {
        mask >= self.prefix && mask <= 32
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for CidrBlock {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::validation(s, "expected CIDR notation like 10.0.0.0/16"))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| Error::validation(s, "invalid IPv4 address"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| Error::validation(s, "invalid prefix length"))?;
        Self::new(addr, prefix)
    }
}

impl Serialize for CidrBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CidrBlock {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl JsonSchema for CidrBlock {
    fn schema_name() -> String {
        "CidrBlock".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        let mut schema = String::json_schema(gen).into_object();
        schema.format = Some("cidr".to_string());
        schema.into()
    }
}
