//! IPv4 prefix handling.
//!
//! The firewall API does not accept CIDR notation for network objects: it
//! wants `<network address>/<dotted netmask>`. `Ipv4Cidr` keeps the prefix
//! as configured and derives the normalized forms from it.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetError {
    #[error("invalid IPv4 address in {0:?}")]
    InvalidAddress(String),
    #[error("invalid prefix length in {input:?} (expected 0-32)")]
    InvalidPrefix { input: String },
}

/// An IPv4 prefix such as `0.0.0.0/0` or `10.20.0.0/16`.
///
/// Host bits are allowed in the input (`10.20.30.40/16`); `network()` masks
/// them off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// `0.0.0.0/0`.
    pub const DEFAULT_ROUTE: Ipv4Cidr = Ipv4Cidr {
        address: Ipv4Addr::UNSPECIFIED,
        prefix: 0,
    };

    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, NetError> {
        if prefix > 32 {
            return Err(NetError::InvalidPrefix {
                input: format!("{address}/{prefix}"),
            });
        }
        Ok(Self { address, prefix })
    }

    /// Parse `a.b.c.d/len`. A bare address is a /32.
    pub fn parse(input: &str) -> Result<Self, NetError> {
        let input = input.trim();
        let (addr, prefix) = match input.split_once('/') {
            Some((addr, len)) => {
                let prefix = len.parse::<u8>().map_err(|_| NetError::InvalidPrefix {
                    input: input.to_string(),
                })?;
                (addr, prefix)
            }
            None => (input, 32),
        };
        let address = addr
            .parse::<Ipv4Addr>()
            .map_err(|_| NetError::InvalidAddress(input.to_string()))?;
        if prefix > 32 {
            return Err(NetError::InvalidPrefix {
                input: input.to_string(),
            });
        }
        Ok(Self { address, prefix })
    }

    /// The address exactly as configured.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(mask_bits(self.prefix))
    }

    /// The address with host bits cleared.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & mask_bits(self.prefix))
    }

    /// `<network>/<dotted netmask>`, the only subnet form the firewall accepts.
    pub fn to_netmask_notation(&self) -> String {
        format!("{}/{}", self.network(), self.netmask())
    }
}

fn mask_bits(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p)),
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = NetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ipv4Cidr> for String {
    fn from(cidr: Ipv4Cidr) -> Self {
        cidr.to_string()
    }
}
