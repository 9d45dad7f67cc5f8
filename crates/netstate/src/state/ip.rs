//! Interface addresses.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Address family of an [`IpConfig`] section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Ipv4,
    Ipv6,
}

impl Family {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Ipv4,
            IpAddr::V6(_) => Self::Ipv6,
        }
    }

    pub fn max_prefix_len(self) -> u8 {
        match self {
            Self::Ipv4 => 32,
            Self::Ipv6 => 128,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        }
    }
}

/// An address assigned to an interface, e.g. `192.0.2.1/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IpAddress {
    pub address: IpAddr,
    pub prefix_len: u8,
}

impl IpAddress {
    pub fn new(address: IpAddr, prefix_len: u8) -> Self {
        Self {
            address,
            prefix_len,
        }
    }

    pub fn family(&self) -> Family {
        Family::of(&self.address)
    }

    /// `fe80::/10`. The kernel manages these on its own.
    pub fn is_ipv6_link_local(&self) -> bool {
        match self.address {
            IpAddr::V6(v6) => v6.segments()[0] & 0xffc0 == 0xfe80,
            IpAddr::V4(_) => false,
        }
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("missing prefix length in '{}'", s))?;
        let address: IpAddr = addr
            .parse()
            .map_err(|_| format!("invalid address '{}'", addr))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| format!("invalid prefix length '{}'", prefix))?;
        if prefix_len > Family::of(&address).max_prefix_len() {
            return Err(format!("prefix length {} out of range for {}", prefix_len, address));
        }
        Ok(Self::new(address, prefix_len))
    }
}

/// One address family section of an interface (`ipv4` / `ipv6`).
///
/// In desired state the list is the complete set wanted for that family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpConfig {
    pub addresses: Vec<IpAddress>,
}

impl IpConfig {
    pub fn new(mut addresses: Vec<IpAddress>) -> Self {
        addresses.sort();
        addresses.dedup();
        Self { addresses }
    }

    /// Addresses the engine manages, i.e. everything except IPv6 link-local.
    pub fn managed(&self) -> impl Iterator<Item = &IpAddress> {
        self.addresses.iter().filter(|a| !a.is_ipv6_link_local())
    }
}
