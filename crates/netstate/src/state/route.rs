//! Routes attached to interfaces.

use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use super::ip::Family;

/// Main routing table.
pub const MAIN_TABLE: u32 = 254;

/// A route destination, e.g. `10.0.0.0/8` or `::/0`. Host bits must be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpPrefix {
    pub address: IpAddr,
    pub prefix_len: u8,
}

impl IpPrefix {
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, String> {
        if prefix_len > Family::of(&address).max_prefix_len() {
            return Err(format!("prefix length {} out of range for {}", prefix_len, address));
        }
        if mask(&address, prefix_len) != address {
            return Err(format!("{}/{} has host bits set", address, prefix_len));
        }
        Ok(Self {
            address,
            prefix_len,
        })
    }

    pub fn family(&self) -> Family {
        Family::of(&self.address)
    }
}

fn mask(address: &IpAddr, prefix_len: u8) -> IpAddr {
    match address {
        IpAddr::V4(v4) => {
            let bits = u32::from(*v4);
            let m = u32::MAX.checked_shl(32 - u32::from(prefix_len)).unwrap_or(0);
            IpAddr::from((bits & m).to_be_bytes())
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(*v6);
            let m = u128::MAX.checked_shl(128 - u32::from(prefix_len)).unwrap_or(0);
            IpAddr::from((bits & m).to_be_bytes())
        }
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
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
        Self::new(address, prefix_len)
    }
}

impl PartialOrd for IpPrefix {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IpPrefix {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.address, self.prefix_len).cmp(&(other.address, other.prefix_len))
    }
}

/// A route through an interface.
///
/// Retrieved routes always carry `table` and `metric`. In desired state every
/// field but `dst` and `oif` is optional and only constrains matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub dst: IpPrefix,
    pub oif: String,
    pub via: Option<IpAddr>,
    pub metric: Option<u32>,
    pub table: Option<u32>,
    /// Set when this desired route is to be removed.
    pub absent: bool,
}

impl Route {
    pub fn new(dst: IpPrefix, oif: impl Into<String>) -> Self {
        Self {
            dst,
            oif: oif.into(),
            via: None,
            metric: None,
            table: None,
            absent: false,
        }
    }

    /// Whether this (desired) route selects `current`.
    pub fn matches(&self, current: &Route) -> bool {
        self.dst == current.dst
            && self.oif == current.oif
            && self.via.is_none_or(|via| current.via == Some(via))
            && self
                .metric
                .is_none_or(|metric| current.metric.unwrap_or(0) == metric)
            && self
                .table
                .is_none_or(|table| current.table.unwrap_or(MAIN_TABLE) == table)
    }

    /// Stable sort key used for retrieved snapshots.
    pub(crate) fn sort_key(&self) -> (String, IpPrefix, u32, u32) {
        (
            self.oif.clone(),
            self.dst,
            self.table.unwrap_or(MAIN_TABLE),
            self.metric.unwrap_or(0),
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dst)?;
        if let Some(via) = self.via {
            write!(f, " via {}", via)?;
        }
        write!(f, " dev {}", self.oif)?;
        if let Some(metric) = self.metric {
            write!(f, " metric {}", metric)?;
        }
        if let Some(table) = self.table.filter(|&t| t != MAIN_TABLE) {
            write!(f, " table {}", table)?;
        }
        Ok(())
    }
}
