//! Policy routing rules. Reported by retrieval, never changed by apply.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ip::Family;
use super::route::IpPrefix;

/// What a rule does with matching packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Look the packet up in `table`.
    Table,
    /// Continue at the rule with priority `goto`.
    Goto,
    Nop,
    Blackhole,
    Unreachable,
    Prohibit,
}

impl RuleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Goto => "goto",
            Self::Nop => "nop",
            Self::Blackhole => "blackhole",
            Self::Unreachable => "unreachable",
            Self::Prohibit => "prohibit",
        }
    }

    /// From the kernel `FR_ACT_*` value.
    pub fn from_kernel(action: u8) -> Option<Self> {
        Some(match action {
            1 => Self::Table,
            2 => Self::Goto,
            3 => Self::Nop,
            6 => Self::Blackhole,
            7 => Self::Unreachable,
            8 => Self::Prohibit,
            _ => return None,
        })
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the routing policy database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub family: Family,
    pub priority: u32,
    pub action: RuleAction,
    pub table: Option<u32>,
    pub from: Option<IpPrefix>,
    pub to: Option<IpPrefix>,
    /// Input interface name.
    pub iif: Option<String>,
    /// Output interface name.
    pub oif: Option<String>,
    pub fwmark: Option<u32>,
    pub fwmask: Option<u32>,
    /// Target priority of a `goto` rule.
    pub goto: Option<u32>,
}

impl RouteRule {
    /// A rule matching everything and looking up `table`.
    pub fn lookup(family: Family, priority: u32, table: u32) -> Self {
        Self {
            family,
            priority,
            action: RuleAction::Table,
            table: Some(table),
            from: None,
            to: None,
            iif: None,
            oif: None,
            fwmark: None,
            fwmask: None,
            goto: None,
        }
    }

    /// Snapshot order: IPv4 first, then by priority.
    pub fn sort_key(&self) -> (u8, u32) {
        let family = match self.family {
            Family::Ipv4 => 0,
            Family::Ipv6 => 1,
        };
        (family, self.priority)
    }
}

impl fmt::Display for RouteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.priority)?;
        match &self.from {
            Some(from) => write!(f, "from {}", from)?,
            None => f.write_str("from all")?,
        }
        if let Some(to) = &self.to {
            write!(f, " to {}", to)?;
        }
        if let Some(iif) = &self.iif {
            write!(f, " iif {}", iif)?;
        }
        if let Some(oif) = &self.oif {
            write!(f, " oif {}", oif)?;
        }
        if let Some(mark) = self.fwmark {
            write!(f, " fwmark {:#x}", mark)?;
        }
        match (self.action, self.table, self.goto) {
            (RuleAction::Table, Some(table), _) => write!(f, " lookup {}", table),
            (RuleAction::Goto, _, Some(target)) => write!(f, " goto {}", target),
            (action, _, _) => write!(f, " {}", action),
        }
    }
}
