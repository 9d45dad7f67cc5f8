//! Interfaces and their type-specific configuration.

use std::fmt;
use std::str::FromStr;

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::ip::{Family, IpConfig};

/// Administrative state of an interface, or the deletion directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceState {
    Up,
    Down,
    /// Delete the interface. Only meaningful in desired state.
    Absent,
}

impl fmt::Display for InterfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Absent => "absent",
        })
    }
}

/// The `type` tag of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceType {
    Ethernet,
    Loopback,
    Dummy,
    Veth,
    Bridge,
    Bond,
    Vlan,
    Vrf,
    Vxlan,
    Macvlan,
    Macvtap,
    /// Tun or tap device.
    Tun,
    /// A kernel link kind this engine does not model.
    Unknown,
}

impl InterfaceType {
    pub const ALL: [InterfaceType; 13] = [
        Self::Ethernet,
        Self::Loopback,
        Self::Dummy,
        Self::Veth,
        Self::Bridge,
        Self::Bond,
        Self::Vlan,
        Self::Vrf,
        Self::Vxlan,
        Self::Macvlan,
        Self::Macvtap,
        Self::Tun,
        Self::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ethernet => "ethernet",
            Self::Loopback => "loopback",
            Self::Dummy => "dummy",
            Self::Veth => "veth",
            Self::Bridge => "bridge",
            Self::Bond => "bond",
            Self::Vlan => "vlan",
            Self::Vrf => "vrf",
            Self::Vxlan => "vxlan",
            Self::Macvlan => "macvlan",
            Self::Macvtap => "macvtap",
            Self::Tun => "tun",
            Self::Unknown => "unknown",
        }
    }

    /// Whether interfaces can enslave ports (`controller` targets).
    pub fn is_controller(self) -> bool {
        matches!(self, Self::Bridge | Self::Bond | Self::Vrf)
    }

    /// Whether this engine can create interfaces of this type.
    pub fn is_creatable(self) -> bool {
        matches!(
            self,
            Self::Dummy | Self::Veth | Self::Bridge | Self::Bond | Self::Vlan
        )
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|t| t.as_str() == s).ok_or(())
    }
}

/// Bonding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondMode {
    #[serde(rename = "balance-rr")]
    BalanceRr,
    #[serde(rename = "active-backup")]
    ActiveBackup,
    #[serde(rename = "balance-xor")]
    BalanceXor,
    #[serde(rename = "broadcast")]
    Broadcast,
    #[serde(rename = "802.3ad")]
    Ieee8023ad,
    #[serde(rename = "balance-tlb")]
    BalanceTlb,
    #[serde(rename = "balance-alb")]
    BalanceAlb,
}

impl BondMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BalanceRr => "balance-rr",
            Self::ActiveBackup => "active-backup",
            Self::BalanceXor => "balance-xor",
            Self::Broadcast => "broadcast",
            Self::Ieee8023ad => "802.3ad",
            Self::BalanceTlb => "balance-tlb",
            Self::BalanceAlb => "balance-alb",
        }
    }

    /// Kernel `IFLA_BOND_MODE` value.
    pub fn as_kernel(self) -> u8 {
        match self {
            Self::BalanceRr => 0,
            Self::ActiveBackup => 1,
            Self::BalanceXor => 2,
            Self::Broadcast => 3,
            Self::Ieee8023ad => 4,
            Self::BalanceTlb => 5,
            Self::BalanceAlb => 6,
        }
    }

    pub fn from_kernel(mode: u8) -> Option<Self> {
        Some(match mode {
            0 => Self::BalanceRr,
            1 => Self::ActiveBackup,
            2 => Self::BalanceXor,
            3 => Self::Broadcast,
            4 => Self::Ieee8023ad,
            5 => Self::BalanceTlb,
            6 => Self::BalanceAlb,
            _ => return None,
        })
    }
}

impl fmt::Display for BondMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Macvlan and macvtap port mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacvlanMode {
    Private,
    Vepa,
    Bridge,
    Passthru,
    Source,
}

impl MacvlanMode {
    /// Kernel `IFLA_MACVLAN_MODE` value.
    pub fn as_kernel(self) -> u32 {
        match self {
            Self::Private => 1,
            Self::Vepa => 2,
            Self::Bridge => 4,
            Self::Passthru => 8,
            Self::Source => 16,
        }
    }

    pub fn from_kernel(mode: u32) -> Option<Self> {
        Some(match mode {
            1 => Self::Private,
            2 => Self::Vepa,
            4 => Self::Bridge,
            8 => Self::Passthru,
            16 => Self::Source,
            _ => return None,
        })
    }
}

/// Whether a tun device carries IP packets or ethernet frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunMode {
    Tun,
    Tap,
}

impl TunMode {
    /// From the kernel `IFF_TUN`/`IFF_TAP` device type.
    pub fn from_kernel(kind: u8) -> Option<Self> {
        match kind {
            1 => Some(Self::Tun),
            2 => Some(Self::Tap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VethConfig {
    pub peer: Option<String>,
    /// Set when the peer lives in another network namespace. `peer` is then
    /// the peer's ifindex within that namespace.
    pub peer_netnsid: Option<i32>,
}

impl VethConfig {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: Some(peer.into()),
            peer_netnsid: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Attached ports. Retrieved snapshots list them sorted.
    pub ports: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BondConfig {
    pub mode: Option<BondMode>,
    pub ports: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VlanConfig {
    pub base_iface: Option<String>,
    pub vlan_id: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VrfConfig {
    /// Routing table the vrf binds.
    pub table: Option<u32>,
    pub ports: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VxlanConfig {
    pub vni: Option<u32>,
    /// Unicast remote or multicast group.
    pub remote: Option<IpAddr>,
    pub local: Option<IpAddr>,
    /// Underlay device.
    pub base_iface: Option<String>,
    pub dst_port: Option<u16>,
}

/// Shared by macvlan and macvtap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacvlanConfig {
    pub base_iface: Option<String>,
    pub mode: Option<MacvlanMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunConfig {
    pub mode: Option<TunMode>,
}

/// Type-specific part of an interface, one variant per link type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkConfig {
    Ethernet,
    Loopback,
    Dummy,
    Veth(VethConfig),
    Bridge(BridgeConfig),
    Bond(BondConfig),
    Vlan(VlanConfig),
    Vrf(VrfConfig),
    Vxlan(VxlanConfig),
    Macvlan(MacvlanConfig),
    Macvtap(MacvlanConfig),
    Tun(TunConfig),
    Unknown,
}

impl LinkConfig {
    pub fn iface_type(&self) -> InterfaceType {
        match self {
            Self::Ethernet => InterfaceType::Ethernet,
            Self::Loopback => InterfaceType::Loopback,
            Self::Dummy => InterfaceType::Dummy,
            Self::Veth(_) => InterfaceType::Veth,
            Self::Bridge(_) => InterfaceType::Bridge,
            Self::Bond(_) => InterfaceType::Bond,
            Self::Vlan(_) => InterfaceType::Vlan,
            Self::Vrf(_) => InterfaceType::Vrf,
            Self::Vxlan(_) => InterfaceType::Vxlan,
            Self::Macvlan(_) => InterfaceType::Macvlan,
            Self::Macvtap(_) => InterfaceType::Macvtap,
            Self::Tun(_) => InterfaceType::Tun,
            Self::Unknown => InterfaceType::Unknown,
        }
    }

    /// Empty configuration for a type tag.
    pub fn for_type(iface_type: InterfaceType) -> Self {
        match iface_type {
            InterfaceType::Ethernet => Self::Ethernet,
            InterfaceType::Loopback => Self::Loopback,
            InterfaceType::Dummy => Self::Dummy,
            InterfaceType::Veth => Self::Veth(VethConfig::default()),
            InterfaceType::Bridge => Self::Bridge(BridgeConfig::default()),
            InterfaceType::Bond => Self::Bond(BondConfig::default()),
            InterfaceType::Vlan => Self::Vlan(VlanConfig::default()),
            InterfaceType::Vrf => Self::Vrf(VrfConfig::default()),
            InterfaceType::Vxlan => Self::Vxlan(VxlanConfig::default()),
            InterfaceType::Macvlan => Self::Macvlan(MacvlanConfig::default()),
            InterfaceType::Macvtap => Self::Macvtap(MacvlanConfig::default()),
            InterfaceType::Tun => Self::Tun(TunConfig::default()),
            InterfaceType::Unknown => Self::Unknown,
        }
    }

    /// Ports of a bridge, bond or vrf, when stated.
    pub fn ports(&self) -> Option<&[String]> {
        match self {
            Self::Bridge(BridgeConfig { ports })
            | Self::Bond(BondConfig { ports, .. })
            | Self::Vrf(VrfConfig { ports, .. }) => ports.as_deref(),
            _ => None,
        }
    }

    /// Peer of a veth whose both ends live in this namespace.
    pub fn veth_peer(&self) -> Option<&str> {
        match self {
            Self::Veth(VethConfig {
                peer,
                peer_netnsid: None,
            }) => peer.as_deref(),
            _ => None,
        }
    }

    /// Device this link is stacked on. The kernel removes the link along
    /// with it.
    pub fn lower_iface(&self) -> Option<&str> {
        match self {
            Self::Vlan(VlanConfig { base_iface, .. })
            | Self::Vxlan(VxlanConfig { base_iface, .. })
            | Self::Macvlan(MacvlanConfig { base_iface, .. })
            | Self::Macvtap(MacvlanConfig { base_iface, .. }) => base_iface.as_deref(),
            _ => None,
        }
    }
}

/// Hardware address, written as colon-separated hex octets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacAddress(Vec<u8>);

impl MacAddress {
    pub fn new(octets: impl Into<Vec<u8>>) -> Self {
        Self(octets.into())
    }

    pub fn octets(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets = s
            .split(':')
            .map(|part| match part.len() {
                1 | 2 => u8::from_str_radix(part, 16).ok(),
                _ => None,
            })
            .collect::<Option<Vec<u8>>>()
            .filter(|o| o.len() >= 6)
            .ok_or_else(|| format!("invalid MAC address '{}'", s))?;
        Ok(Self(octets))
    }
}

/// One network interface.
///
/// Current-state interfaces have every applicable field populated. Desired
/// state may leave any field but `name` unset, meaning "leave unchanged".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub state: Option<InterfaceState>,
    /// Type tag plus type-specific fields; `None` when the type is not stated.
    pub link: Option<LinkConfig>,
    /// Kernel ifindex. Reported by retrieval, ignored by apply.
    pub index: Option<u32>,
    pub mtu: Option<u32>,
    pub mac_address: Option<MacAddress>,
    /// Controller name. An empty string in desired state detaches.
    pub controller: Option<String>,
    pub ipv4: Option<IpConfig>,
    pub ipv6: Option<IpConfig>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: None,
            link: None,
            index: None,
            mtu: None,
            mac_address: None,
            controller: None,
            ipv4: None,
            ipv6: None,
        }
    }

    /// A deletion directive for `name`.
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            state: Some(InterfaceState::Absent),
            ..Self::new(name)
        }
    }

    pub fn with_link(mut self, link: LinkConfig) -> Self {
        self.link = Some(link);
        self
    }

    pub fn with_state(mut self, state: InterfaceState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn is_absent(&self) -> bool {
        self.state == Some(InterfaceState::Absent)
    }

    pub fn iface_type(&self) -> Option<InterfaceType> {
        self.link.as_ref().map(LinkConfig::iface_type)
    }

    pub fn ip(&self, family: Family) -> Option<&IpConfig> {
        match family {
            Family::Ipv4 => self.ipv4.as_ref(),
            Family::Ipv6 => self.ipv6.as_ref(),
        }
    }

    /// Desired controller, with `""` normalized to "detached".
    pub(crate) fn desired_controller(&self) -> Option<Option<&str>> {
        self.controller
            .as_deref()
            .map(|c| if c.is_empty() { None } else { Some(c) })
    }
}

/// Kernel interface name rules (IFNAMSIZ and `dev_valid_name`).
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("interface name must not be empty".into());
    }
    if name.len() > 15 {
        return Err(format!("interface name '{}' is longer than 15 bytes", name));
    }
    if name == "." || name == ".." {
        return Err(format!("invalid interface name '{}'", name));
    }
    if name.chars().any(|c| c == '/' || c == ':' || c.is_whitespace()) {
        return Err(format!("interface name '{}' contains an invalid character", name));
    }
    Ok(())
}
