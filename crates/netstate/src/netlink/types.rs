//! Fixed rtnetlink family headers and attribute identifiers.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Interface info message (struct ifinfomsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    pub ifi_family: u8,
    pub __ifi_pad: u8,
    /// ARPHRD_* hardware type.
    pub ifi_type: u16,
    pub ifi_index: i32,
    /// IFF_* flags.
    pub ifi_flags: u32,
    /// Mask of flags to change.
    pub ifi_change: u32,
}

impl IfInfoMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.ifi_index = index as i32;
        self
    }
}

/// Interface address message (struct ifaddrmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfAddrMsg {
    pub ifa_family: u8,
    pub ifa_prefixlen: u8,
    pub ifa_flags: u8,
    pub ifa_scope: u8,
    pub ifa_index: u32,
}

/// Route message (struct rtmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RtMsg {
    pub rtm_family: u8,
    pub rtm_dst_len: u8,
    pub rtm_src_len: u8,
    pub rtm_tos: u8,
    pub rtm_table: u8,
    pub rtm_protocol: u8,
    pub rtm_scope: u8,
    pub rtm_type: u8,
    pub rtm_flags: u32,
}

/// Routing rule message (struct fib_rule_hdr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FibRuleHdr {
    pub family: u8,
    pub dst_len: u8,
    pub src_len: u8,
    pub tos: u8,
    pub table: u8,
    pub res1: u8,
    pub res2: u8,
    /// FR_ACT_* action.
    pub action: u8,
    pub flags: u32,
}

/// Interface flags.
pub const IFF_UP: u32 = 0x1;

/// ARPHRD_* hardware types.
pub mod arphrd {
    pub const ETHER: u16 = 1;
    pub const LOOPBACK: u16 = 772;
}

/// IFLA_* link attributes.
pub mod ifla {
    pub const ADDRESS: u16 = 1;
    pub const IFNAME: u16 = 3;
    pub const MTU: u16 = 4;
    pub const LINK: u16 = 5;
    pub const MASTER: u16 = 10;
    pub const LINKINFO: u16 = 18;
    /// Namespace id of the peer that `LINK` refers to.
    pub const LINK_NETNSID: u16 = 37;
}

/// IFLA_INFO_* nested in IFLA_LINKINFO.
pub mod ifla_info {
    pub const KIND: u16 = 1;
    pub const DATA: u16 = 2;
}

/// Type-specific IFLA_INFO_DATA attributes.
pub mod info_data {
    pub const VETH_INFO_PEER: u16 = 1;
    pub const IFLA_VLAN_ID: u16 = 1;
    pub const IFLA_BOND_MODE: u16 = 1;
    pub const IFLA_VRF_TABLE: u16 = 1;
    pub const IFLA_MACVLAN_MODE: u16 = 1;
    pub const IFLA_TUN_TYPE: u16 = 3;
    pub const IFLA_VXLAN_ID: u16 = 1;
    pub const IFLA_VXLAN_GROUP: u16 = 2;
    pub const IFLA_VXLAN_LINK: u16 = 3;
    pub const IFLA_VXLAN_LOCAL: u16 = 4;
    /// Destination UDP port, big endian.
    pub const IFLA_VXLAN_PORT: u16 = 15;
    pub const IFLA_VXLAN_GROUP6: u16 = 16;
    pub const IFLA_VXLAN_LOCAL6: u16 = 17;
}

/// IFA_* address attributes.
pub mod ifa {
    pub const ADDRESS: u16 = 1;
    pub const LOCAL: u16 = 2;
}

/// RTA_* route attributes.
pub mod rta {
    pub const DST: u16 = 1;
    pub const OIF: u16 = 4;
    pub const GATEWAY: u16 = 5;
    pub const PRIORITY: u16 = 6;
    pub const TABLE: u16 = 15;
}

/// Routing table ids.
pub mod rt_table {
    pub const UNSPEC: u8 = 0;
    pub const MAIN: u32 = 254;
    pub const LOCAL: u32 = 255;
}

/// RTPROT_* route origins.
pub mod rt_proto {
    /// Matches any origin in `RTM_DELROUTE`.
    pub const UNSPEC: u8 = 0;
    pub const KERNEL: u8 = 2;
    pub const BOOT: u8 = 3;
    pub const STATIC: u8 = 4;
}

/// RT_SCOPE_* values.
pub mod rt_scope {
    pub const UNIVERSE: u8 = 0;
    pub const LINK: u8 = 253;
    pub const NOWHERE: u8 = 255;
}

/// FRA_* routing rule attributes.
pub mod fra {
    pub const DST: u16 = 1;
    pub const SRC: u16 = 2;
    pub const IIFNAME: u16 = 3;
    pub const GOTO: u16 = 4;
    pub const PRIORITY: u16 = 6;
    pub const FWMARK: u16 = 10;
    pub const TABLE: u16 = 15;
    pub const FWMASK: u16 = 16;
    pub const OIFNAME: u16 = 17;
}

/// FR_ACT_* routing rule actions.
pub mod fr_act {
    pub const TO_TBL: u8 = 1;
    pub const GOTO: u8 = 2;
    pub const NOP: u8 = 3;
    pub const BLACKHOLE: u8 = 6;
    pub const UNREACHABLE: u8 = 7;
    pub const PROHIBIT: u8 = 8;
}

/// RTN_* route types.
pub mod rtn {
    pub const UNICAST: u8 = 1;
}
