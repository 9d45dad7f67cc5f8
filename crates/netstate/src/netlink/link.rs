//! Link messages: parsing `RTM_NEWLINK` replies and building link requests.

use std::net::IpAddr;

use super::attr::{AttrIter, get};
use super::builder::MessageBuilder;
use super::connection::{ack_request, create_request, dump_request, get_request};
use super::message::NlMsgType;
use super::parse::{FromNetlink, PResult, parse_attrs, parse_header, parse_ip_addr};
use super::types::{IFF_UP, IfInfoMsg, ifla, ifla_info, info_data};

/// `IFLA_VXLAN_*` attributes of a vxlan link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VxlanInfo {
    pub id: Option<u32>,
    /// Remote or multicast group.
    pub group: Option<IpAddr>,
    pub local: Option<IpAddr>,
    /// ifindex of the underlay device.
    pub link: Option<u32>,
    pub port: Option<u16>,
}

/// Link message with the attributes the state engine consumes.
#[derive(Debug, Clone, Default)]
pub struct LinkMessage {
    pub(crate) header: IfInfoMsg,
    pub(crate) name: Option<String>,
    pub(crate) address: Option<Vec<u8>>,
    pub(crate) mtu: Option<u32>,
    pub(crate) link: Option<u32>,
    pub(crate) link_netnsid: Option<i32>,
    pub(crate) master: Option<u32>,
    pub(crate) kind: Option<String>,
    pub(crate) vlan_id: Option<u16>,
    pub(crate) bond_mode: Option<u8>,
    pub(crate) vrf_table: Option<u32>,
    pub(crate) macvlan_mode: Option<u32>,
    pub(crate) tun_type: Option<u8>,
    pub(crate) vxlan: Option<VxlanInfo>,
}

impl LinkMessage {
    pub fn index(&self) -> u32 {
        self.header.ifi_index as u32
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// ARPHRD_* hardware type.
    pub fn hw_type(&self) -> u16 {
        self.header.ifi_type
    }

    /// Administrative state (IFF_UP).
    pub fn is_up(&self) -> bool {
        self.header.ifi_flags & IFF_UP != 0
    }

    pub fn address(&self) -> Option<&[u8]> {
        self.address.as_deref()
    }

    pub fn mtu(&self) -> Option<u32> {
        self.mtu
    }

    /// IFLA_LINK: veth peer or vlan/macvlan lower device.
    pub fn link(&self) -> Option<u32> {
        self.link
    }

    /// Set when [`link`](Self::link) is an ifindex in another namespace.
    pub fn link_netnsid(&self) -> Option<i32> {
        self.link_netnsid
    }

    /// Controller (bridge/bond) index; 0 from the kernel means none.
    pub fn master(&self) -> Option<u32> {
        self.master.filter(|&m| m != 0)
    }

    /// IFLA_INFO_KIND, absent for physical devices and loopback.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn vlan_id(&self) -> Option<u16> {
        self.vlan_id
    }

    pub fn bond_mode(&self) -> Option<u8> {
        self.bond_mode
    }

    pub fn vrf_table(&self) -> Option<u32> {
        self.vrf_table
    }

    /// `MACVLAN_MODE_*` of a macvlan or macvtap.
    pub fn macvlan_mode(&self) -> Option<u32> {
        self.macvlan_mode
    }

    /// `IFF_TUN` or `IFF_TAP`.
    pub fn tun_type(&self) -> Option<u8> {
        self.tun_type
    }

    pub fn vxlan(&self) -> Option<&VxlanInfo> {
        self.vxlan.as_ref()
    }

    fn parse_vxlan(&mut self, data: &[u8]) {
        let mut vxlan = VxlanInfo::default();
        let v4 = libc::AF_INET as u8;
        let v6 = libc::AF_INET6 as u8;
        for (kind, payload) in AttrIter::new(data) {
            match kind {
                info_data::IFLA_VXLAN_ID => vxlan.id = get::u32_ne(payload).ok(),
                info_data::IFLA_VXLAN_GROUP => vxlan.group = parse_ip_addr(payload, v4).ok(),
                info_data::IFLA_VXLAN_GROUP6 => vxlan.group = parse_ip_addr(payload, v6).ok(),
                info_data::IFLA_VXLAN_LOCAL => vxlan.local = parse_ip_addr(payload, v4).ok(),
                info_data::IFLA_VXLAN_LOCAL6 => vxlan.local = parse_ip_addr(payload, v6).ok(),
                info_data::IFLA_VXLAN_LINK => {
                    vxlan.link = get::u32_ne(payload).ok().filter(|&l| l != 0)
                }
                info_data::IFLA_VXLAN_PORT => vxlan.port = get::u16_be(payload).ok(),
                _ => {}
            }
        }
        self.vxlan = Some(vxlan);
    }

    fn parse_link_info(&mut self, data: &[u8]) {
        let mut info_data = None;
        for (kind, payload) in AttrIter::new(data) {
            match kind {
                ifla_info::KIND => self.kind = get::string(payload).ok().map(str::to_string),
                ifla_info::DATA => info_data = Some(payload),
                _ => {}
            }
        }

        let Some(info_data) = info_data else {
            return;
        };
        if self.kind.as_deref() == Some("vxlan") {
            self.parse_vxlan(info_data);
            return;
        }
        for (kind, payload) in AttrIter::new(info_data) {
            match (self.kind.as_deref(), kind) {
                (Some("vlan"), info_data::IFLA_VLAN_ID) => self.vlan_id = get::u16_ne(payload).ok(),
                (Some("bond"), info_data::IFLA_BOND_MODE) => {
                    self.bond_mode = get::u8(payload).ok()
                }
                (Some("vrf"), info_data::IFLA_VRF_TABLE) => {
                    self.vrf_table = get::u32_ne(payload).ok()
                }
                (Some("macvlan" | "macvtap"), info_data::IFLA_MACVLAN_MODE) => {
                    self.macvlan_mode = get::u32_ne(payload).ok()
                }
                (Some("tun"), info_data::IFLA_TUN_TYPE) => self.tun_type = get::u8(payload).ok(),
                _ => {}
            }
        }
    }
}

impl FromNetlink for LinkMessage {
    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header: IfInfoMsg = parse_header(input)?;
        let mut msg = LinkMessage {
            header,
            ..Default::default()
        };

        for (kind, payload) in parse_attrs(input)? {
            match kind {
                ifla::IFNAME => msg.name = get::string(payload).ok().map(str::to_string),
                ifla::ADDRESS => msg.address = Some(payload.to_vec()),
                ifla::MTU => msg.mtu = get::u32_ne(payload).ok(),
                ifla::LINK => msg.link = get::u32_ne(payload).ok(),
                ifla::LINK_NETNSID => msg.link_netnsid = get::i32_ne(payload).ok(),
                ifla::MASTER => msg.master = get::u32_ne(payload).ok(),
                ifla::LINKINFO => msg.parse_link_info(payload),
                _ => {}
            }
        }

        Ok(msg)
    }
}

/// Kind-specific parameters of a link to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewLink<'a> {
    Dummy,
    Bridge,
    Bond { mode: Option<u8> },
    Veth { peer: &'a str },
    Vlan { lower: u32, vlan_id: u16 },
}

impl NewLink<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dummy => "dummy",
            Self::Bridge => "bridge",
            Self::Bond { .. } => "bond",
            Self::Veth { .. } => "veth",
            Self::Vlan { .. } => "vlan",
        }
    }
}

/// Dump every link.
pub fn dump_links() -> MessageBuilder {
    let mut builder = dump_request(NlMsgType::RTM_GETLINK);
    builder.append(&IfInfoMsg::new());
    builder
}

/// Fetch a single link by name.
pub fn get_link(name: &str) -> MessageBuilder {
    let mut builder = get_request(NlMsgType::RTM_GETLINK);
    builder.append(&IfInfoMsg::new());
    builder.append_attr_str(ifla::IFNAME, name);
    builder
}

/// Create a link. The kernel creates it administratively down.
pub fn create_link(name: &str, new: NewLink<'_>) -> MessageBuilder {
    let mut builder = create_request(NlMsgType::RTM_NEWLINK);
    builder.append(&IfInfoMsg::new());
    builder.append_attr_str(ifla::IFNAME, name);
    if let NewLink::Vlan { lower, .. } = new {
        builder.append_attr_u32(ifla::LINK, lower);
    }

    let linkinfo = builder.nest_start(ifla::LINKINFO);
    builder.append_attr_str(ifla_info::KIND, new.kind());
    match new {
        NewLink::Dummy | NewLink::Bridge | NewLink::Bond { mode: None } => {}
        NewLink::Bond { mode: Some(mode) } => {
            let data = builder.nest_start(ifla_info::DATA);
            builder.append_attr_u8(info_data::IFLA_BOND_MODE, mode);
            builder.nest_end(data);
        }
        NewLink::Veth { peer } => {
            // IFLA_INFO_DATA -> VETH_INFO_PEER -> ifinfomsg + peer attributes
            let data = builder.nest_start(ifla_info::DATA);
            let peer_nest = builder.nest_start(info_data::VETH_INFO_PEER);
            builder.append(&IfInfoMsg::new());
            builder.append_attr_str(ifla::IFNAME, peer);
            builder.nest_end(peer_nest);
            builder.nest_end(data);
        }
        NewLink::Vlan { vlan_id, .. } => {
            let data = builder.nest_start(ifla_info::DATA);
            builder.append_attr_u16(info_data::IFLA_VLAN_ID, vlan_id);
            builder.nest_end(data);
        }
    }
    builder.nest_end(linkinfo);
    builder
}

fn set_link(index: u32) -> (MessageBuilder, IfInfoMsg) {
    (
        ack_request(NlMsgType::RTM_SETLINK),
        IfInfoMsg::new().with_index(index),
    )
}

/// Set the administrative state.
pub fn set_admin_state(index: u32, up: bool) -> MessageBuilder {
    let (mut builder, mut ifinfo) = set_link(index);
    ifinfo.ifi_flags = if up { IFF_UP } else { 0 };
    ifinfo.ifi_change = IFF_UP;
    builder.append(&ifinfo);
    builder
}

pub fn set_mtu(index: u32, mtu: u32) -> MessageBuilder {
    let (mut builder, ifinfo) = set_link(index);
    builder.append(&ifinfo);
    builder.append_attr_u32(ifla::MTU, mtu);
    builder
}

/// Set the hardware address.
pub fn set_address(index: u32, mac: &[u8]) -> MessageBuilder {
    let (mut builder, ifinfo) = set_link(index);
    builder.append(&ifinfo);
    builder.append_attr(ifla::ADDRESS, mac);
    builder
}

/// Attach to a controller, or detach with `master == 0`.
pub fn set_master(index: u32, master: u32) -> MessageBuilder {
    let (mut builder, ifinfo) = set_link(index);
    builder.append(&ifinfo);
    builder.append_attr_u32(ifla::MASTER, master);
    builder
}

pub fn delete_link(index: u32) -> MessageBuilder {
    let mut builder = ack_request(NlMsgType::RTM_DELLINK);
    builder.append(&IfInfoMsg::new().with_index(index));
    builder
}
