//! Kernel access as an injected capability.
//!
//! The retrieval and apply engines only talk to the kernel through
//! [`KernelProvider`]. [`NetlinkProvider`](netlink::NetlinkProvider) drives a
//! real network namespace over rtnetlink; [`MemoryProvider`](memory::MemoryProvider)
//! keeps a kernel-like model in memory for tests.

pub mod memory;
pub mod netlink;

use std::net::IpAddr;

pub use crate::apply::delta::{ControllerChange, CreateKind, CreateSpec, InterfaceDelta};
pub use crate::netlink::link::VxlanInfo;
use crate::netlink::Result;
use crate::state::{IpAddress, RouteRule};

/// Hardware type of ethernet-like devices (`ARPHRD_ETHER`).
pub const ARPHRD_ETHER: u16 = crate::netlink::types::arphrd::ETHER;
/// Hardware type of the loopback device (`ARPHRD_LOOPBACK`).
pub const ARPHRD_LOOPBACK: u16 = crate::netlink::types::arphrd::LOOPBACK;

/// An entry of the interface list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSummary {
    pub index: u32,
    pub name: String,
}

/// Raw kernel view of one interface. References to other interfaces are
/// ifindexes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDetail {
    pub index: u32,
    pub name: String,
    /// `IFLA_INFO_KIND`, e.g. `veth`. `None` for physical devices and loopback.
    pub kind: Option<String>,
    /// `ARPHRD_*` hardware type.
    pub hw_type: u16,
    /// `IFF_UP`.
    pub admin_up: bool,
    pub mtu: Option<u32>,
    pub mac: Option<Vec<u8>>,
    /// ifindex of the bridge/bond this interface is attached to.
    pub controller: Option<u32>,
    /// `IFLA_LINK`: veth peer, or vlan and macvlan base.
    pub link: Option<u32>,
    /// `IFLA_LINK_NETNSID`: `link` is an ifindex of the namespace with
    /// this id rather than of this one.
    pub link_netnsid: Option<i32>,
    pub vlan_id: Option<u16>,
    pub bond_mode: Option<u8>,
    pub vrf_table: Option<u32>,
    /// `IFLA_MACVLAN_MODE`, for macvlan and macvtap.
    pub macvlan_mode: Option<u32>,
    /// `IFF_TUN` or `IFF_TAP`.
    pub tun_type: Option<u8>,
    pub vxlan: Option<VxlanInfo>,
    pub addresses: Vec<IpAddress>,
    pub routes: Vec<RouteDetail>,
}

/// A route whose output interface is the [`LinkDetail`] carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDetail {
    pub dst: IpAddr,
    pub prefix_len: u8,
    pub gateway: Option<IpAddr>,
    pub metric: u32,
    pub table: u32,
    /// `RTPROT_*` origin, e.g. kernel for prefix routes.
    pub protocol: u8,
}

/// Operations the engines need from the kernel.
///
/// Every method fails with a [`PlatformError`](crate::PlatformError). A single
/// call is expected to be atomic at the kernel level; nothing spans calls.
#[allow(async_fn_in_trait)]
pub trait KernelProvider {
    /// Every interface visible in the namespace.
    async fn list_interfaces(&self) -> Result<Vec<LinkSummary>>;

    /// Details, addresses and routes of one interface.
    async fn get_interface_detail(&self, name: &str) -> Result<LinkDetail>;

    /// [`get_interface_detail`](Self::get_interface_detail) for each of
    /// `links`, in order. The outer error covers work shared by all of them;
    /// an inner one means that interface could not be read.
    async fn get_interface_details(
        &self,
        links: &[LinkSummary],
    ) -> Result<Vec<Result<LinkDetail>>> {
        let mut details = Vec::with_capacity(links.len());
        for link in links {
            details.push(self.get_interface_detail(&link.name).await);
        }
        Ok(details)
    }

    /// The routing policy database of every family.
    async fn list_route_rules(&self) -> Result<Vec<RouteRule>>;

    /// Create an interface (both ends for a veth pair). New interfaces are down.
    async fn create_interface(&self, spec: &CreateSpec) -> Result<()>;

    /// Apply `delta` in the order documented on [`InterfaceDelta`].
    async fn modify_interface(&self, name: &str, delta: &InterfaceDelta) -> Result<()>;

    /// Delete an interface. Deleting a veth end removes its peer.
    async fn delete_interface(&self, name: &str) -> Result<()>;
}
