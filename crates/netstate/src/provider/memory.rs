//! In-memory kernel model.
//!
//! Mimics the rtnetlink behaviour the engines depend on: ifindex allocation,
//! veth pairs that live and die together, stacked links removed with their
//! lower device, vlan MTUs bounded by their base, ports detached when their
//! controller goes away, and the errno values the kernel reports for
//! conflicting requests.
//!
//! ```
//! use netstate::provider::memory::MemoryProvider;
//!
//! let provider = MemoryProvider::with_loopback();
//! provider.add_ethernet("eth0");
//! assert_eq!(provider.names(), vec!["eth0", "lo"]);
//! ```

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    ARPHRD_ETHER, ARPHRD_LOOPBACK, ControllerChange, CreateKind, CreateSpec, InterfaceDelta,
    KernelProvider, LinkDetail, LinkSummary, RouteDetail, VxlanInfo,
};
use crate::netlink::route::DELETE_PROTOCOL;
use crate::netlink::types::rt_proto;
use crate::netlink::{Error, Result};
use crate::state::{
    InterfaceState, IpAddress, MAIN_TABLE, Route, RouteRule, VLAN_ID_RANGE, validate_name,
};

/// Provider operation, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    List,
    Detail,
    Create,
    Modify,
    Delete,
    Rules,
}

const DEFAULT_MTU: u32 = 1500;
const LOOPBACK_MTU: u32 = 65536;
const MIN_MTU: u32 = 68;
const MAX_MTU: u32 = 65535;
const IPV6_DEFAULT_METRIC: u32 = 1024;

#[derive(Debug, Clone)]
struct Link {
    name: String,
    kind: Option<String>,
    hw_type: u16,
    admin_up: bool,
    mtu: u32,
    mac: Vec<u8>,
    controller: Option<u32>,
    link: Option<u32>,
    link_netnsid: Option<i32>,
    vlan_id: Option<u16>,
    bond_mode: Option<u8>,
    vrf_table: Option<u32>,
    macvlan_mode: Option<u32>,
    tun_type: Option<u8>,
    vxlan: Option<VxlanInfo>,
    addresses: Vec<IpAddress>,
    routes: Vec<RouteDetail>,
}

impl Link {
    fn new(name: &str, kind: Option<&str>, mac: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.map(str::to_string),
            hw_type: ARPHRD_ETHER,
            admin_up: false,
            mtu: DEFAULT_MTU,
            mac,
            controller: None,
            link: None,
            link_netnsid: None,
            vlan_id: None,
            bond_mode: None,
            vrf_table: None,
            macvlan_mode: None,
            tun_type: None,
            vxlan: None,
            addresses: Vec::new(),
            routes: Vec::new(),
        }
    }

    fn from_detail(detail: LinkDetail) -> Self {
        Self {
            name: detail.name,
            kind: detail.kind,
            hw_type: detail.hw_type,
            admin_up: detail.admin_up,
            mtu: detail.mtu.unwrap_or(DEFAULT_MTU),
            mac: detail.mac.unwrap_or_default(),
            controller: detail.controller,
            link: detail.link,
            link_netnsid: detail.link_netnsid,
            vlan_id: detail.vlan_id,
            bond_mode: detail.bond_mode,
            vrf_table: detail.vrf_table,
            macvlan_mode: detail.macvlan_mode,
            tun_type: detail.tun_type,
            vxlan: detail.vxlan,
            addresses: detail.addresses,
            routes: detail.routes,
        }
    }

    fn is_controller(&self) -> bool {
        matches!(self.kind.as_deref(), Some("bridge" | "bond" | "vrf"))
    }

    /// Local ifindex of the device this link is stacked on.
    fn lower(&self) -> Option<u32> {
        match self.kind.as_deref() {
            Some("vlan" | "macvlan" | "macvtap") if self.link_netnsid.is_none() => self.link,
            Some("vxlan") => self.vxlan.as_ref().and_then(|v| v.link),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Namespace {
    links: BTreeMap<u32, Link>,
    next_index: u32,
    next_mac: u32,
    mutations: usize,
    failures: Vec<(MemoryOp, String, i32)>,
    rules: Vec<RouteRule>,
}

fn kernel_error(errno: i32, operation: impl Into<String>) -> Error {
    Error::from_errno_with_context(-errno, operation)
}

impl Namespace {
    fn check_failure(&self, op: MemoryOp, name: &str) -> Result<()> {
        match self
            .failures
            .iter()
            .find(|(o, n, _)| {
                *o == op && (matches!(op, MemoryOp::List | MemoryOp::Rules) || n == name)
            })
        {
            Some((_, _, errno)) => Err(kernel_error(*errno, format!("{:?} {}", op, name))),
            None => Ok(()),
        }
    }

    fn index_of(&self, name: &str) -> Option<u32> {
        self.links
            .iter()
            .find(|(_, link)| link.name == name)
            .map(|(index, _)| *index)
    }

    fn require(&self, name: &str, operation: &str) -> Result<u32> {
        self.index_of(name)
            .ok_or_else(|| kernel_error(libc::ENODEV, format!("{} {}", operation, name)))
    }

    fn allocate_mac(&mut self) -> Vec<u8> {
        self.next_mac += 1;
        let [_, a, b, c] = self.next_mac.to_be_bytes();
        vec![0x02, 0x00, 0x00, a, b, c]
    }

    fn insert(&mut self, link: Link) -> u32 {
        self.next_index += 1;
        let index = self.next_index;
        self.links.insert(index, link);
        index
    }

    fn create(&mut self, spec: &CreateSpec) -> Result<()> {
        let operation = format!("creating {}", spec.name);
        validate_name(&spec.name).map_err(|_| kernel_error(libc::EINVAL, &operation))?;
        if self.index_of(&spec.name).is_some() {
            return Err(kernel_error(libc::EEXIST, operation));
        }

        let kind = spec.kind.type_name();
        let mac = self.allocate_mac();
        let mut link = Link::new(&spec.name, Some(kind), mac);

        match &spec.kind {
            CreateKind::Dummy | CreateKind::Bridge => {
                self.insert(link);
            }
            CreateKind::Bond { mode } => {
                link.bond_mode = Some(mode.map_or(0, |m| m.as_kernel()));
                self.insert(link);
            }
            CreateKind::Veth { peer } => {
                validate_name(peer).map_err(|_| kernel_error(libc::EINVAL, &operation))?;
                if peer == &spec.name || self.index_of(peer).is_some() {
                    return Err(kernel_error(libc::EEXIST, operation));
                }
                let peer_mac = self.allocate_mac();
                let peer_index = self.insert(Link::new(peer, Some(kind), peer_mac));
                link.link = Some(peer_index);
                let index = self.insert(link);
                if let Some(peer_link) = self.links.get_mut(&peer_index) {
                    peer_link.link = Some(index);
                }
            }
            CreateKind::Vlan {
                base_iface,
                vlan_id,
            } => {
                let base = self.require(base_iface, "creating vlan on")?;
                if !VLAN_ID_RANGE.contains(vlan_id) {
                    return Err(kernel_error(libc::ERANGE, operation));
                }
                let taken = self
                    .links
                    .values()
                    .any(|l| l.link == Some(base) && l.vlan_id == Some(*vlan_id));
                if taken {
                    return Err(kernel_error(libc::EEXIST, operation));
                }
                let base_link = &self.links[&base];
                link.mtu = base_link.mtu;
                link.mac = base_link.mac.clone();
                link.link = Some(base);
                link.vlan_id = Some(*vlan_id);
                self.insert(link);
            }
        }
        Ok(())
    }

    fn modify(&mut self, name: &str, delta: &InterfaceDelta) -> Result<()> {
        let index = self.require(name, "modifying")?;

        if let Some(mac) = &delta.mac_address {
            let link = self.link_mut(index)?;
            if mac.octets().len() != link.mac.len() {
                return Err(kernel_error(libc::EINVAL, format!("setting address of {}", name)));
            }
            link.mac = mac.octets().to_vec();
        }

        match &delta.controller {
            Some(ControllerChange::Attach(controller)) => {
                let operation = format!("attaching {} to {}", name, controller);
                let target = self.require(controller, &operation)?;
                if target == index {
                    return Err(kernel_error(libc::ELOOP, operation));
                }
                if !self.links[&target].is_controller() {
                    return Err(kernel_error(libc::EOPNOTSUPP, operation));
                }
                self.link_mut(index)?.controller = Some(target);
            }
            Some(ControllerChange::Detach) => self.link_mut(index)?.controller = None,
            None => {}
        }

        if let Some(mtu) = delta.mtu {
            self.set_mtu(index, name, mtu)?;
        }

        match delta.state {
            Some(InterfaceState::Up) => self.link_mut(index)?.admin_up = true,
            Some(InterfaceState::Down) => self.link_mut(index)?.admin_up = false,
            Some(InterfaceState::Absent) => {
                return Err(kernel_error(libc::EINVAL, format!("setting state of {}", name)));
            }
            None => {}
        }

        let link = self.link_mut(index)?;
        for addr in &delta.addresses_to_remove {
            let position = link
                .addresses
                .iter()
                .position(|a| a == addr)
                .ok_or_else(|| kernel_error(libc::EADDRNOTAVAIL, format!("removing {} from {}", addr, name)))?;
            link.addresses.remove(position);
        }
        for addr in &delta.addresses_to_add {
            if link.addresses.contains(addr) {
                return Err(kernel_error(libc::EEXIST, format!("adding {} to {}", addr, name)));
            }
            link.addresses.push(*addr);
        }

        for route in &delta.routes_to_remove {
            let wanted = route_detail(route);
            let position = link
                .routes
                .iter()
                .position(|r| {
                    r.dst == wanted.dst
                        && r.prefix_len == wanted.prefix_len
                        && r.table == wanted.table
                        && (DELETE_PROTOCOL == rt_proto::UNSPEC || r.protocol == DELETE_PROTOCOL)
                        && (route.metric.is_none() || r.metric == wanted.metric)
                        && (route.via.is_none() || r.gateway == wanted.gateway)
                })
                .ok_or_else(|| kernel_error(libc::ESRCH, format!("removing route {}", route)))?;
            link.routes.remove(position);
        }
        for route in &delta.routes_to_add {
            let operation = format!("adding route {}", route);
            if !link.admin_up {
                return Err(kernel_error(libc::ENETDOWN, operation));
            }
            let detail = route_detail(route);
            let exists = link.routes.iter().any(|r| {
                r.dst == detail.dst
                    && r.prefix_len == detail.prefix_len
                    && r.table == detail.table
                    && r.metric == detail.metric
            });
            if exists {
                return Err(kernel_error(libc::EEXIST, operation));
            }
            link.routes.push(detail);
        }

        Ok(())
    }

    fn set_mtu(&mut self, index: u32, name: &str, mtu: u32) -> Result<()> {
        let operation = format!("setting mtu of {}", name);
        if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
            return Err(kernel_error(libc::EINVAL, operation));
        }

        let link = &self.links[&index];
        if let Some(lower) = link.lower().and_then(|l| self.links.get(&l)) {
            match link.kind.as_deref() {
                Some("vlan") if mtu > lower.mtu => {
                    return Err(kernel_error(libc::ERANGE, operation));
                }
                Some("macvlan" | "macvtap") if mtu > lower.mtu => {
                    return Err(kernel_error(libc::EINVAL, operation));
                }
                _ => {}
            }
        }

        self.link_mut(index)?.mtu = mtu;
        // Vlans above the new MTU shrink with their base.
        for vlan in self.links.values_mut() {
            if vlan.kind.as_deref() == Some("vlan")
                && vlan.link_netnsid.is_none()
                && vlan.link == Some(index)
                && vlan.mtu > mtu
            {
                vlan.mtu = mtu;
            }
        }
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<()> {
        let operation = format!("deleting {}", name);
        let index = self.require(name, &operation)?;
        let link = &self.links[&index];
        if link.kind.is_none() {
            return Err(kernel_error(libc::EOPNOTSUPP, operation));
        }

        let mut doomed = vec![index];
        // A peer in another namespace is not visible here.
        if link.kind.as_deref() == Some("veth") && link.link_netnsid.is_none() {
            doomed.extend(link.link);
        }
        // Stacked links go with their lower device, recursively.
        loop {
            let stacked: Vec<u32> = self
                .links
                .iter()
                .filter(|(i, l)| {
                    !doomed.contains(i) && l.lower().is_some_and(|b| doomed.contains(&b))
                })
                .map(|(i, _)| *i)
                .collect();
            if stacked.is_empty() {
                break;
            }
            doomed.extend(stacked);
        }

        for index in &doomed {
            self.links.remove(index);
        }
        for link in self.links.values_mut() {
            if link.controller.is_some_and(|c| doomed.contains(&c)) {
                link.controller = None;
            }
        }
        Ok(())
    }

    fn link_mut(&mut self, index: u32) -> Result<&mut Link> {
        self.links
            .get_mut(&index)
            .ok_or_else(|| Error::InvalidMessage(format!("ifindex {} vanished", index)))
    }

    fn detail(&self, index: u32, link: &Link) -> LinkDetail {
        LinkDetail {
            index,
            name: link.name.clone(),
            kind: link.kind.clone(),
            hw_type: link.hw_type,
            admin_up: link.admin_up,
            mtu: Some(link.mtu),
            mac: Some(link.mac.clone()),
            controller: link.controller,
            link: link.link,
            link_netnsid: link.link_netnsid,
            vlan_id: link.vlan_id,
            bond_mode: link.bond_mode,
            vrf_table: link.vrf_table,
            macvlan_mode: link.macvlan_mode,
            tun_type: link.tun_type,
            vxlan: link.vxlan.clone(),
            addresses: link.addresses.clone(),
            routes: link.routes.clone(),
        }
    }
}

fn route_detail(route: &Route) -> RouteDetail {
    let default_metric = match route.dst.address {
        IpAddr::V4(_) => 0,
        IpAddr::V6(_) => IPV6_DEFAULT_METRIC,
    };
    RouteDetail {
        dst: route.dst.address,
        prefix_len: route.dst.prefix_len,
        gateway: route.via,
        metric: route.metric.unwrap_or(default_metric),
        table: route.table.unwrap_or(MAIN_TABLE),
        protocol: rt_proto::STATIC,
    }
}

/// A network namespace held in memory.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    ns: Mutex<Namespace>,
}

impl MemoryProvider {
    /// An empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// A namespace holding an up `lo` with its usual addresses.
    pub fn with_loopback() -> Self {
        let provider = Self::new();
        {
            let mut ns = provider.lock();
            let mut lo = Link::new("lo", None, vec![0; 6]);
            lo.hw_type = ARPHRD_LOOPBACK;
            lo.admin_up = true;
            lo.mtu = LOOPBACK_MTU;
            lo.addresses = vec![
                IpAddress::new(IpAddr::from([127, 0, 0, 1]), 8),
                IpAddress::new(IpAddr::from([0, 0, 0, 0, 0, 0, 0, 1u16]), 128),
            ];
            ns.insert(lo);
        }
        provider
    }

    /// Add a physical ethernet device (down, MTU 1500). Returns its ifindex.
    pub fn add_ethernet(&self, name: &str) -> u32 {
        let mut ns = self.lock();
        let mac = ns.allocate_mac();
        ns.insert(Link::new(name, None, mac))
    }

    /// Add a link as retrieval would report it, e.g. a kind this provider
    /// cannot create. `index` is ignored; the new ifindex is returned.
    pub fn add_link(&self, detail: LinkDetail) -> u32 {
        self.lock().insert(Link::from_detail(detail))
    }

    /// Install a route the way the kernel or a routing daemon would, with
    /// its own `protocol`.
    pub fn add_route(&self, name: &str, route: RouteDetail) -> Result<()> {
        let mut ns = self.lock();
        let index = ns.require(name, "adding route to")?;
        ns.link_mut(index)?.routes.push(route);
        Ok(())
    }

    pub fn add_route_rule(&self, rule: RouteRule) {
        self.lock().rules.push(rule);
    }

    /// Make every later `op` on `name` fail with `errno`. `name` is ignored
    /// for [`MemoryOp::List`] and [`MemoryOp::Rules`].
    pub fn fail_on(&self, op: MemoryOp, name: &str, errno: i32) {
        self.lock().failures.push((op, name.to_string(), errno));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Number of create/modify/delete calls received so far.
    pub fn mutation_count(&self) -> usize {
        self.lock().mutations
    }

    /// Interface names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().links.values().map(|l| l.name.clone()).collect();
        names.sort();
        names
    }

    /// Remove a link behind the engine's back, as a concurrent actor would.
    pub fn remove_externally(&self, name: &str) {
        let mut ns = self.lock();
        if let Some(index) = ns.index_of(name) {
            ns.links.remove(&index);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Namespace> {
        self.ns.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KernelProvider for MemoryProvider {
    async fn list_interfaces(&self) -> Result<Vec<LinkSummary>> {
        let ns = self.lock();
        ns.check_failure(MemoryOp::List, "")?;
        Ok(ns
            .links
            .iter()
            .map(|(index, link)| LinkSummary {
                index: *index,
                name: link.name.clone(),
            })
            .collect())
    }

    async fn get_interface_detail(&self, name: &str) -> Result<LinkDetail> {
        let ns = self.lock();
        ns.check_failure(MemoryOp::Detail, name)?;
        let index = ns.index_of(name).ok_or_else(|| Error::InterfaceNotFound {
            name: name.to_string(),
        })?;
        Ok(ns.detail(index, &ns.links[&index]))
    }

    async fn list_route_rules(&self) -> Result<Vec<RouteRule>> {
        let ns = self.lock();
        ns.check_failure(MemoryOp::Rules, "")?;
        Ok(ns.rules.clone())
    }

    async fn create_interface(&self, spec: &CreateSpec) -> Result<()> {
        let mut ns = self.lock();
        ns.mutations += 1;
        ns.check_failure(MemoryOp::Create, &spec.name)?;
        ns.create(spec)
    }

    async fn modify_interface(&self, name: &str, delta: &InterfaceDelta) -> Result<()> {
        let mut ns = self.lock();
        ns.mutations += 1;
        ns.check_failure(MemoryOp::Modify, name)?;
        ns.modify(name, delta)
    }

    async fn delete_interface(&self, name: &str) -> Result<()> {
        let mut ns = self.lock();
        ns.mutations += 1;
        ns.check_failure(MemoryOp::Delete, name)?;
        ns.delete(name)
    }
}
