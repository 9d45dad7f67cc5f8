//! Kernel provider backed by rtnetlink.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use super::{
    ControllerChange, CreateKind, CreateSpec, InterfaceDelta, KernelProvider, LinkDetail,
    LinkSummary, RouteDetail,
};
use crate::netlink::addr::{self, AddressMessage};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::link::{self, LinkMessage, NewLink};
use crate::netlink::route::{self, RouteMessage, RouteRequest};
use crate::netlink::rule::{self, RuleMessage};
use crate::netlink::types::rt_table;
use crate::netlink::{Connection, Error, Result};
use crate::state::{
    Family, InterfaceState, IpAddress, IpPrefix, MAIN_TABLE, Route, RouteRule, RuleAction,
};

/// Talks to the kernel of one network namespace.
///
/// # Example
///
/// ```ignore
/// use netstate::provider::netlink::NetlinkProvider;
/// use netstate::retrieve::retrieve;
///
/// let provider = NetlinkProvider::in_namespace("/var/run/netns/test")?;
/// let state = retrieve(&provider).await?;
/// ```
pub struct NetlinkProvider {
    conn: Connection,
}

impl NetlinkProvider {
    /// Provider for the namespace of the calling thread.
    pub fn new() -> Result<Self> {
        Ok(Self {
            conn: Connection::new()?,
        })
    }

    /// Provider for the namespace bound at `path` (e.g. `/var/run/netns/NAME`).
    pub fn in_namespace<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            conn: Connection::new_in_namespace_path(path)?,
        })
    }

    async fn link(&self, name: &str) -> Result<LinkMessage> {
        self.conn
            .request_typed(link::get_link(name))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::InterfaceNotFound {
                        name: name.to_string(),
                    }
                } else {
                    e
                }
            })
    }

    /// One address dump and one route dump, grouped by ifindex.
    async fn tables(&self) -> Result<Tables> {
        let addresses: Vec<AddressMessage> = self.conn.dump_typed(addr::dump_addresses()).await?;
        let routes: Vec<RouteMessage> = self.conn.dump_typed(route::dump_routes()).await?;

        let mut tables = Tables::default();
        for a in &addresses {
            if let Some(address) = a.primary_address() {
                tables
                    .addresses
                    .entry(a.ifindex())
                    .or_default()
                    .push(IpAddress::new(address, a.prefix_len()));
            }
        }
        for r in routes
            .iter()
            .filter(|r| r.is_unicast() && r.table() != rt_table::LOCAL)
        {
            if let (Some(oif), Some(detail)) = (r.oif(), route_detail(r)) {
                tables.routes.entry(oif).or_default().push(detail);
            }
        }
        tracing::trace!(
            addresses = addresses.len(),
            routes = routes.len(),
            "dumped address and route tables"
        );
        Ok(tables)
    }

    async fn index(&self, name: &str) -> Result<u32> {
        Ok(self.link(name).await?.index())
    }

    async fn ack(&self, builder: MessageBuilder, operation: String) -> Result<()> {
        self.conn
            .request_ack(builder)
            .await
            .map_err(|e| e.with_context(operation))
    }

    async fn set_mac(&self, name: &str, current: &LinkMessage, mac: &[u8]) -> Result<()> {
        let index = current.index();
        let operation = format!("setting mac_address of {}", name);
        // Most drivers refuse address changes while the device is up.
        if current.is_up() {
            self.ack(link::set_admin_state(index, false), operation.clone())
                .await?;
            self.ack(link::set_address(index, mac), operation.clone())
                .await?;
            self.ack(link::set_admin_state(index, true), operation)
                .await
        } else {
            self.ack(link::set_address(index, mac), operation).await
        }
    }
}

fn route_request(route: &Route, oif: u32) -> RouteRequest {
    RouteRequest {
        destination: route.dst.address,
        prefix_len: route.dst.prefix_len,
        oif,
        gateway: route.via,
        metric: route.metric,
        table: route.table.unwrap_or(MAIN_TABLE),
    }
}

/// Addresses and routes keyed by ifindex.
#[derive(Debug, Default)]
struct Tables {
    addresses: HashMap<u32, Vec<IpAddress>>,
    routes: HashMap<u32, Vec<RouteDetail>>,
}

fn route_detail(msg: &RouteMessage) -> Option<RouteDetail> {
    Some(RouteDetail {
        dst: msg.destination()?,
        prefix_len: msg.dst_len(),
        gateway: msg.gateway(),
        metric: msg.priority().unwrap_or(0),
        table: msg.table(),
        protocol: msg.protocol(),
    })
}

/// Moves the interface's entries out of `tables`.
fn link_detail(msg: &LinkMessage, name: &str, tables: &mut Tables) -> LinkDetail {
    let index = msg.index();
    LinkDetail {
        index,
        name: msg.name().unwrap_or(name).to_string(),
        kind: msg.kind().map(str::to_string),
        hw_type: msg.hw_type(),
        admin_up: msg.is_up(),
        mtu: msg.mtu(),
        mac: msg.address().map(<[u8]>::to_vec),
        controller: msg.master(),
        link: msg.link(),
        link_netnsid: msg.link_netnsid(),
        vlan_id: msg.vlan_id(),
        bond_mode: msg.bond_mode(),
        vrf_table: msg.vrf_table(),
        macvlan_mode: msg.macvlan_mode(),
        tun_type: msg.tun_type(),
        vxlan: msg.vxlan().cloned(),
        addresses: tables.addresses.remove(&index).unwrap_or_default(),
        routes: tables.routes.remove(&index).unwrap_or_default(),
    }
}

fn route_rule(msg: &RuleMessage) -> Option<RouteRule> {
    let family = match i32::from(msg.family()) {
        libc::AF_INET => Family::Ipv4,
        libc::AF_INET6 => Family::Ipv6,
        _ => return None,
    };
    let Some(action) = RuleAction::from_kernel(msg.action()) else {
        tracing::debug!(priority = msg.priority(), action = msg.action(), "ignoring rule");
        return None;
    };
    let prefix = |p: Option<(IpAddr, u8)>| p.and_then(|(a, len)| IpPrefix::new(a, len).ok());

    Some(RouteRule {
        family,
        priority: msg.priority(),
        action,
        table: msg.table(),
        from: prefix(msg.source()),
        to: prefix(msg.destination()),
        iif: msg.iifname().map(str::to_string),
        oif: msg.oifname().map(str::to_string),
        fwmark: msg.fwmark(),
        fwmask: msg.fwmask(),
        goto: msg.goto(),
    })
}

impl KernelProvider for NetlinkProvider {
    async fn list_interfaces(&self) -> Result<Vec<LinkSummary>> {
        let links: Vec<LinkMessage> = self.conn.dump_typed(link::dump_links()).await?;
        Ok(links
            .into_iter()
            .filter_map(|l| {
                Some(LinkSummary {
                    index: l.index(),
                    name: l.name()?.to_string(),
                })
            })
            .collect())
    }

    async fn get_interface_detail(&self, name: &str) -> Result<LinkDetail> {
        let msg = self.link(name).await?;
        let mut tables = self.tables().await?;
        Ok(link_detail(&msg, name, &mut tables))
    }

    async fn get_interface_details(
        &self,
        links: &[LinkSummary],
    ) -> Result<Vec<Result<LinkDetail>>> {
        let mut tables = self.tables().await?;
        let mut details = Vec::with_capacity(links.len());
        for summary in links {
            let detail = self
                .link(&summary.name)
                .await
                .map(|msg| link_detail(&msg, &summary.name, &mut tables));
            details.push(detail);
        }
        Ok(details)
    }

    async fn list_route_rules(&self) -> Result<Vec<RouteRule>> {
        let rules: Vec<RuleMessage> = self.conn.dump_typed(rule::dump_rules()).await?;
        Ok(rules.iter().filter_map(route_rule).collect())
    }

    async fn create_interface(&self, spec: &CreateSpec) -> Result<()> {
        let new = match &spec.kind {
            CreateKind::Dummy => NewLink::Dummy,
            CreateKind::Bridge => NewLink::Bridge,
            CreateKind::Bond { mode } => NewLink::Bond {
                mode: mode.map(|m| m.as_kernel()),
            },
            CreateKind::Veth { peer } => NewLink::Veth { peer },
            CreateKind::Vlan {
                base_iface,
                vlan_id,
            } => NewLink::Vlan {
                lower: self.index(base_iface).await?,
                vlan_id: *vlan_id,
            },
        };
        tracing::debug!(iface = %spec.name, kind = new.kind(), "creating link");
        self.ack(link::create_link(&spec.name, new), format!("creating {}", spec.name))
            .await
    }

    async fn modify_interface(&self, name: &str, delta: &InterfaceDelta) -> Result<()> {
        let current = self.link(name).await?;
        let index = current.index();

        if let Some(mac) = &delta.mac_address {
            self.set_mac(name, &current, mac.octets()).await?;
        }

        match &delta.controller {
            Some(ControllerChange::Attach(controller)) => {
                let master = self.index(controller).await?;
                self.ack(
                    link::set_master(index, master),
                    format!("attaching {} to {}", name, controller),
                )
                .await?;
            }
            Some(ControllerChange::Detach) => {
                self.ack(link::set_master(index, 0), format!("detaching {}", name))
                    .await?;
            }
            None => {}
        }

        if let Some(mtu) = delta.mtu {
            self.ack(link::set_mtu(index, mtu), format!("setting mtu of {}", name))
                .await?;
        }

        match delta.state {
            Some(InterfaceState::Up) | Some(InterfaceState::Down) => {
                let up = delta.state == Some(InterfaceState::Up);
                self.ack(
                    link::set_admin_state(index, up),
                    format!("setting {} {}", name, if up { "up" } else { "down" }),
                )
                .await?;
            }
            Some(InterfaceState::Absent) => {
                return Err(Error::NotSupported(format!(
                    "state absent in a modification of {}",
                    name
                )));
            }
            None => {}
        }

        for a in &delta.addresses_to_remove {
            self.ack(
                addr::delete_address(index, a.address, a.prefix_len),
                format!("removing {} from {}", a, name),
            )
            .await?;
        }
        for a in &delta.addresses_to_add {
            self.ack(
                addr::add_address(index, a.address, a.prefix_len),
                format!("adding {} to {}", a, name),
            )
            .await?;
        }

        for r in &delta.routes_to_remove {
            self.ack(
                route::delete_route(&route_request(r, index)),
                format!("removing route {}", r),
            )
            .await?;
        }
        for r in &delta.routes_to_add {
            self.ack(
                route::add_route(&route_request(r, index)),
                format!("adding route {}", r),
            )
            .await?;
        }

        Ok(())
    }

    async fn delete_interface(&self, name: &str) -> Result<()> {
        let index = self.index(name).await?;
        self.ack(link::delete_link(index), format!("deleting {}", name))
            .await
    }
}
