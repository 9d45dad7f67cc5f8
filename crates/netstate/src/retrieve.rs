//! Building a current-state snapshot from a kernel provider.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::error::Result;
use crate::netlink::Error as PlatformError;
use crate::provider::{ARPHRD_ETHER, ARPHRD_LOOPBACK, KernelProvider, LinkDetail};
use crate::state::{
    BondConfig, BondMode, BridgeConfig, Family, Interface, InterfaceState, IpConfig, IpPrefix,
    LinkConfig, MacAddress, MacvlanConfig, MacvlanMode, NetworkState, Route, RouteRule, TunConfig,
    TunMode, VethConfig, VlanConfig, VrfConfig, VxlanConfig,
};

/// Narrows what [`retrieve_filtered`] reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveFilter {
    /// Report only this interface.
    pub iface: Option<String>,
    /// Report routes, plus route rules when no interface is selected.
    pub include_routes: bool,
}

impl Default for RetrieveFilter {
    fn default() -> Self {
        Self {
            iface: None,
            include_routes: true,
        }
    }
}

impl RetrieveFilter {
    pub fn iface(mut self, name: impl Into<String>) -> Self {
        self.iface = Some(name.into());
        self
    }

    pub fn without_routes(mut self) -> Self {
        self.include_routes = false;
        self
    }
}

/// Snapshot every interface, route and route rule visible to `provider`.
///
/// Fails when the interface list or a table shared by all interfaces cannot
/// be read. An interface whose details cannot be fetched (typically because
/// it vanished in between) is left out.
pub async fn retrieve<P: KernelProvider>(provider: &P) -> Result<NetworkState> {
    retrieve_filtered(provider, &RetrieveFilter::default()).await
}

/// [`retrieve`] narrowed by `filter`.
pub async fn retrieve_filtered<P: KernelProvider>(
    provider: &P,
    filter: &RetrieveFilter,
) -> Result<NetworkState> {
    let links = provider.list_interfaces().await?;
    let names: HashMap<u32, String> = links.iter().map(|l| (l.index, l.name.clone())).collect();

    let mut details = Vec::with_capacity(links.len());
    for (link, detail) in links.iter().zip(provider.get_interface_details(&links).await?) {
        match detail {
            Ok(detail) => details.push(detail),
            Err(e) => warn!(iface = %link.name, error = %e, "skipping interface"),
        }
    }

    let resolve = |index: u32| -> String {
        names
            .get(&index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    };

    let mut ports: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for detail in &details {
        if let Some(controller) = detail.controller {
            ports.entry(controller).or_default().push(detail.name.clone());
        }
    }
    for list in ports.values_mut() {
        list.sort();
    }

    let mut state = NetworkState::default();
    for detail in &details {
        if filter.iface.as_ref().is_some_and(|name| *name != detail.name) {
            continue;
        }
        state.ifaces.push(assemble(detail, &resolve, &ports));
        if filter.include_routes {
            state.routes.extend(routes(detail));
        }
    }

    if let Some(name) = &filter.iface
        && state.ifaces.is_empty()
    {
        return Err(PlatformError::InterfaceNotFound { name: name.clone() }.into());
    }
    if filter.include_routes && filter.iface.is_none() {
        state.route_rules = provider.list_route_rules().await?;
    }

    state.ifaces.sort_by(|a, b| a.name.cmp(&b.name));
    state.routes.sort_by_key(Route::sort_key);
    state.route_rules.sort_by_key(RouteRule::sort_key);

    debug!(
        ifaces = state.ifaces.len(),
        routes = state.routes.len(),
        route_rules = state.route_rules.len(),
        skipped = links.len() - details.len(),
        "retrieved network state"
    );
    Ok(state)
}

fn link_config(
    detail: &LinkDetail,
    resolve: &impl Fn(u32) -> String,
    ports: &BTreeMap<u32, Vec<String>>,
) -> LinkConfig {
    let own_ports = || Some(ports.get(&detail.index).cloned().unwrap_or_default());

    // An ifindex of another namespace must not be resolved against ours.
    let local_link = || match detail.link_netnsid {
        Some(_) => detail.link.map(|index| index.to_string()),
        None => detail.link.map(resolve),
    };

    match (detail.kind.as_deref(), detail.hw_type) {
        (Some("dummy"), _) => LinkConfig::Dummy,
        (Some("veth"), _) => LinkConfig::Veth(VethConfig {
            peer: local_link(),
            peer_netnsid: detail.link_netnsid,
        }),
        (Some("bridge"), _) => LinkConfig::Bridge(BridgeConfig { ports: own_ports() }),
        (Some("bond"), _) => LinkConfig::Bond(BondConfig {
            mode: detail.bond_mode.and_then(BondMode::from_kernel),
            ports: own_ports(),
        }),
        (Some("vlan"), _) => LinkConfig::Vlan(VlanConfig {
            base_iface: local_link(),
            vlan_id: detail.vlan_id,
        }),
        (Some("vrf"), _) => LinkConfig::Vrf(VrfConfig {
            table: detail.vrf_table,
            ports: own_ports(),
        }),
        (Some("vxlan"), _) => {
            let vxlan = detail.vxlan.clone().unwrap_or_default();
            LinkConfig::Vxlan(VxlanConfig {
                vni: vxlan.id,
                remote: vxlan.group,
                local: vxlan.local,
                base_iface: vxlan.link.map(resolve),
                dst_port: vxlan.port,
            })
        }
        (Some(kind @ ("macvlan" | "macvtap")), _) => {
            let config = MacvlanConfig {
                base_iface: local_link(),
                mode: detail.macvlan_mode.and_then(MacvlanMode::from_kernel),
            };
            if kind == "macvlan" {
                LinkConfig::Macvlan(config)
            } else {
                LinkConfig::Macvtap(config)
            }
        }
        (Some("tun"), _) => LinkConfig::Tun(TunConfig {
            mode: detail.tun_type.and_then(TunMode::from_kernel),
        }),
        (None, ARPHRD_LOOPBACK) => LinkConfig::Loopback,
        (None, ARPHRD_ETHER) => LinkConfig::Ethernet,
        _ => LinkConfig::Unknown,
    }
}

fn assemble(
    detail: &LinkDetail,
    resolve: &impl Fn(u32) -> String,
    ports: &BTreeMap<u32, Vec<String>>,
) -> Interface {
    let ip = |family: Family| {
        Some(IpConfig::new(
            detail
                .addresses
                .iter()
                .filter(|a| a.family() == family)
                .copied()
                .collect(),
        ))
    };

    Interface {
        name: detail.name.clone(),
        state: Some(if detail.admin_up {
            InterfaceState::Up
        } else {
            InterfaceState::Down
        }),
        link: Some(link_config(detail, resolve, ports)),
        index: Some(detail.index),
        mtu: detail.mtu,
        // Tunnels and the like carry short hardware addresses; only report MACs.
        mac_address: detail
            .mac
            .as_ref()
            .filter(|mac| mac.len() >= 6)
            .map(|mac| MacAddress::new(mac.clone())),
        controller: detail.controller.map(resolve),
        ipv4: ip(Family::Ipv4),
        ipv6: ip(Family::Ipv6),
    }
}

fn routes(detail: &LinkDetail) -> impl Iterator<Item = Route> + '_ {
    detail.routes.iter().filter_map(|r| {
        let dst = match IpPrefix::new(r.dst, r.prefix_len) {
            Ok(dst) => dst,
            Err(e) => {
                debug!(iface = %detail.name, error = %e, "ignoring route");
                return None;
            }
        };
        Some(Route {
            dst,
            oif: detail.name.clone(),
            via: r.gateway,
            metric: Some(r.metric),
            table: Some(r.table),
            absent: false,
        })
    })
}
