//! Diffing desired against current state into an ordered operation plan.
//!
//! Every check that can reject a desired state happens here, so a plan that
//! computes successfully never fails for schema reasons halfway through.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use tracing::{debug, warn};

use super::delta::{ControllerChange, CreateKind, CreateSpec, InterfaceDelta};
use crate::error::{Error, Result};
use crate::state::{
    BondConfig, Family, Interface, InterfaceState, InterfaceType, IpAddress, LinkConfig,
    NetworkState, Route, VethConfig, VlanConfig,
};

/// Longest chain of stacked links considered when ordering modifications.
const MAX_STACK_DEPTH: usize = 8;

/// One step of a [`Plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create(CreateSpec),
    Modify {
        name: String,
        delta: InterfaceDelta,
    },
    /// Delete `name`. `also_removes` is a veth peer the kernel deletes with it.
    Delete {
        name: String,
        also_removes: Option<String>,
    },
}

impl Operation {
    /// Interface the operation is issued against.
    pub fn name(&self) -> &str {
        match self {
            Self::Create(spec) => &spec.name,
            Self::Modify { name, .. } | Self::Delete { name, .. } => name,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(spec) => write!(f, "{}", spec),
            Self::Modify { name, delta } => {
                write!(f, "modify {}: {}", name, delta.summary().join(", "))
            }
            Self::Delete {
                name,
                also_removes: Some(peer),
            } => write!(f, "delete {} (and its peer {})", name, peer),
            Self::Delete { name, .. } => write!(f, "delete {}", name),
        }
    }
}

/// Ordered operations converging current state to desired state.
///
/// Deletes come first (stacked links before other links), then creates (vlans
/// after their base), then modifications (controllers before their ports,
/// lower devices before the links stacked on them).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub operations: Vec<Operation>,
    created: BTreeSet<String>,
    removed: BTreeSet<String>,
}

impl Plan {
    /// Compute the plan taking `current` to `desired`.
    ///
    /// Fails with a schema error, before anything is executed, when the
    /// desired state cannot be reached from the current one.
    pub fn compute(desired: &NetworkState, current: &NetworkState) -> Result<Self> {
        if !desired.route_rules.is_empty() {
            warn!(
                count = desired.route_rules.len(),
                "route_rules are reported only, leaving them unchanged"
            );
        }
        let mut planner = Planner::new(desired, current);
        planner.plan_deletes()?;
        planner.plan_creates()?;
        planner.plan_modifies()?;
        Ok(planner.finish())
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// One line per operation.
    pub fn summary(&self) -> Vec<String> {
        self.operations.iter().map(ToString::to_string).collect()
    }

    /// Interfaces the plan creates, including veth peers.
    pub fn created(&self) -> &BTreeSet<String> {
        &self.created
    }

    /// Interfaces gone once the plan ran, including those the kernel removes
    /// along with a deleted link.
    pub fn removed(&self) -> &BTreeSet<String> {
        &self.removed
    }

    /// Every interface the plan operates on or removes.
    pub fn touched(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .operations
            .iter()
            .map(|op| op.name().to_string())
            .collect();
        names.extend(self.created.iter().cloned());
        names.extend(self.removed.iter().cloned());
        names
    }
}

struct Planner<'a> {
    desired: &'a NetworkState,
    current: &'a NetworkState,
    current_by_name: HashMap<&'a str, &'a Interface>,
    desired_by_name: HashMap<&'a str, &'a Interface>,
    deletes: Vec<Operation>,
    /// Removed interface → why.
    removed: BTreeMap<String, String>,
    creates: Vec<CreateSpec>,
    created: BTreeMap<String, InterfaceType>,
    modifies: Vec<(String, InterfaceDelta)>,
}

/// Entries that are not deletion directives.
fn kept(state: &NetworkState) -> impl Iterator<Item = &Interface> {
    state.ifaces.iter().filter(|i| !i.is_absent())
}

fn schema(name: &str, message: impl fmt::Display) -> Error {
    Error::schema(format!("{}: {}", name, message))
}

impl<'a> Planner<'a> {
    fn new(desired: &'a NetworkState, current: &'a NetworkState) -> Self {
        Self {
            desired,
            current,
            current_by_name: current.ifaces.iter().map(|i| (i.name.as_str(), i)).collect(),
            desired_by_name: desired.ifaces.iter().map(|i| (i.name.as_str(), i)).collect(),
            deletes: Vec::new(),
            removed: BTreeMap::new(),
            creates: Vec::new(),
            created: BTreeMap::new(),
            modifies: Vec::new(),
        }
    }

    fn exists_after(&self, name: &str) -> bool {
        self.created.contains_key(name)
            || (self.current_by_name.contains_key(name) && !self.removed.contains_key(name))
    }

    fn type_after(&self, name: &str) -> Option<InterfaceType> {
        self.created
            .get(name)
            .copied()
            .or_else(|| self.current_by_name.get(name).and_then(|i| i.iface_type()))
    }

    /// Will `name` be created, either by its own entry or as a veth peer?
    fn will_create(&self, name: &str) -> bool {
        if self.current_by_name.contains_key(name) && !self.removed.contains_key(name) {
            return false;
        }
        kept(self.desired).any(|i| {
            (i.name == name || i.link.as_ref().and_then(LinkConfig::veth_peer) == Some(name))
                && !self.current_by_name.contains_key(i.name.as_str())
        })
    }

    fn plan_deletes(&mut self) -> Result<()> {
        let mut stacked_ops = Vec::new();
        let mut others = Vec::new();

        for iface in self.desired.ifaces.iter().filter(|i| i.is_absent()) {
            let Some(current) = self.current_by_name.get(iface.name.as_str()) else {
                debug!(iface = %iface.name, "already absent");
                continue;
            };
            if self.removed.contains_key(&iface.name) {
                debug!(iface = %iface.name, "removed together with its veth peer");
                continue;
            }

            let peer = current
                .link
                .as_ref()
                .and_then(LinkConfig::veth_peer)
                .filter(|p| self.current_by_name.contains_key(p))
                .map(str::to_string);

            self.removed.insert(iface.name.clone(), "deleted".into());
            if let Some(peer) = &peer {
                self.removed
                    .insert(peer.clone(), format!("the veth peer of {}", iface.name));
            }

            let op = Operation::Delete {
                name: iface.name.clone(),
                also_removes: peer,
            };
            if current.link.as_ref().and_then(LinkConfig::lower_iface).is_some() {
                stacked_ops.push(op);
            } else {
                others.push(op);
            }
        }

        // Vlans, macvlans and vxlans go away with their lower device,
        // recursively.
        loop {
            let stacked: Vec<(String, String)> = self
                .current
                .ifaces
                .iter()
                .filter(|i| !self.removed.contains_key(&i.name))
                .filter_map(|i| {
                    let link = i.link.as_ref()?;
                    let lower = link.lower_iface().filter(|l| self.removed.contains_key(*l))?;
                    Some((i.name.clone(), format!("a {} on {}", link.iface_type(), lower)))
                })
                .collect();
            if stacked.is_empty() {
                break;
            }
            self.removed.extend(stacked);
        }

        for iface in kept(self.desired) {
            if let Some(reason) = self.removed.get(&iface.name) {
                return Err(schema(
                    &iface.name,
                    format!("is removed as {} but is not marked absent", reason),
                ));
            }
        }

        self.deletes = stacked_ops;
        self.deletes.append(&mut others);
        Ok(())
    }

    fn plan_creates(&mut self) -> Result<()> {
        let mut vlans: Vec<CreateSpec> = Vec::new();

        for iface in kept(self.desired) {
            let name = iface.name.as_str();
            if self.current_by_name.contains_key(name) || self.created.contains_key(name) {
                continue;
            }
            let Some(link) = &iface.link else {
                return Err(schema(name, "type is required to create an interface"));
            };

            let kind = match link {
                LinkConfig::Dummy => CreateKind::Dummy,
                LinkConfig::Bridge(_) => CreateKind::Bridge,
                LinkConfig::Bond(BondConfig { mode, .. }) => CreateKind::Bond { mode: *mode },
                LinkConfig::Veth(VethConfig {
                    peer_netnsid: Some(_),
                    ..
                }) => {
                    return Err(schema(
                        name,
                        "cannot create a veth whose peer is in another namespace",
                    ));
                }
                LinkConfig::Veth(VethConfig { peer: None, .. }) => {
                    let declared_as_peer = kept(self.desired).any(|other| {
                        other.name != name
                            && other.link.as_ref().and_then(LinkConfig::veth_peer) == Some(name)
                            && !self.current_by_name.contains_key(other.name.as_str())
                    });
                    if declared_as_peer {
                        continue;
                    }
                    return Err(schema(name, "veth.peer is required to create a veth"));
                }
                LinkConfig::Veth(VethConfig {
                    peer: Some(peer), ..
                }) => {
                    if self.current_by_name.contains_key(peer.as_str())
                        && !self.removed.contains_key(peer)
                    {
                        return Err(schema(
                            name,
                            format!("veth peer name {} is already in use", peer),
                        ));
                    }
                    if self.desired_by_name.get(peer.as_str()).is_some_and(|p| p.is_absent()) {
                        return Err(schema(
                            name,
                            format!("veth peer {} is marked absent", peer),
                        ));
                    }
                    self.created.insert(peer.clone(), InterfaceType::Veth);
                    CreateKind::Veth { peer: peer.clone() }
                }
                LinkConfig::Vlan(VlanConfig {
                    base_iface: Some(base),
                    vlan_id: Some(vlan_id),
                }) => {
                    let base_available = (self.current_by_name.contains_key(base.as_str())
                        && !self.removed.contains_key(base))
                        || self.will_create(base);
                    if !base_available {
                        return Err(schema(
                            name,
                            format!("vlan base interface {} does not exist", base),
                        ));
                    }
                    self.created.insert(name.to_string(), InterfaceType::Vlan);
                    vlans.push(CreateSpec {
                        name: name.to_string(),
                        kind: CreateKind::Vlan {
                            base_iface: base.clone(),
                            vlan_id: *vlan_id,
                        },
                    });
                    continue;
                }
                LinkConfig::Vlan(_) => {
                    return Err(schema(
                        name,
                        "vlan.base_iface and vlan.vlan_id are required to create a vlan",
                    ));
                }
                LinkConfig::Ethernet
                | LinkConfig::Loopback
                | LinkConfig::Vrf(_)
                | LinkConfig::Vxlan(_)
                | LinkConfig::Macvlan(_)
                | LinkConfig::Macvtap(_)
                | LinkConfig::Tun(_)
                | LinkConfig::Unknown => {
                    return Err(schema(
                        name,
                        format!("interfaces of type {} cannot be created", link.iface_type()),
                    ));
                }
            };

            self.created.insert(name.to_string(), link.iface_type());
            self.creates.push(CreateSpec {
                name: name.to_string(),
                kind,
            });
        }

        // A vlan can sit on another vlan created in the same plan.
        while !vlans.is_empty() {
            let pending: BTreeSet<String> = vlans.iter().map(|v| v.name.clone()).collect();
            let ready = vlans.iter().position(|v| match &v.kind {
                CreateKind::Vlan { base_iface, .. } => !pending.contains(base_iface),
                _ => true,
            });
            let Some(ready) = ready else {
                return Err(Error::schema(format!(
                    "vlans {} are stacked on each other in a cycle",
                    pending.into_iter().collect::<Vec<_>>().join(", ")
                )));
            };
            self.creates.push(vlans.remove(ready));
        }

        Ok(())
    }

    /// Desired controller per port, from `controller` keys and `ports` lists.
    fn controller_targets(&self) -> Result<BTreeMap<String, Option<String>>> {
        let mut targets: BTreeMap<String, Option<String>> = BTreeMap::new();

        for iface in kept(self.desired) {
            if let Some(wanted) = iface.desired_controller() {
                targets.insert(iface.name.clone(), wanted.map(str::to_string));
            }
        }

        for controller in kept(self.desired) {
            let Some(ports) = controller.link.as_ref().and_then(LinkConfig::ports) else {
                continue;
            };
            for port in ports {
                if !self.exists_after(port) {
                    return Err(schema(
                        &controller.name,
                        format!("port {} does not exist", port),
                    ));
                }
                targets.insert(port.clone(), Some(controller.name.clone()));
            }
            for current in &self.current.ifaces {
                if current.controller.as_deref() == Some(controller.name.as_str())
                    && !ports.contains(&current.name)
                    && !self.removed.contains_key(&current.name)
                {
                    targets.entry(current.name.clone()).or_insert(None);
                }
            }
        }

        for (port, target) in &targets {
            let Some(target) = target else { continue };
            if !self.exists_after(target) {
                return Err(schema(
                    port,
                    format!("controller {} does not exist", target),
                ));
            }
            if !self.type_after(target).is_some_and(InterfaceType::is_controller) {
                return Err(schema(
                    port,
                    format!("controller {} cannot take ports", target),
                ));
            }
        }

        Ok(targets)
    }

    fn plan_modifies(&mut self) -> Result<()> {
        let targets = self.controller_targets()?;

        let mut names: BTreeSet<&str> = kept(self.desired).map(|i| i.name.as_str()).collect();
        names.extend(self.created.keys().map(String::as_str));
        names.extend(targets.keys().map(String::as_str));
        for route in &self.desired.routes {
            if self.exists_after(&route.oif) {
                names.insert(&route.oif);
            } else if !route.absent {
                return Err(schema(
                    &route.oif,
                    format!("route {} is on an interface that will not exist", route),
                ));
            }
        }

        let mut modifies: Vec<(String, InterfaceDelta)> = Vec::new();
        for name in names {
            let is_new = self.created.contains_key(name);
            let fresh;
            let base = if is_new {
                fresh = Interface::new(name).with_state(InterfaceState::Down);
                &fresh
            } else {
                match self.current_by_name.get(name) {
                    Some(current) => *current,
                    None => continue,
                }
            };

            let desired = self.desired_by_name.get(name).copied();
            if let Some(desired) = desired
                && !is_new
            {
                check_immutable(desired, base)?;
            }

            let mut delta = InterfaceDelta::default();
            if let Some(desired) = desired {
                self.diff_link(desired, base, is_new, &mut delta);
            }
            if let Some(target) = targets.get(name) {
                let current = base
                    .controller
                    .as_deref()
                    .filter(|c| !self.removed.contains_key(*c));
                if target.as_deref() != current {
                    delta.controller = Some(match target {
                        Some(controller) => ControllerChange::Attach(controller.clone()),
                        None => ControllerChange::Detach,
                    });
                }
            }
            let current_routes: Vec<&Route> = if is_new {
                Vec::new()
            } else {
                self.current.routes_of(name).collect()
            };
            diff_routes(
                self.desired.routes_of(name),
                &current_routes,
                &mut delta,
            );

            if delta.is_empty() {
                debug!(iface = %name, "already converged");
            } else {
                modifies.push((name.to_string(), delta));
            }
        }

        // Controllers before their ports, then lower devices before the
        // links stacked on them: a vlan cannot exceed its base MTU.
        modifies.sort_by_cached_key(|(name, _)| {
            let is_controller = self.type_after(name).is_some_and(InterfaceType::is_controller);
            (!is_controller, self.stack_depth(name))
        });
        self.modifies = modifies;
        Ok(())
    }

    /// Device `name` is stacked on once the plan ran.
    fn lower_after(&self, name: &str) -> Option<&'a str> {
        let desired = self.desired_by_name.get(name).copied().and_then(|i| i.link.as_ref());
        let current = self.current_by_name.get(name).copied().and_then(|i| i.link.as_ref());
        desired
            .and_then(LinkConfig::lower_iface)
            .or_else(|| current.and_then(LinkConfig::lower_iface))
    }

    /// Number of lower devices below `name`.
    fn stack_depth(&self, name: &str) -> usize {
        let mut depth = 0;
        let mut next = self.lower_after(name);
        while let Some(lower) = next {
            if depth == MAX_STACK_DEPTH {
                break;
            }
            depth += 1;
            next = self.lower_after(lower);
        }
        depth
    }

    fn diff_link(
        &self,
        desired: &Interface,
        base: &Interface,
        is_new: bool,
        delta: &mut InterfaceDelta,
    ) {
        let state = desired
            .state
            .or(is_new.then_some(InterfaceState::Up))
            .filter(|s| *s != InterfaceState::Absent);
        if state.is_some() && state != base.state {
            delta.state = state;
        }
        if desired.mtu.is_some() && desired.mtu != base.mtu {
            delta.mtu = desired.mtu;
        }
        if desired.mac_address.is_some() && desired.mac_address != base.mac_address {
            delta.mac_address = desired.mac_address.clone();
        }

        for family in [Family::Ipv4, Family::Ipv6] {
            let Some(wanted) = desired.ip(family) else {
                continue;
            };
            let wanted: BTreeSet<&IpAddress> = wanted.managed().collect();
            let have: BTreeSet<&IpAddress> = base
                .ip(family)
                .map(|c| c.managed().collect())
                .unwrap_or_default();
            delta
                .addresses_to_remove
                .extend(have.difference(&wanted).copied().copied());
            delta
                .addresses_to_add
                .extend(wanted.difference(&have).copied().copied());
        }
    }

    fn finish(self) -> Plan {
        let mut operations = self.deletes;
        operations.extend(self.creates.into_iter().map(Operation::Create));
        operations.extend(
            self.modifies
                .into_iter()
                .map(|(name, delta)| Operation::Modify { name, delta }),
        );

        Plan {
            operations,
            created: self.created.into_keys().collect(),
            removed: self.removed.into_keys().collect(),
        }
    }
}

/// Reject changes the kernel can only make by recreating the interface.
fn check_immutable(desired: &Interface, current: &Interface) -> Result<()> {
    let name = desired.name.as_str();
    let (Some(wanted), Some(have)) = (&desired.link, &current.link) else {
        return Ok(());
    };
    if wanted.iface_type() != have.iface_type() {
        return Err(schema(
            name,
            format!(
                "cannot change type from {} to {}",
                have.iface_type(),
                wanted.iface_type()
            ),
        ));
    }

    match (wanted, have) {
        (LinkConfig::Veth(w), LinkConfig::Veth(h)) => {
            if let (Some(w), Some(h)) = (&w.peer, &h.peer)
                && w != h
            {
                return Err(schema(
                    name,
                    format!("cannot change veth peer from {} to {}", h, w),
                ));
            }
            if w.peer.is_some() && w.peer_netnsid != h.peer_netnsid {
                return Err(schema(name, "cannot move the veth peer to another namespace"));
            }
            Ok(())
        }
        (LinkConfig::Vlan(w), LinkConfig::Vlan(h)) => {
            if w.base_iface.is_some() && w.base_iface != h.base_iface {
                return Err(schema(name, "cannot change vlan.base_iface of an existing vlan"));
            }
            if w.vlan_id.is_some() && w.vlan_id != h.vlan_id {
                return Err(schema(name, "cannot change vlan.vlan_id of an existing vlan"));
            }
            Ok(())
        }
        (
            LinkConfig::Bond(BondConfig { mode: Some(w), .. }),
            LinkConfig::Bond(BondConfig { mode: Some(h), .. }),
        ) if w != h => Err(schema(
            name,
            format!("cannot change bond mode from {} to {}", h, w),
        )),
        (LinkConfig::Vrf(w), LinkConfig::Vrf(h)) => {
            unchanged(name, "vrf.table", &w.table, &h.table)
        }
        (LinkConfig::Vxlan(w), LinkConfig::Vxlan(h)) => {
            unchanged(name, "vxlan.vni", &w.vni, &h.vni)?;
            unchanged(name, "vxlan.remote", &w.remote, &h.remote)?;
            unchanged(name, "vxlan.local", &w.local, &h.local)?;
            unchanged(name, "vxlan.base_iface", &w.base_iface, &h.base_iface)?;
            unchanged(name, "vxlan.dst_port", &w.dst_port, &h.dst_port)
        }
        (LinkConfig::Macvlan(w), LinkConfig::Macvlan(h))
        | (LinkConfig::Macvtap(w), LinkConfig::Macvtap(h)) => {
            let kind = wanted.iface_type();
            unchanged(name, &format!("{}.base_iface", kind), &w.base_iface, &h.base_iface)?;
            unchanged(name, &format!("{}.mode", kind), &w.mode, &h.mode)
        }
        (LinkConfig::Tun(w), LinkConfig::Tun(h)) => {
            unchanged(name, "tun.mode", &w.mode, &h.mode)
        }
        _ => Ok(()),
    }
}

/// A stated field must match the current value.
fn unchanged<T: PartialEq>(
    name: &str,
    field: &str,
    wanted: &Option<T>,
    have: &Option<T>,
) -> Result<()> {
    if wanted.is_some() && wanted != have {
        return Err(schema(
            name,
            format!("cannot change {} of an existing interface", field),
        ));
    }
    Ok(())
}

/// Desired routes add what no current route matches; `absent` ones remove
/// every match.
fn diff_routes<'a>(
    desired: impl Iterator<Item = &'a Route>,
    current: &[&Route],
    delta: &mut InterfaceDelta,
) {
    for route in desired {
        if route.absent {
            for matched in current.iter().filter(|c| route.matches(c)) {
                if !delta.routes_to_remove.contains(matched) {
                    delta.routes_to_remove.push((*matched).clone());
                }
            }
        } else if !current.iter().any(|c| route.matches(c)) && !delta.routes_to_add.contains(route)
        {
            delta.routes_to_add.push(route.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn state(doc: &str) -> NetworkState {
        NetworkState::parse(doc).unwrap()
    }

    fn current() -> NetworkState {
        state(
            r#"{
                "ifaces": [
                    {"name": "lo", "type": "loopback", "state": "up", "mtu": 65536,
                     "ipv4": {"addresses": [{"address": "127.0.0.1", "prefix_len": 8}]}},
                    {"name": "eth0", "type": "ethernet", "state": "up", "mtu": 1500,
                     "mac_address": "02:00:00:00:00:01",
                     "ipv4": {"addresses": [{"address": "192.0.2.1", "prefix_len": 24}]},
                     "ipv6": {"addresses": [{"address": "fe80::1", "prefix_len": 64}]}},
                    {"name": "eth0.10", "type": "vlan", "state": "up",
                     "vlan": {"base_iface": "eth0", "vlan_id": 10}},
                    {"name": "br0", "type": "bridge", "state": "up", "bridge": {"ports": ["eth1"]}},
                    {"name": "eth1", "type": "ethernet", "state": "up", "controller": "br0"},
                    {"name": "veth1", "type": "veth", "state": "up", "veth": {"peer": "veth1.ep"}},
                    {"name": "veth1.ep", "type": "veth", "state": "down", "veth": {"peer": "veth1"}},
                    {"name": "dummy0", "type": "dummy", "state": "down"}
                ],
                "routes": [
                    {"dst": "10.0.0.0/8", "oif": "eth0", "via": "192.0.2.254", "metric": 0, "table": 254},
                    {"dst": "10.0.0.0/8", "oif": "eth0", "via": "192.0.2.253", "metric": 100, "table": 254}
                ]
            }"#,
        )
    }

    fn compute(desired: &str) -> Result<Plan> {
        Plan::compute(&state(desired), &current())
    }

    fn schema_error(desired: &str) -> String {
        let err = compute(desired).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaError, "{}", err);
        err.to_string()
    }

    #[test]
    fn test_create_veth_pair_is_one_step() {
        let plan = compute(
            r#"{"ifaces": [
                {"name": "veth2", "type": "veth", "veth": {"peer": "veth2.ep"}},
                {"name": "veth2.ep", "type": "veth"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            plan.summary(),
            vec![
                "create veth veth2 (peer veth2.ep)",
                "modify veth2: set state up",
                "modify veth2.ep: set state up",
            ]
        );
        assert!(plan.created().contains("veth2.ep"));
    }

    #[test]
    fn test_delete_veth_pair_collapses() {
        let plan = compute(
            r#"{"ifaces": [
                {"name": "veth1", "state": "absent"},
                {"name": "veth1.ep", "state": "absent"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(plan.summary(), vec!["delete veth1 (and its peer veth1.ep)"]);
        assert!(plan.removed().contains("veth1.ep"));
    }

    #[test]
    fn test_absent_missing_is_noop() {
        assert!(compute(r#"{"ifaces": [{"name": "ghost0", "state": "absent"}]}"#).unwrap().is_empty());
    }

    #[test]
    fn test_partial_update_touches_only_named_fields() {
        let plan = compute(r#"{"ifaces": [{"name": "eth0", "mtu": 1400}]}"#).unwrap();
        assert_eq!(plan.summary(), vec!["modify eth0: set mtu 1400"]);
    }

    #[test]
    fn test_converged_entry_is_noop() {
        let plan = compute(
            r#"{"ifaces": [{"name": "eth0", "type": "ethernet", "state": "up", "mtu": 1500,
                "mac_address": "02:00:00:00:00:01",
                "ipv4": {"addresses": [{"address": "192.0.2.1", "prefix_len": 24}]}}]}"#,
        )
        .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_address_set_replacement_ignores_link_local() {
        let plan = compute(
            r#"{"ifaces": [{"name": "eth0",
                "ipv4": {"addresses": [{"address": "192.0.2.2", "prefix_len": 24}]},
                "ipv6": {"addresses": []}}]}"#,
        )
        .unwrap();
        assert_eq!(
            plan.summary(),
            vec!["modify eth0: remove address 192.0.2.1/24, add address 192.0.2.2/24"]
        );
    }

    #[test]
    fn test_ordering() {
        let plan = compute(
            r#"{"ifaces": [
                {"name": "dummy0", "state": "absent"},
                {"name": "eth0.10", "state": "absent"},
                {"name": "br1.5", "type": "vlan", "vlan": {"base_iface": "br1", "vlan_id": 5}},
                {"name": "br1", "type": "bridge", "state": "up"},
                {"name": "dummy1", "type": "dummy", "controller": "br1"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            plan.summary(),
            vec![
                "delete eth0.10",
                "delete dummy0",
                "create bridge br1",
                "create dummy dummy1",
                "create vlan br1.5 (base br1, id 5)",
                "modify br1: set state up",
                "modify dummy1: attach to br1, set state up",
                "modify br1.5: set state up",
            ]
        );
    }

    #[test]
    fn test_deleting_a_base_removes_its_vlans() {
        let plan = compute(r#"{"ifaces": [{"name": "eth0", "state": "absent"}]}"#).unwrap();
        assert_eq!(plan.summary(), vec!["delete eth0"]);
        assert!(plan.removed().contains("eth0.10"));

        let msg = schema_error(
            r#"{"ifaces": [{"name": "eth0", "state": "absent"}, {"name": "eth0.10", "mtu": 1400}]}"#,
        );
        assert!(msg.contains("removed as a vlan on eth0"), "{}", msg);
    }

    #[test]
    fn test_immutable_fields() {
        let msg = schema_error(r#"{"ifaces": [{"name": "dummy0", "type": "bridge"}]}"#);
        assert!(msg.contains("cannot change type from dummy to bridge"), "{}", msg);

        let msg = schema_error(
            r#"{"ifaces": [{"name": "veth1", "type": "veth", "veth": {"peer": "other"}}]}"#,
        );
        assert!(msg.contains("cannot change veth peer"), "{}", msg);

        let msg = schema_error(
            r#"{"ifaces": [{"name": "eth0.10", "type": "vlan", "vlan": {"base_iface": "eth0", "vlan_id": 11}}]}"#,
        );
        assert!(msg.contains("vlan.vlan_id"), "{}", msg);
    }

    #[test]
    fn test_create_validation() {
        let msg = schema_error(r#"{"ifaces": [{"name": "new0"}]}"#);
        assert!(msg.contains("type is required"), "{}", msg);

        let msg = schema_error(r#"{"ifaces": [{"name": "eth9", "type": "ethernet"}]}"#);
        assert!(msg.contains("cannot be created"), "{}", msg);

        let msg = schema_error(r#"{"ifaces": [{"name": "veth9", "type": "veth"}]}"#);
        assert!(msg.contains("veth.peer is required"), "{}", msg);

        let msg = schema_error(
            r#"{"ifaces": [{"name": "veth9", "type": "veth", "veth": {"peer": "eth0"}}]}"#,
        );
        assert!(msg.contains("already in use"), "{}", msg);

        let msg = schema_error(
            r#"{"ifaces": [{"name": "eth9.3", "type": "vlan", "vlan": {"base_iface": "eth9", "vlan_id": 3}}]}"#,
        );
        assert!(msg.contains("does not exist"), "{}", msg);
    }

    #[test]
    fn test_keeping_the_peer_of_a_deleted_veth() {
        let msg = schema_error(
            r#"{"ifaces": [{"name": "veth1", "state": "absent"}, {"name": "veth1.ep", "state": "up"}]}"#,
        );
        assert!(msg.contains("veth peer of veth1"), "{}", msg);
    }

    #[test]
    fn test_controller_validation() {
        let msg = schema_error(r#"{"ifaces": [{"name": "eth0", "controller": "dummy0"}]}"#);
        assert!(msg.contains("controller dummy0 cannot take ports"), "{}", msg);

        let plan = compute(r#"{"ifaces": [{"name": "eth1", "controller": ""}]}"#).unwrap();
        assert_eq!(plan.summary(), vec!["modify eth1: detach from controller"]);

        let msg = schema_error(
            r#"{"ifaces": [{"name": "br0", "state": "absent"}, {"name": "eth1", "controller": "br0"}]}"#,
        );
        assert!(msg.contains("controller br0 does not exist"), "{}", msg);

        let plan = compute(
            r#"{"ifaces": [{"name": "br0", "type": "bridge", "bridge": {"ports": ["eth0"]}}]}"#,
        )
        .unwrap();
        assert_eq!(
            plan.summary(),
            vec!["modify eth0: attach to br0", "modify eth1: detach from controller"]
        );
    }

    fn stacked_current() -> NetworkState {
        state(
            r#"{
                "ifaces": [
                    {"name": "eth0", "type": "ethernet", "state": "up", "mtu": 1500},
                    {"name": "eth0.10", "type": "vlan", "state": "up", "mtu": 1500,
                     "vlan": {"base_iface": "eth0", "vlan_id": 10}},
                    {"name": "eth0.10.20", "type": "vlan", "state": "up", "mtu": 1500,
                     "vlan": {"base_iface": "eth0.10", "vlan_id": 20}},
                    {"name": "mv0", "type": "macvlan", "state": "up",
                     "macvlan": {"base_iface": "eth0", "mode": "bridge"}},
                    {"name": "vrf-blue", "type": "vrf", "state": "up", "vrf": {"table": 10, "ports": []}},
                    {"name": "veth0", "type": "veth", "state": "up",
                     "veth": {"peer": "2", "peer_netnsid": 0}}
                ]
            }"#,
        )
    }

    #[test]
    fn test_stacked_links_modified_after_their_lower_device() {
        let desired = state(
            r#"{"ifaces": [
                {"name": "eth0.10.20", "mtu": 9000},
                {"name": "eth0.10", "mtu": 9000},
                {"name": "eth0", "mtu": 9000}
            ]}"#,
        );
        let plan = Plan::compute(&desired, &stacked_current()).unwrap();
        assert_eq!(
            plan.summary(),
            vec![
                "modify eth0: set mtu 9000",
                "modify eth0.10: set mtu 9000",
                "modify eth0.10.20: set mtu 9000",
            ]
        );
    }

    #[test]
    fn test_deleting_a_lower_device_removes_macvlans() {
        let desired = state(r#"{"ifaces": [{"name": "eth0", "state": "absent"}]}"#);
        let plan = Plan::compute(&desired, &stacked_current()).unwrap();
        for name in ["eth0.10", "eth0.10.20", "mv0"] {
            assert!(plan.removed().contains(name), "{}", name);
        }

        let desired = state(
            r#"{"ifaces": [{"name": "eth0", "state": "absent"}, {"name": "mv0", "state": "up"}]}"#,
        );
        let err = Plan::compute(&desired, &stacked_current()).unwrap_err();
        assert!(err.to_string().contains("removed as a macvlan on eth0"), "{}", err);
    }

    #[test]
    fn test_foreign_veth_peer_is_never_local() {
        let mut current = stacked_current();
        current.ifaces.push(Interface::new("2").with_link(LinkConfig::Dummy));

        let desired = state(r#"{"ifaces": [{"name": "veth0", "state": "absent"}]}"#);
        let plan = Plan::compute(&desired, &current).unwrap();
        assert_eq!(
            plan.operations,
            vec![Operation::Delete {
                name: "veth0".into(),
                also_removes: None,
            }]
        );
        assert!(!plan.removed().contains("2"));

        let desired = state(
            r#"{"ifaces": [{"name": "veth9", "type": "veth", "veth": {"peer": "4", "peer_netnsid": 1}}]}"#,
        );
        let err = Plan::compute(&desired, &current).unwrap_err();
        assert!(err.to_string().contains("peer is in another namespace"), "{}", err);
    }

    #[test]
    fn test_read_only_kinds() {
        let desired = state(r#"{"ifaces": [{"name": "vx0", "type": "vxlan", "vxlan": {"vni": 1}}]}"#);
        let err = Plan::compute(&desired, &stacked_current()).unwrap_err();
        assert!(err.to_string().contains("type vxlan cannot be created"), "{}", err);

        let desired = state(r#"{"ifaces": [{"name": "mv0", "type": "macvlan", "macvlan": {"mode": "vepa"}}]}"#);
        let err = Plan::compute(&desired, &stacked_current()).unwrap_err();
        assert!(err.to_string().contains("cannot change macvlan.mode"), "{}", err);

        let desired = state(r#"{"ifaces": [{"name": "vrf-blue", "type": "vrf", "vrf": {"table": 11}}]}"#);
        let err = Plan::compute(&desired, &stacked_current()).unwrap_err();
        assert!(err.to_string().contains("cannot change vrf.table"), "{}", err);

        // Existing ones take part in everything else.
        let desired = state(
            r#"{"ifaces": [{"name": "mv0", "mtu": 1400}, {"name": "eth0.10", "controller": "vrf-blue"}]}"#,
        );
        let plan = Plan::compute(&desired, &stacked_current()).unwrap();
        assert_eq!(
            plan.summary(),
            vec!["modify eth0.10: attach to vrf-blue", "modify mv0: set mtu 1400"]
        );
    }

    #[test]
    fn test_routes() {
        let plan = compute(
            r#"{"routes": [
                {"dst": "10.0.0.0/8", "oif": "eth0"},
                {"dst": "172.16.0.0/12", "oif": "eth0", "via": "192.0.2.254"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            plan.summary(),
            vec!["modify eth0: add route 172.16.0.0/12 via 192.0.2.254 dev eth0"]
        );

        let plan = compute(r#"{"routes": [{"dst": "10.0.0.0/8", "oif": "eth0", "state": "absent"}]}"#)
            .unwrap();
        match &plan.operations[..] {
            [Operation::Modify { delta, .. }] => assert_eq!(delta.routes_to_remove.len(), 2),
            other => panic!("unexpected plan {:?}", other),
        }

        let plan = compute(
            r#"{"routes": [{"dst": "10.0.0.0/8", "oif": "eth0", "metric": 100, "state": "absent"}]}"#,
        )
        .unwrap();
        assert_eq!(
            plan.summary(),
            vec!["modify eth0: remove route 10.0.0.0/8 via 192.0.2.253 dev eth0 metric 100"]
        );

        let msg = schema_error(r#"{"routes": [{"dst": "10.0.0.0/8", "oif": "eth7"}]}"#);
        assert!(msg.contains("will not exist"), "{}", msg);
    }
}
