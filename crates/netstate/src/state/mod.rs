//! The network state model and its JSON document form.
//!
//! A [`NetworkState`] is either a retrieved snapshot of the kernel (every
//! applicable field populated) or a desired-state document, where any field
//! but an interface's `name` may be left out to mean "leave unchanged".
//!
//! ```
//! use netstate::NetworkState;
//!
//! let desired = NetworkState::parse(r#"{
//!     "ifaces": [
//!         {"name": "veth1", "type": "veth", "veth": {"peer": "veth1.ep"}},
//!         {"name": "veth1.ep", "type": "veth"}
//!     ]
//! }"#)?;
//! assert_eq!(desired.ifaces.len(), 2);
//! # Ok::<(), netstate::Error>(())
//! ```

mod iface;
mod ip;
mod route;
mod rule;
pub(crate) mod schema;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;

pub use iface::{
    BondConfig, BondMode, BridgeConfig, Interface, InterfaceState, InterfaceType, LinkConfig,
    MacAddress, MacvlanConfig, MacvlanMode, TunConfig, TunMode, VethConfig, VlanConfig, VrfConfig,
    VxlanConfig, validate_name,
};
pub use ip::{Family, IpAddress, IpConfig};
pub use route::{IpPrefix, MAIN_TABLE, Route};
pub use rule::{RouteRule, RuleAction};
pub use schema::VLAN_ID_RANGE;

use crate::apply::{ApplyOptions, ApplyResult};
use crate::error::{Error, Result};
use crate::netlink::Error as PlatformError;
use crate::provider::netlink::NetlinkProvider;
use schema::{RawDocument, RawInterface, RawRoute, RawRule};

/// A set of interfaces plus routes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkState {
    pub ifaces: Vec<Interface>,
    pub routes: Vec<Route>,
    /// Policy routing rules. Retrieval reports them; apply leaves them alone.
    pub route_rules: Vec<RouteRule>,
}

impl NetworkState {
    pub fn new(ifaces: Vec<Interface>, routes: Vec<Route>) -> Self {
        Self {
            ifaces,
            routes,
            route_rules: Vec::new(),
        }
    }

    /// Parse and validate a JSON document.
    ///
    /// Invalid JSON is [`Error::Json`]; everything else that is wrong with the
    /// document is a schema error naming the offending entry.
    pub fn parse(document: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(document)?;
        if !value.is_object() {
            return Err(Error::schema("document must be a JSON object"));
        }
        let raw: RawDocument<Value, Value, Value> =
            serde_json::from_value(value).map_err(|e| Error::schema(e.to_string()))?;

        let ifaces = raw
            .ifaces
            .into_iter()
            .enumerate()
            .map(|(i, v)| schema::interface_from_value(i, v))
            .collect::<Result<Vec<_>>>()?;
        let routes = raw
            .routes
            .into_iter()
            .enumerate()
            .map(|(i, v)| schema::route_from_value(i, v))
            .collect::<Result<Vec<_>>>()?;
        let route_rules = raw
            .route_rules
            .into_iter()
            .enumerate()
            .map(|(i, v)| schema::rule_from_value(i, v))
            .collect::<Result<Vec<_>>>()?;

        let state = Self {
            ifaces,
            routes,
            route_rules,
        };
        state.validate()?;
        Ok(state)
    }

    /// Serialize to compact JSON. `absent` entries are dropped.
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string(&self.to_raw()).map_err(|e| Error::Bug(e.to_string()))
    }

    /// Serialize to indented JSON. `absent` entries are dropped.
    pub fn serialize_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_raw()).map_err(|e| Error::Bug(e.to_string()))
    }

    /// Convert to a `serde_json::Value`, e.g. for re-encoding in another format.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self.to_raw()).map_err(|e| Error::Bug(e.to_string()))
    }

    fn to_raw(&self) -> RawDocument<RawInterface, RawRoute, RawRule> {
        RawDocument {
            ifaces: self
                .ifaces
                .iter()
                .filter(|i| !i.is_absent())
                .map(RawInterface::from_interface)
                .collect(),
            routes: self
                .routes
                .iter()
                .filter(|r| !r.absent)
                .map(RawRoute::from_route)
                .collect(),
            route_rules: self.route_rules.iter().map(RawRule::from_rule).collect(),
        }
    }

    pub fn iface(&self, name: &str) -> Option<&Interface> {
        self.ifaces.iter().find(|i| i.name == name)
    }

    /// Routes whose output interface is `name`.
    pub fn routes_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Route> + 'a {
        self.routes.iter().filter(move |r| r.oif == name)
    }

    /// Cross-entry checks that a single entry cannot make on its own.
    pub(crate) fn validate(&self) -> Result<()> {
        let mut by_name: HashMap<&str, &Interface> = HashMap::new();
        for iface in &self.ifaces {
            if by_name.insert(&iface.name, iface).is_some() {
                return Err(Error::DuplicateInterface {
                    name: iface.name.clone(),
                });
            }
        }

        for iface in self.ifaces.iter().filter(|i| !i.is_absent()) {
            let Some(peer) = iface.link.as_ref().and_then(LinkConfig::veth_peer) else {
                continue;
            };
            if peer == iface.name {
                return Err(Error::schema(format!(
                    "{}: veth peer must differ from the interface itself",
                    iface.name
                )));
            }
            let Some(other) = by_name.get(peer).filter(|o| !o.is_absent()) else {
                continue;
            };
            match &other.link {
                None | Some(LinkConfig::Veth(VethConfig { peer: None, .. })) => {}
                Some(LinkConfig::Veth(VethConfig {
                    peer_netnsid: Some(_),
                    ..
                })) => {
                    return Err(Error::schema(format!(
                        "{}: veth peer {} has its own peer in another namespace",
                        iface.name, peer
                    )));
                }
                Some(LinkConfig::Veth(VethConfig {
                    peer: Some(back), ..
                })) => {
                    if *back != iface.name {
                        return Err(Error::schema(format!(
                            "{}: veth peer {} names {} as its own peer",
                            iface.name, peer, back
                        )));
                    }
                }
                Some(link) => {
                    return Err(Error::schema(format!(
                        "{}: veth peer {} is declared as {}",
                        iface.name,
                        peer,
                        link.iface_type()
                    )));
                }
            }
        }

        self.validate_ports(&by_name)
    }

    /// A controller's `ports` list must agree with its ports' `controller`.
    fn validate_ports(&self, by_name: &HashMap<&str, &Interface>) -> Result<()> {
        let mut listed_by: BTreeMap<&str, &str> = BTreeMap::new();

        for controller in self.ifaces.iter().filter(|i| !i.is_absent()) {
            let Some(ports) = controller.link.as_ref().and_then(LinkConfig::ports) else {
                continue;
            };
            let listed: HashSet<&str> = ports.iter().map(String::as_str).collect();

            for port in ports {
                if *port == controller.name {
                    return Err(Error::schema(format!(
                        "{}: an interface cannot be its own port",
                        controller.name
                    )));
                }
                if let Some(previous) = listed_by.insert(port, &controller.name) {
                    return Err(Error::schema(format!(
                        "{}: listed as a port of both {} and {}",
                        port, previous, controller.name
                    )));
                }
                let Some(entry) = by_name.get(port.as_str()) else {
                    continue;
                };
                if entry.is_absent() {
                    return Err(Error::schema(format!(
                        "{}: port {} is marked absent",
                        controller.name, port
                    )));
                }
                if let Some(wanted) = entry.desired_controller()
                    && wanted != Some(controller.name.as_str())
                {
                    return Err(Error::schema(format!(
                        "{}: listed as a port of {} but its controller is '{}'",
                        port,
                        controller.name,
                        wanted.unwrap_or("")
                    )));
                }
            }

            for iface in self.ifaces.iter().filter(|i| !i.is_absent()) {
                if iface.desired_controller() == Some(Some(controller.name.as_str()))
                    && !listed.contains(iface.name.as_str())
                {
                    return Err(Error::schema(format!(
                        "{}: controller is {} but it is missing from {}'s ports",
                        iface.name, controller.name, controller.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Read the current state of this host's network namespace.
    ///
    /// Blocks the calling thread for the duration of the kernel dumps.
    pub fn retrieve() -> Result<Self> {
        let runtime = runtime()?;
        runtime.block_on(async {
            let provider = NetlinkProvider::new()?;
            crate::retrieve::retrieve(&provider).await
        })
    }

    /// Converge this host's network namespace to `self`.
    pub fn apply(&self) -> Result<ApplyResult> {
        self.apply_with(ApplyOptions::default())
    }

    /// [`apply`](Self::apply) with explicit options.
    pub fn apply_with(&self, options: ApplyOptions) -> Result<ApplyResult> {
        let runtime = runtime()?;
        runtime.block_on(async {
            let provider = NetlinkProvider::new()?;
            crate::apply::apply(&provider, self, options).await
        })
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .map_err(|e| Error::Platform(PlatformError::Io(e)))
}
