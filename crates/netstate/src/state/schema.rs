//! Wire shape of the JSON document and its conversion to the typed model.
//!
//! Parsing goes JSON value → `Raw*` serde structs → validated typed values.
//! Each entry is decoded on its own so errors can name the offending entry
//! and so `absent` entries can skip decoding of everything but `name`.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::iface::{
    BondConfig, BondMode, BridgeConfig, Interface, InterfaceState, InterfaceType, LinkConfig,
    MacAddress, MacvlanConfig, MacvlanMode, TunConfig, TunMode, VethConfig, VlanConfig, VrfConfig,
    VxlanConfig, validate_name,
};
use super::ip::{Family, IpAddress, IpConfig};
use super::route::{IpPrefix, Route};
use super::rule::{RouteRule, RuleAction};
use crate::error::{Error, Result};

/// Usable VLAN id range.
pub const VLAN_ID_RANGE: std::ops::RangeInclusive<u16> = 1..=4094;

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawDocument<I, R, U> {
    #[serde(default = "Vec::new")]
    pub ifaces: Vec<I>,
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<R>,
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub route_rules: Vec<U>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawInterface {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub iface_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<InterfaceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<RawIpConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<RawIpConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veth: Option<RawVeth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<RawPorts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond: Option<RawBond>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<RawVlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf: Option<RawVrf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vxlan: Option<RawVxlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macvlan: Option<RawMacvlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macvtap: Option<RawMacvlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tun: Option<RawTun>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawIpConfig {
    #[serde(default)]
    pub addresses: Vec<IpAddress>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawVeth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_netnsid: Option<i32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawPorts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawBond {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<BondMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawVlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_iface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawVrf {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawVxlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vni: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_iface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<u16>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawMacvlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_iface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<MacvlanMode>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RawTun {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TunMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum RawRouteState {
    Absent,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RawRoute {
    pub dst: String,
    pub oif: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RawRouteState>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RawRule {
    pub family: Family,
    #[serde(default)]
    pub priority: u32,
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iif: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oif: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fwmark: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fwmask: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goto: Option<u32>,
}

fn schema(context: impl std::fmt::Display, message: impl std::fmt::Display) -> Error {
    Error::Schema(format!("{}: {}", context, message))
}

/// Decode one element of `ifaces`.
pub(crate) fn interface_from_value(position: usize, value: Value) -> Result<Interface> {
    let context = format!("ifaces[{}]", position);

    let Value::Object(ref object) = value else {
        return Err(schema(context, "expected an object"));
    };

    let is_absent = object.get("state").and_then(Value::as_str) == Some("absent");
    if is_absent {
        // Only the name matters for a deletion; everything else is ignored.
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| schema(&context, "missing field `name`"))?;
        validate_name(name).map_err(|e| schema(&context, e))?;
        return Ok(Interface::absent(name));
    }

    let raw: RawInterface = serde_json::from_value(value).map_err(|e| schema(&context, e))?;
    raw.into_interface(&context)
}

impl RawInterface {
    fn into_interface(mut self, context: &str) -> Result<Interface> {
        validate_name(&self.name).map_err(|e| schema(context, e))?;
        let context = format!("{} ({})", context, self.name);

        let iface_type = match self.iface_type.as_deref() {
            None => None,
            Some(value) => Some(value.parse::<InterfaceType>().map_err(|()| {
                Error::UnknownType {
                    iface: self.name.clone(),
                    value: value.to_string(),
                }
            })?),
        };
        let link = match iface_type {
            None => None,
            Some(iface_type) => Some(link_config(&context, iface_type, &mut self)?),
        };

        let mac_address = self
            .mac_address
            .as_deref()
            .map(str::parse::<MacAddress>)
            .transpose()
            .map_err(|e| schema(&context, e))?;

        if let Some(controller) = self.controller.as_deref().filter(|c| !c.is_empty()) {
            validate_name(controller).map_err(|e| schema(&context, e))?;
            if controller == self.name {
                return Err(schema(&context, "interface cannot be its own controller"));
            }
        }

        Ok(Interface {
            ipv4: ip_config(&context, Family::Ipv4, self.ipv4)?,
            ipv6: ip_config(&context, Family::Ipv6, self.ipv6)?,
            name: self.name,
            state: self.state,
            link,
            index: self.index,
            mtu: self.mtu,
            mac_address,
            controller: self.controller,
        })
    }

    pub(crate) fn from_interface(iface: &Interface) -> Self {
        let mut raw = RawInterface {
            name: iface.name.clone(),
            iface_type: iface.iface_type().map(|t| t.as_str().to_string()),
            state: iface.state,
            index: iface.index,
            mtu: iface.mtu,
            mac_address: iface.mac_address.as_ref().map(ToString::to_string),
            controller: iface.controller.clone(),
            ipv4: iface.ipv4.as_ref().map(RawIpConfig::from_config),
            ipv6: iface.ipv6.as_ref().map(RawIpConfig::from_config),
            ..Default::default()
        };

        match &iface.link {
            Some(LinkConfig::Veth(VethConfig { peer, peer_netnsid })) if peer.is_some() => {
                raw.veth = Some(RawVeth {
                    peer: peer.clone(),
                    peer_netnsid: *peer_netnsid,
                });
            }
            Some(LinkConfig::Bridge(BridgeConfig { ports })) if ports.is_some() => {
                raw.bridge = Some(RawPorts {
                    ports: ports.clone(),
                });
            }
            Some(LinkConfig::Bond(BondConfig { mode, ports }))
                if mode.is_some() || ports.is_some() =>
            {
                raw.bond = Some(RawBond {
                    mode: *mode,
                    ports: ports.clone(),
                });
            }
            Some(LinkConfig::Vlan(VlanConfig {
                base_iface,
                vlan_id,
            })) if base_iface.is_some() || vlan_id.is_some() => {
                raw.vlan = Some(RawVlan {
                    base_iface: base_iface.clone(),
                    vlan_id: *vlan_id,
                });
            }
            Some(LinkConfig::Vrf(VrfConfig { table, ports }))
                if table.is_some() || ports.is_some() =>
            {
                raw.vrf = Some(RawVrf {
                    table: *table,
                    ports: ports.clone(),
                });
            }
            Some(LinkConfig::Vxlan(vxlan)) if *vxlan != VxlanConfig::default() => {
                raw.vxlan = Some(RawVxlan {
                    vni: vxlan.vni,
                    remote: vxlan.remote,
                    local: vxlan.local,
                    base_iface: vxlan.base_iface.clone(),
                    dst_port: vxlan.dst_port,
                });
            }
            Some(LinkConfig::Macvlan(config)) if *config != MacvlanConfig::default() => {
                raw.macvlan = Some(RawMacvlan::from_config(config));
            }
            Some(LinkConfig::Macvtap(config)) if *config != MacvlanConfig::default() => {
                raw.macvtap = Some(RawMacvlan::from_config(config));
            }
            Some(LinkConfig::Tun(TunConfig { mode: Some(mode) })) => {
                raw.tun = Some(RawTun { mode: Some(*mode) });
            }
            _ => {}
        }

        raw
    }
}

impl RawMacvlan {
    fn from_config(config: &MacvlanConfig) -> Self {
        Self {
            base_iface: config.base_iface.clone(),
            mode: config.mode,
        }
    }

    fn into_config(self, context: &str, key: &str) -> Result<MacvlanConfig> {
        base_iface(context, key, self.base_iface.as_deref())?;
        Ok(MacvlanConfig {
            base_iface: self.base_iface,
            mode: self.mode,
        })
    }
}

fn base_iface(context: &str, key: &str, name: Option<&str>) -> Result<()> {
    match name {
        Some(name) => validate_name(name)
            .map_err(|e| schema(context, format!("{}.base_iface: {}", key, e))),
        None => Ok(()),
    }
}

/// The type-specific part of `raw`. Sub-objects of other types are ignored.
fn link_config(
    context: &str,
    iface_type: InterfaceType,
    raw: &mut RawInterface,
) -> Result<LinkConfig> {
    Ok(match iface_type {
        InterfaceType::Ethernet => LinkConfig::Ethernet,
        InterfaceType::Loopback => LinkConfig::Loopback,
        InterfaceType::Dummy => LinkConfig::Dummy,
        InterfaceType::Unknown => LinkConfig::Unknown,
        InterfaceType::Veth => {
            let veth = raw.veth.take().unwrap_or_default();
            match (&veth.peer, veth.peer_netnsid) {
                // A peer in another namespace is named by its ifindex there.
                (Some(peer), Some(_)) if peer.parse::<u32>().is_err() => {
                    return Err(schema(
                        context,
                        "veth.peer must be an ifindex when veth.peer_netnsid is set",
                    ));
                }
                (Some(peer), None) => {
                    validate_name(peer)
                        .map_err(|e| schema(context, format!("veth.peer: {}", e)))?;
                }
                _ => {}
            }
            LinkConfig::Veth(VethConfig {
                peer: veth.peer,
                peer_netnsid: veth.peer_netnsid,
            })
        }
        InterfaceType::Bridge => LinkConfig::Bridge(BridgeConfig {
            ports: ports(context, raw.bridge.take().and_then(|b| b.ports))?,
        }),
        InterfaceType::Bond => {
            let bond = raw.bond.take().unwrap_or_default();
            LinkConfig::Bond(BondConfig {
                mode: bond.mode,
                ports: ports(context, bond.ports)?,
            })
        }
        InterfaceType::Vrf => {
            let vrf = raw.vrf.take().unwrap_or_default();
            LinkConfig::Vrf(VrfConfig {
                table: vrf.table,
                ports: ports(context, vrf.ports)?,
            })
        }
        InterfaceType::Vxlan => {
            let vxlan = raw.vxlan.take().unwrap_or_default();
            base_iface(context, "vxlan", vxlan.base_iface.as_deref())?;
            if let (Some(remote), Some(local)) = (vxlan.remote, vxlan.local)
                && Family::of(&remote) != Family::of(&local)
            {
                return Err(schema(
                    context,
                    "vxlan.remote and vxlan.local are of different families",
                ));
            }
            LinkConfig::Vxlan(VxlanConfig {
                vni: vxlan.vni,
                remote: vxlan.remote,
                local: vxlan.local,
                base_iface: vxlan.base_iface,
                dst_port: vxlan.dst_port,
            })
        }
        InterfaceType::Macvlan => LinkConfig::Macvlan(
            raw.macvlan
                .take()
                .unwrap_or_default()
                .into_config(context, "macvlan")?,
        ),
        InterfaceType::Macvtap => LinkConfig::Macvtap(
            raw.macvtap
                .take()
                .unwrap_or_default()
                .into_config(context, "macvtap")?,
        ),
        InterfaceType::Tun => LinkConfig::Tun(TunConfig {
            mode: raw.tun.take().and_then(|t| t.mode),
        }),
        InterfaceType::Vlan => match raw.vlan.take() {
            None => LinkConfig::Vlan(VlanConfig::default()),
            Some(RawVlan {
                base_iface: Some(base_iface),
                vlan_id: Some(vlan_id),
            }) => {
                validate_name(&base_iface)
                    .map_err(|e| schema(context, format!("vlan.base_iface: {}", e)))?;
                if !VLAN_ID_RANGE.contains(&vlan_id) {
                    return Err(schema(
                        context,
                        format!(
                            "vlan.vlan_id {} is out of range {}-{}",
                            vlan_id,
                            VLAN_ID_RANGE.start(),
                            VLAN_ID_RANGE.end()
                        ),
                    ));
                }
                LinkConfig::Vlan(VlanConfig {
                    base_iface: Some(base_iface),
                    vlan_id: Some(vlan_id),
                })
            }
            Some(RawVlan { base_iface: None, .. }) => {
                return Err(schema(context, "missing field `vlan.base_iface`"));
            }
            Some(RawVlan { vlan_id: None, .. }) => {
                return Err(schema(context, "missing field `vlan.vlan_id`"));
            }
        },
    })
}

fn ports(context: &str, ports: Option<Vec<String>>) -> Result<Option<Vec<String>>> {
    let Some(mut ports) = ports else {
        return Ok(None);
    };
    for port in &ports {
        validate_name(port).map_err(|e| schema(context, format!("ports: {}", e)))?;
    }
    ports.sort();
    ports.dedup();
    Ok(Some(ports))
}

fn ip_config(context: &str, family: Family, raw: Option<RawIpConfig>) -> Result<Option<IpConfig>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    for addr in &raw.addresses {
        if addr.family() != family {
            return Err(schema(
                context,
                format!("{} is not an {} address", addr.address, family.key()),
            ));
        }
        if addr.prefix_len > family.max_prefix_len() {
            return Err(schema(
                context,
                format!("prefix length {} out of range for {}", addr.prefix_len, addr.address),
            ));
        }
    }
    Ok(Some(IpConfig::new(raw.addresses)))
}

impl RawIpConfig {
    fn from_config(config: &IpConfig) -> Self {
        Self {
            addresses: config.addresses.clone(),
        }
    }
}

/// Decode one element of `routes`.
pub(crate) fn route_from_value(position: usize, value: Value) -> Result<Route> {
    let context = format!("routes[{}]", position);
    let raw: RawRoute = serde_json::from_value(value).map_err(|e| schema(&context, e))?;

    let dst: IpPrefix = raw.dst.parse().map_err(|e| schema(&context, e))?;
    validate_name(&raw.oif).map_err(|e| schema(&context, format!("oif: {}", e)))?;
    if let Some(via) = raw.via {
        if Family::of(&via) != dst.family() {
            return Err(schema(
                &context,
                format!("gateway {} does not match the family of {}", via, dst),
            ));
        }
    }

    Ok(Route {
        dst,
        oif: raw.oif,
        via: raw.via,
        metric: raw.metric,
        table: raw.table,
        absent: raw.state == Some(RawRouteState::Absent),
    })
}

impl RawRoute {
    pub(crate) fn from_route(route: &Route) -> Self {
        Self {
            dst: route.dst.to_string(),
            oif: route.oif.clone(),
            via: route.via,
            metric: route.metric,
            table: route.table,
            state: route.absent.then_some(RawRouteState::Absent),
        }
    }
}

/// Decode one element of `route_rules`.
pub(crate) fn rule_from_value(position: usize, value: Value) -> Result<RouteRule> {
    let context = format!("route_rules[{}]", position);
    let raw: RawRule = serde_json::from_value(value).map_err(|e| schema(&context, e))?;

    let prefix = |key: &str, text: Option<&str>| -> Result<Option<IpPrefix>> {
        let Some(text) = text else {
            return Ok(None);
        };
        let prefix: IpPrefix = text
            .parse()
            .map_err(|e| schema(&context, format!("{}: {}", key, e)))?;
        if prefix.family() != raw.family {
            return Err(schema(
                &context,
                format!("{} {} is not an {} prefix", key, prefix, raw.family.key()),
            ));
        }
        Ok(Some(prefix))
    };
    let from = prefix("from", raw.from.as_deref())?;
    let to = prefix("to", raw.to.as_deref())?;

    for name in [&raw.iif, &raw.oif].into_iter().flatten() {
        validate_name(name).map_err(|e| schema(&context, e))?;
    }

    Ok(RouteRule {
        family: raw.family,
        priority: raw.priority,
        action: raw.action,
        table: raw.table,
        from,
        to,
        iif: raw.iif,
        oif: raw.oif,
        fwmark: raw.fwmark,
        fwmask: raw.fwmask,
        goto: raw.goto,
    })
}

impl RawRule {
    pub(crate) fn from_rule(rule: &RouteRule) -> Self {
        Self {
            family: rule.family,
            priority: rule.priority,
            action: rule.action,
            table: rule.table,
            from: rule.from.map(|p| p.to_string()),
            to: rule.to.map(|p| p.to_string()),
            iif: rule.iif.clone(),
            oif: rule.oif.clone(),
            fwmark: rule.fwmark,
            fwmask: rule.fwmask,
            goto: rule.goto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_entry_ignores_everything_else() {
        let iface = interface_from_value(
            0,
            json!({"name": "veth1", "state": "absent", "type": "nonsense", "mtu": "big"}),
        )
        .unwrap();
        assert_eq!(iface, Interface::absent("veth1"));
    }

    #[test]
    fn test_mismatched_sub_object_is_ignored() {
        let iface = interface_from_value(
            0,
            json!({"name": "dummy0", "type": "dummy", "veth": {"peer": "x"}}),
        )
        .unwrap();
        assert_eq!(iface.link, Some(LinkConfig::Dummy));
    }

    #[test]
    fn test_vlan_requires_both_fields() {
        let err = interface_from_value(
            0,
            json!({"name": "eth0.10", "type": "vlan", "vlan": {"vlan_id": 10}}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("vlan.base_iface"));

        let err = interface_from_value(
            0,
            json!({"name": "eth0.10", "type": "vlan", "vlan": {"base_iface": "eth0", "vlan_id": 4095}}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_address_family_checked() {
        let err = interface_from_value(
            3,
            json!({"name": "eth0", "ipv4": {"addresses": [{"address": "2001:db8::1", "prefix_len": 64}]}}),
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ifaces[3] (eth0)"), "{}", msg);
        assert!(msg.contains("not an ipv4 address"), "{}", msg);
    }

    #[test]
    fn test_unknown_type() {
        let err = interface_from_value(0, json!({"name": "wg0", "type": "wireguard"})).unwrap_err();
        assert!(matches!(err, Error::UnknownType { ref value, .. } if value == "wireguard"));
    }

    #[test]
    fn test_read_only_kinds_round_trip() {
        let entries = [
            json!({"name": "vrf-blue", "type": "vrf", "vrf": {"table": 10, "ports": ["eth1"]}}),
            json!({"name": "vx0", "type": "vxlan",
                   "vxlan": {"vni": 42, "remote": "192.0.2.9", "base_iface": "eth0", "dst_port": 4789}}),
            json!({"name": "mv0", "type": "macvlan", "macvlan": {"base_iface": "eth0", "mode": "bridge"}}),
            json!({"name": "mvt0", "type": "macvtap", "macvtap": {"base_iface": "eth0", "mode": "vepa"}}),
            json!({"name": "tap0", "type": "tun", "tun": {"mode": "tap"}}),
        ];
        for entry in entries {
            let iface = interface_from_value(0, entry.clone()).unwrap();
            assert_eq!(serde_json::to_value(RawInterface::from_interface(&iface)).unwrap(), entry);
        }
    }

    #[test]
    fn test_vxlan_families_must_agree() {
        let err = interface_from_value(
            0,
            json!({"name": "vx0", "type": "vxlan", "vxlan": {"remote": "2001:db8::1", "local": "192.0.2.1"}}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("different families"));
    }

    #[test]
    fn test_foreign_veth_peer_is_an_ifindex() {
        let iface = interface_from_value(
            0,
            json!({"name": "veth0", "type": "veth", "veth": {"peer": "7", "peer_netnsid": 1}}),
        )
        .unwrap();
        assert_eq!(
            iface.link,
            Some(LinkConfig::Veth(VethConfig {
                peer: Some("7".into()),
                peer_netnsid: Some(1),
            }))
        );

        let err = interface_from_value(
            0,
            json!({"name": "veth0", "type": "veth", "veth": {"peer": "veth1", "peer_netnsid": 1}}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be an ifindex"));
    }

    #[test]
    fn test_rule_decoding() {
        let rule = rule_from_value(
            0,
            json!({"family": "ipv4", "priority": 100, "action": "table", "table": 10,
                   "from": "10.0.0.0/8", "iif": "eth0"}),
        )
        .unwrap();
        assert_eq!(rule.from, Some("10.0.0.0/8".parse().unwrap()));
        assert_eq!(rule.to_string(), "100: from 10.0.0.0/8 iif eth0 lookup 10");

        let err = rule_from_value(
            2,
            json!({"family": "ipv6", "action": "table", "from": "10.0.0.0/8"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("route_rules[2]"));
        assert!(err.to_string().contains("not an ipv6 prefix"));
    }

    #[test]
    fn test_route_gateway_family() {
        let err = route_from_value(
            0,
            json!({"dst": "10.0.0.0/8", "oif": "eth0", "via": "2001:db8::1"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not match"));

        let route = route_from_value(
            0,
            json!({"dst": "10.0.0.0/8", "oif": "eth0", "state": "absent", "extra": 1}),
        )
        .unwrap();
        assert!(route.absent);
    }

    #[test]
    fn test_serialization_skips_unset_fields() {
        let iface = Interface::new("eth0").with_link(LinkConfig::Veth(VethConfig::default()));
        let value = serde_json::to_value(RawInterface::from_interface(&iface)).unwrap();
        assert_eq!(value, json!({"name": "eth0", "type": "veth"}));
    }
}
