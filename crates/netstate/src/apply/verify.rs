//! Post-apply convergence check.

use std::collections::BTreeSet;
use std::fmt::Display;

use super::plan::Plan;
use crate::error::{Error, Result};
use crate::state::{
    Family, Interface, InterfaceState, IpAddress, LinkConfig, NetworkState, VlanConfig,
};

fn mismatch(object: &str, reason: impl Into<String>) -> Error {
    Error::Verification {
        object: object.to_string(),
        reason: reason.into(),
    }
}

fn show<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "unset".to_string(), |v| v.to_string())
}

fn expect_eq<T: Display + PartialEq>(
    name: &str,
    field: &str,
    expected: Option<T>,
    actual: Option<T>,
) -> Result<()> {
    match expected {
        Some(expected) if Some(&expected) != actual.as_ref() => Err(mismatch(
            name,
            format!("{} is {}, expected {}", field, show(actual), expected),
        )),
        _ => Ok(()),
    }
}

/// Compare the re-read state against what the plan was meant to achieve.
pub(crate) fn verify(desired: &NetworkState, plan: &Plan, after: &NetworkState) -> Result<()> {
    let touched = plan.touched();

    for name in plan.removed() {
        if after.iface(name).is_some() {
            return Err(mismatch(name, "still present after deletion"));
        }
    }
    for name in plan.created() {
        if after.iface(name).is_none() {
            return Err(mismatch(name, "missing after creation"));
        }
    }

    for wanted in desired
        .ifaces
        .iter()
        .filter(|i| !i.is_absent() && touched.contains(&i.name))
    {
        let actual = after
            .iface(&wanted.name)
            .ok_or_else(|| mismatch(&wanted.name, "missing after apply"))?;
        compare(wanted, actual, plan.created().contains(&wanted.name))?;
    }

    for route in desired.routes.iter().filter(|r| touched.contains(&r.oif)) {
        let present = after.routes_of(&route.oif).any(|r| route.matches(r));
        if route.absent && present {
            return Err(mismatch(&route.to_string(), "route still present"));
        }
        if !route.absent && !present {
            return Err(mismatch(&route.to_string(), "route missing after apply"));
        }
    }

    Ok(())
}

fn compare(wanted: &Interface, actual: &Interface, is_new: bool) -> Result<()> {
    let name = wanted.name.as_str();

    expect_eq(name, "type", wanted.iface_type(), actual.iface_type())?;
    let state = wanted.state.or(is_new.then_some(InterfaceState::Up));
    expect_eq(name, "state", state, actual.state)?;
    expect_eq(name, "mtu", wanted.mtu, actual.mtu)?;
    expect_eq(
        name,
        "mac_address",
        wanted.mac_address.as_ref(),
        actual.mac_address.as_ref(),
    )?;

    if let Some(controller) = wanted.desired_controller() {
        let actual_controller = actual.controller.as_deref();
        if controller != actual_controller {
            return Err(mismatch(
                name,
                format!(
                    "controller is {}, expected {}",
                    show(actual_controller),
                    show(controller)
                ),
            ));
        }
    }

    if let (Some(wanted_link), Some(actual_link)) = (&wanted.link, &actual.link) {
        expect_eq(name, "veth.peer", wanted_link.veth_peer(), actual_link.veth_peer())?;
        if let (LinkConfig::Vlan(w), LinkConfig::Vlan(a)) = (wanted_link, actual_link) {
            compare_vlan(name, w, a)?;
        }
        if let (LinkConfig::Bond(w), LinkConfig::Bond(a)) = (wanted_link, actual_link) {
            expect_eq(name, "bond.mode", w.mode, a.mode)?;
        }
        if let Some(ports) = wanted_link.ports() {
            let actual_ports = actual_link.ports().unwrap_or_default();
            if ports != actual_ports {
                return Err(mismatch(
                    name,
                    format!(
                        "ports are [{}], expected [{}]",
                        actual_ports.join(", "),
                        ports.join(", ")
                    ),
                ));
            }
        }
    }

    for family in [Family::Ipv4, Family::Ipv6] {
        let Some(config) = wanted.ip(family) else {
            continue;
        };
        let expected: BTreeSet<&IpAddress> = config.managed().collect();
        let found: BTreeSet<&IpAddress> = actual
            .ip(family)
            .map(|c| c.managed().collect())
            .unwrap_or_default();
        if let Some(missing) = expected.difference(&found).next() {
            return Err(mismatch(name, format!("address {} missing", missing)));
        }
        if let Some(extra) = found.difference(&expected).next() {
            return Err(mismatch(name, format!("unexpected address {}", extra)));
        }
    }

    Ok(())
}

fn compare_vlan(name: &str, wanted: &VlanConfig, actual: &VlanConfig) -> Result<()> {
    expect_eq(
        name,
        "vlan.base_iface",
        wanted.base_iface.as_deref(),
        actual.base_iface.as_deref(),
    )?;
    expect_eq(name, "vlan.vlan_id", wanted.vlan_id, actual.vlan_id)
}
