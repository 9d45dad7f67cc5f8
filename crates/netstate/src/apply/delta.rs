//! Units of work handed to a kernel provider.

use std::fmt;

use crate::state::{BondMode, InterfaceState, IpAddress, MacAddress, Route};

/// What to create. Veth pairs are created in a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    pub name: String,
    pub kind: CreateKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateKind {
    Dummy,
    Bridge,
    Bond { mode: Option<BondMode> },
    Veth { peer: String },
    Vlan { base_iface: String, vlan_id: u16 },
}

impl CreateKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Dummy => "dummy",
            Self::Bridge => "bridge",
            Self::Bond { .. } => "bond",
            Self::Veth { .. } => "veth",
            Self::Vlan { .. } => "vlan",
        }
    }
}

impl fmt::Display for CreateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "create {} {}", self.kind.type_name(), self.name)?;
        match &self.kind {
            CreateKind::Veth { peer } => write!(f, " (peer {})", peer),
            CreateKind::Vlan {
                base_iface,
                vlan_id,
            } => write!(f, " (base {}, id {})", base_iface, vlan_id),
            CreateKind::Bond { mode: Some(mode) } => write!(f, " (mode {})", mode),
            _ => Ok(()),
        }
    }
}

/// Controller relation change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerChange {
    Attach(String),
    Detach,
}

/// Field-level changes to one existing interface.
///
/// Providers apply the parts in this order: MAC address, controller, MTU,
/// admin state, address removals, address additions, route removals, route
/// additions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceDelta {
    /// `Up` or `Down`.
    pub state: Option<InterfaceState>,
    pub mtu: Option<u32>,
    pub mac_address: Option<MacAddress>,
    pub controller: Option<ControllerChange>,
    pub addresses_to_add: Vec<IpAddress>,
    pub addresses_to_remove: Vec<IpAddress>,
    /// Routes through this interface; unset `table` means main.
    pub routes_to_add: Vec<Route>,
    /// Fully specified current routes.
    pub routes_to_remove: Vec<Route>,
}

impl InterfaceDelta {
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.mtu.is_none()
            && self.mac_address.is_none()
            && self.controller.is_none()
            && self.addresses_to_add.is_empty()
            && self.addresses_to_remove.is_empty()
            && self.routes_to_add.is_empty()
            && self.routes_to_remove.is_empty()
    }

    /// One line per change, in execution order.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(mac) = &self.mac_address {
            lines.push(format!("set mac_address {}", mac));
        }
        match &self.controller {
            Some(ControllerChange::Attach(controller)) => {
                lines.push(format!("attach to {}", controller));
            }
            Some(ControllerChange::Detach) => lines.push("detach from controller".to_string()),
            None => {}
        }
        if let Some(mtu) = self.mtu {
            lines.push(format!("set mtu {}", mtu));
        }
        if let Some(state) = self.state {
            lines.push(format!("set state {}", state));
        }
        lines.extend(self.addresses_to_remove.iter().map(|a| format!("remove address {}", a)));
        lines.extend(self.addresses_to_add.iter().map(|a| format!("add address {}", a)));
        lines.extend(self.routes_to_remove.iter().map(|r| format!("remove route {}", r)));
        lines.extend(self.routes_to_add.iter().map(|r| format!("add route {}", r)));
        lines
    }
}
