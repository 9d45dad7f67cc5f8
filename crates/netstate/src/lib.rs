//! Declarative network state for Linux.
//!
//! This crate reads the network configuration of a host (interfaces,
//! addresses, routes and link-type settings such as veth pairs) into a
//! [`NetworkState`], and converges the host to a possibly partial desired
//! [`NetworkState`] with the minimal ordered set of kernel operations.
//!
//! # Example
//!
//! ```ignore
//! use netstate::NetworkState;
//!
//! fn main() -> netstate::Result<()> {
//!     let desired = NetworkState::parse(r#"{"ifaces": [
//!         {"name": "veth1", "type": "veth", "veth": {"peer": "veth1.ep"}},
//!         {"name": "veth1.ep", "type": "veth"}
//!     ]}"#)?;
//!     let result = desired.apply()?;
//!     for line in &result.summary {
//!         println!("{}", line);
//!     }
//!     println!("{}", NetworkState::retrieve()?.serialize_pretty()?);
//!     Ok(())
//! }
//! ```
//!
//! # Kernel access
//!
//! The engine talks to the kernel through the [`KernelProvider`] trait.
//! [`provider::netlink::NetlinkProvider`] is the real rtnetlink backend;
//! [`provider::memory::MemoryProvider`] is an in-process fake for tests:
//!
//! ```
//! use netstate::apply::{ApplyOptions, apply_document};
//! use netstate::provider::memory::MemoryProvider;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let provider = MemoryProvider::with_loopback();
//! let doc = r#"{"ifaces": [{"name": "dummy0", "type": "dummy", "mtu": 1400}]}"#;
//!
//! let result = apply_document(&provider, doc, ApplyOptions::default()).await?;
//! assert!(result.changes_made);
//!
//! let again = apply_document(&provider, doc, ApplyOptions::default()).await?;
//! assert!(!again.changes_made);
//! # Ok::<(), netstate::Error>(())
//! # }).unwrap();
//! ```

pub mod apply;
pub mod error;
pub mod netlink;
pub mod provider;
pub mod retrieve;
pub mod state;

pub use apply::{ApplyOptions, ApplyResult, Operation, Plan};
pub use error::{Error, ErrorKind, Result};
pub use netlink::Error as PlatformError;
pub use provider::KernelProvider;
pub use retrieve::{RetrieveFilter, retrieve, retrieve_filtered};
pub use state::{
    BondConfig, BondMode, BridgeConfig, Family, Interface, InterfaceState, InterfaceType,
    IpAddress, IpConfig, IpPrefix, LinkConfig, MAIN_TABLE, MacAddress, MacvlanConfig, MacvlanMode,
    NetworkState, Route, RouteRule, RuleAction, TunConfig, TunMode, VethConfig, VlanConfig,
    VrfConfig, VxlanConfig,
};
