//! Minimal async rtnetlink transport used by the netlink kernel provider.
//!
//! Covers exactly what the state engine needs: link, address, route and rule
//! dumps, link creation for the supported kinds, link attribute changes,
//! and address/route add/delete.

pub mod addr;
pub mod attr;
pub mod builder;
pub mod connection;
pub mod error;
pub mod link;
pub mod message;
pub mod parse;
pub mod route;
pub mod rule;
pub mod socket;
pub mod types;

pub use connection::Connection;
pub use error::{Error, Result};
