//! Route messages.

use std::net::IpAddr;

use super::attr::get;
use super::builder::MessageBuilder;
use super::connection::{ack_request, create_request, dump_request};
use super::message::NlMsgType;
use super::parse::{FromNetlink, PResult, ip_family, ip_octets, parse_attrs, parse_header, parse_ip_addr};
use super::types::{RtMsg, rt_proto, rt_scope, rt_table, rta, rtn};

#[derive(Debug, Clone, Default)]
pub struct RouteMessage {
    pub(crate) header: RtMsg,
    pub(crate) destination: Option<IpAddr>,
    pub(crate) gateway: Option<IpAddr>,
    pub(crate) oif: Option<u32>,
    pub(crate) priority: Option<u32>,
    pub(crate) table: Option<u32>,
}

impl RouteMessage {
    /// Destination, or the unspecified address of the family for default routes.
    pub fn destination(&self) -> Option<IpAddr> {
        self.destination.or(match i32::from(self.header.rtm_family) {
            libc::AF_INET => Some(IpAddr::from([0u8; 4])),
            libc::AF_INET6 => Some(IpAddr::from([0u8; 16])),
            _ => None,
        })
    }

    pub fn dst_len(&self) -> u8 {
        self.header.rtm_dst_len
    }

    pub fn gateway(&self) -> Option<IpAddr> {
        self.gateway
    }

    pub fn oif(&self) -> Option<u32> {
        self.oif
    }

    pub fn priority(&self) -> Option<u32> {
        self.priority
    }

    /// Table id; RTA_TABLE overrides the 8-bit header field.
    pub fn table(&self) -> u32 {
        self.table.unwrap_or(u32::from(self.header.rtm_table))
    }

    /// RTPROT_* origin of the route.
    pub fn protocol(&self) -> u8 {
        self.header.rtm_protocol
    }

    pub fn is_unicast(&self) -> bool {
        self.header.rtm_type == rtn::UNICAST
    }
}

impl FromNetlink for RouteMessage {
    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header: RtMsg = parse_header(input)?;
        let mut msg = RouteMessage {
            header,
            ..Default::default()
        };

        for (kind, payload) in parse_attrs(input)? {
            match kind {
                rta::DST => msg.destination = parse_ip_addr(payload, header.rtm_family).ok(),
                rta::GATEWAY => msg.gateway = parse_ip_addr(payload, header.rtm_family).ok(),
                rta::OIF => msg.oif = get::u32_ne(payload).ok(),
                rta::PRIORITY => msg.priority = get::u32_ne(payload).ok(),
                rta::TABLE => msg.table = get::u32_ne(payload).ok(),
                _ => {}
            }
        }

        Ok(msg)
    }
}

pub fn dump_routes() -> MessageBuilder {
    let mut builder = dump_request(NlMsgType::RTM_GETROUTE);
    builder.append(&RtMsg::default());
    builder
}

/// Route parameters for add/delete requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRequest {
    pub destination: IpAddr,
    pub prefix_len: u8,
    pub oif: u32,
    pub gateway: Option<IpAddr>,
    pub metric: Option<u32>,
    pub table: u32,
}

/// Protocol sent with `RTM_DELROUTE`. Any other value makes the kernel skip
/// routes of a different origin.
pub const DELETE_PROTOCOL: u8 = rt_proto::UNSPEC;

fn route_message(
    mut builder: MessageBuilder,
    route: &RouteRequest,
    protocol: u8,
    scope: u8,
) -> MessageBuilder {
    let table_byte = u8::try_from(route.table).unwrap_or(rt_table::UNSPEC);
    builder.append(&RtMsg {
        rtm_family: ip_family(&route.destination),
        rtm_dst_len: route.prefix_len,
        rtm_table: table_byte,
        rtm_protocol: protocol,
        rtm_scope: scope,
        rtm_type: rtn::UNICAST,
        ..Default::default()
    });
    if route.prefix_len > 0 {
        builder.append_attr(rta::DST, &ip_octets(&route.destination));
    }
    builder.append_attr_u32(rta::OIF, route.oif);
    if let Some(gateway) = route.gateway {
        builder.append_attr(rta::GATEWAY, &ip_octets(&gateway));
    }
    if let Some(metric) = route.metric {
        builder.append_attr_u32(rta::PRIORITY, metric);
    }
    builder.append_attr_u32(rta::TABLE, route.table);
    builder
}

pub fn add_route(route: &RouteRequest) -> MessageBuilder {
    let scope = if route.gateway.is_some() {
        rt_scope::UNIVERSE
    } else {
        rt_scope::LINK
    };
    route_message(
        create_request(NlMsgType::RTM_NEWROUTE),
        route,
        rt_proto::STATIC,
        scope,
    )
}

pub fn delete_route(route: &RouteRequest) -> MessageBuilder {
    route_message(
        ack_request(NlMsgType::RTM_DELROUTE),
        route,
        DELETE_PROTOCOL,
        rt_scope::NOWHERE,
    )
}
