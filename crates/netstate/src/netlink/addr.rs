//! Address messages.

use std::net::IpAddr;

use super::builder::MessageBuilder;
use super::connection::{ack_request, create_request, dump_request};
use super::message::NlMsgType;
use super::parse::{FromNetlink, PResult, ip_family, ip_octets, parse_attrs, parse_header, parse_ip_addr};
use super::types::{IfAddrMsg, ifa};

#[derive(Debug, Clone, Default)]
pub struct AddressMessage {
    pub(crate) header: IfAddrMsg,
    pub(crate) address: Option<IpAddr>,
    pub(crate) local: Option<IpAddr>,
}

impl AddressMessage {
    pub fn ifindex(&self) -> u32 {
        self.header.ifa_index
    }

    pub fn prefix_len(&self) -> u8 {
        self.header.ifa_prefixlen
    }

    /// IFA_LOCAL when present (point-to-point peers put the remote end in IFA_ADDRESS).
    pub fn primary_address(&self) -> Option<IpAddr> {
        self.local.or(self.address)
    }
}

impl FromNetlink for AddressMessage {
    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header: IfAddrMsg = parse_header(input)?;
        let mut msg = AddressMessage {
            header,
            ..Default::default()
        };

        for (kind, payload) in parse_attrs(input)? {
            match kind {
                ifa::ADDRESS => msg.address = parse_ip_addr(payload, header.ifa_family).ok(),
                ifa::LOCAL => msg.local = parse_ip_addr(payload, header.ifa_family).ok(),
                _ => {}
            }
        }

        Ok(msg)
    }
}

pub fn dump_addresses() -> MessageBuilder {
    let mut builder = dump_request(NlMsgType::RTM_GETADDR);
    builder.append(&IfAddrMsg::default());
    builder
}

fn address_message(mut builder: MessageBuilder, index: u32, address: IpAddr, prefix_len: u8) -> MessageBuilder {
    builder.append(&IfAddrMsg {
        ifa_family: ip_family(&address),
        ifa_prefixlen: prefix_len,
        ifa_index: index,
        ..Default::default()
    });
    let octets = ip_octets(&address);
    builder.append_attr(ifa::LOCAL, &octets);
    builder.append_attr(ifa::ADDRESS, &octets);
    builder
}

pub fn add_address(index: u32, address: IpAddr, prefix_len: u8) -> MessageBuilder {
    address_message(create_request(NlMsgType::RTM_NEWADDR), index, address, prefix_len)
}

pub fn delete_address(index: u32, address: IpAddr, prefix_len: u8) -> MessageBuilder {
    address_message(ack_request(NlMsgType::RTM_DELADDR), index, address, prefix_len)
}
