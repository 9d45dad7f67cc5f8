//! Routing rule messages (`RTM_GETRULE` dumps).

use std::net::IpAddr;

use super::attr::get;
use super::builder::MessageBuilder;
use super::connection::dump_request;
use super::message::NlMsgType;
use super::parse::{FromNetlink, PResult, parse_attrs, parse_header, parse_ip_addr};
use super::types::{FibRuleHdr, fra};

#[derive(Debug, Clone, Default)]
pub struct RuleMessage {
    pub(crate) header: FibRuleHdr,
    pub(crate) priority: Option<u32>,
    pub(crate) source: Option<IpAddr>,
    pub(crate) destination: Option<IpAddr>,
    pub(crate) iifname: Option<String>,
    pub(crate) oifname: Option<String>,
    pub(crate) fwmark: Option<u32>,
    pub(crate) fwmask: Option<u32>,
    pub(crate) goto: Option<u32>,
    pub(crate) table: Option<u32>,
}

impl RuleMessage {
    pub fn family(&self) -> u8 {
        self.header.family
    }

    /// FR_ACT_* action.
    pub fn action(&self) -> u8 {
        self.header.action
    }

    /// FRA_PRIORITY; the kernel omits it for priority 0.
    pub fn priority(&self) -> u32 {
        self.priority.unwrap_or(0)
    }

    pub fn source(&self) -> Option<(IpAddr, u8)> {
        self.source.map(|a| (a, self.header.src_len))
    }

    pub fn destination(&self) -> Option<(IpAddr, u8)> {
        self.destination.map(|a| (a, self.header.dst_len))
    }

    pub fn iifname(&self) -> Option<&str> {
        self.iifname.as_deref()
    }

    pub fn oifname(&self) -> Option<&str> {
        self.oifname.as_deref()
    }

    pub fn fwmark(&self) -> Option<u32> {
        self.fwmark
    }

    pub fn fwmask(&self) -> Option<u32> {
        self.fwmask
    }

    pub fn goto(&self) -> Option<u32> {
        self.goto
    }

    /// Table id; FRA_TABLE overrides the 8-bit header field. 0 means none.
    pub fn table(&self) -> Option<u32> {
        Some(self.table.unwrap_or(u32::from(self.header.table))).filter(|&t| t != 0)
    }
}

impl FromNetlink for RuleMessage {
    fn parse(input: &mut &[u8]) -> PResult<Self> {
        let header: FibRuleHdr = parse_header(input)?;
        let mut msg = RuleMessage {
            header,
            ..Default::default()
        };

        for (kind, payload) in parse_attrs(input)? {
            match kind {
                fra::PRIORITY => msg.priority = get::u32_ne(payload).ok(),
                fra::SRC => msg.source = parse_ip_addr(payload, header.family).ok(),
                fra::DST => msg.destination = parse_ip_addr(payload, header.family).ok(),
                fra::IIFNAME => msg.iifname = get::string(payload).ok().map(str::to_string),
                fra::OIFNAME => msg.oifname = get::string(payload).ok().map(str::to_string),
                fra::FWMARK => msg.fwmark = get::u32_ne(payload).ok(),
                fra::FWMASK => msg.fwmask = get::u32_ne(payload).ok(),
                fra::GOTO => msg.goto = get::u32_ne(payload).ok(),
                fra::TABLE => msg.table = get::u32_ne(payload).ok(),
                _ => {}
            }
        }

        Ok(msg)
    }
}

/// Dump the rules of every address family.
pub fn dump_rules() -> MessageBuilder {
    let mut builder = dump_request(NlMsgType::RTM_GETRULE);
    builder.append(&FibRuleHdr::default());
    builder
}
