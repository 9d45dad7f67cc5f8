//! winnow combinators shared by the rtnetlink message parsers.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use winnow::binary::le_u16;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use super::attr::{NLA_HDRLEN, NLA_TYPE_MASK, nla_align};
use super::error::{Error, Result};

/// Result type for winnow parsers.
pub type PResult<T> = core::result::Result<T, ErrMode<ContextError>>;

/// Types parsed from the payload of one netlink message.
pub trait FromNetlink: Sized {
    /// Parse from a byte slice, advancing it past the consumed bytes.
    fn parse(input: &mut &[u8]) -> PResult<Self>;

    /// Parse from a complete message payload.
    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut input = data;
        Self::parse(&mut input).map_err(|e| Error::InvalidMessage(format!("parse error: {:?}", e)))
    }
}

pub(crate) fn cut() -> ErrMode<ContextError> {
    ErrMode::Cut(ContextError::new())
}

/// Parse the fixed family header (ifinfomsg, ifaddrmsg, rtmsg) at the start of a payload.
pub fn parse_header<T>(input: &mut &[u8]) -> PResult<T>
where
    T: FromBytes + KnownLayout + Immutable + Copy,
{
    let size = std::mem::size_of::<T>();
    let bytes: &[u8] = take(size).parse_next(input)?;
    let header = T::read_from_bytes(bytes).map_err(|_| cut())?;
    // Family headers are 4-byte aligned already; skip padding if any.
    let padding = nla_align(size) - size;
    if input.len() >= padding {
        let _: &[u8] = take(padding).parse_next(input)?;
    }
    Ok(header)
}

/// Parse one attribute and return `(type, payload)`.
pub fn parse_attr<'a>(input: &mut &'a [u8]) -> PResult<(u16, &'a [u8])> {
    let len = le_u16.parse_next(input)? as usize;
    let attr_type = le_u16.parse_next(input)?;

    if len < NLA_HDRLEN {
        return Err(cut());
    }

    let payload: &[u8] = take(len - NLA_HDRLEN).parse_next(input)?;
    let padding = nla_align(len) - len;
    if input.len() >= padding {
        let _: &[u8] = take(padding).parse_next(input)?;
    }

    Ok((attr_type & NLA_TYPE_MASK, payload))
}

/// Parse all remaining attributes, stopping at the first malformed one.
pub fn parse_attrs<'a>(input: &mut &'a [u8]) -> PResult<Vec<(u16, &'a [u8])>> {
    let mut attrs = Vec::new();
    while input.len() >= NLA_HDRLEN {
        match parse_attr(input) {
            Ok(attr) => attrs.push(attr),
            Err(_) => break,
        }
    }
    Ok(attrs)
}

/// Decode an address attribute according to the message's address family.
pub fn parse_ip_addr(data: &[u8], family: u8) -> Result<IpAddr> {
    match i32::from(family) {
        libc::AF_INET => {
            let octets: [u8; 4] = data
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or(Error::Truncated {
                    expected: 4,
                    actual: data.len(),
                })?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        libc::AF_INET6 => {
            let octets: [u8; 16] = data
                .get(..16)
                .and_then(|b| b.try_into().ok())
                .ok_or(Error::Truncated {
                    expected: 16,
                    actual: data.len(),
                })?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        other => Err(Error::InvalidAttribute(format!(
            "unsupported address family {}",
            other
        ))),
    }
}

/// Wire encoding of an address.
pub fn ip_octets(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Address family of an address.
pub fn ip_family(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => libc::AF_INET as u8,
        IpAddr::V6(_) => libc::AF_INET6 as u8,
    }
}
