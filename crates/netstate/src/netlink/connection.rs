//! Request/response handling on top of [`NetlinkSocket`].

use std::path::Path;

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{
    MessageIter, NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_REQUEST, NlMsgError,
};
use super::parse::FromNetlink;
use super::socket::NetlinkSocket;

/// rtnetlink connection. One request is in flight at a time.
pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new()?,
        })
    }

    /// Connection whose socket lives in the namespace at `ns_path`.
    pub fn new_in_namespace_path<P: AsRef<Path>>(ns_path: P) -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new_in_namespace_path(ns_path)?,
        })
    }

    /// Send a request and return the payloads of every reply message.
    pub async fn request(&self, builder: MessageBuilder) -> Result<Vec<Vec<u8>>> {
        let seq = self.send(builder).await?;

        loop {
            let data = self.socket.recv_msg().await?;
            let mut replies = Vec::new();

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;
                if header.nlmsg_seq != seq {
                    continue;
                }
                if header.is_error() {
                    let err = NlMsgError::from_bytes(payload)?;
                    if !err.is_ack() {
                        return Err(Error::from_errno(err.error));
                    }
                    continue;
                }
                replies.push(payload.to_vec());
            }

            if !replies.is_empty() {
                return Ok(replies);
            }
        }
    }

    /// Send a request that expects an ACK only.
    pub async fn request_ack(&self, builder: MessageBuilder) -> Result<()> {
        let seq = self.send(builder).await?;

        loop {
            let data = self.socket.recv_msg().await?;

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;
                if header.nlmsg_seq != seq || !header.is_error() {
                    continue;
                }
                let err = NlMsgError::from_bytes(payload)?;
                if !err.is_ack() {
                    return Err(Error::from_errno(err.error));
                }
                return Ok(());
            }
        }
    }

    /// Send a dump request and collect the payloads of all parts.
    pub async fn dump(&self, builder: MessageBuilder) -> Result<Vec<Vec<u8>>> {
        let seq = self.send(builder).await?;
        let mut responses = Vec::new();

        loop {
            let data = self.socket.recv_msg().await?;

            for result in MessageIter::new(&data) {
                let (header, payload) = result?;
                if header.nlmsg_seq != seq {
                    continue;
                }
                if header.is_error() {
                    let err = NlMsgError::from_bytes(payload)?;
                    if !err.is_ack() {
                        return Err(Error::from_errno(err.error));
                    }
                    continue;
                }
                if header.is_done() {
                    return Ok(responses);
                }
                responses.push(payload.to_vec());
            }
        }
    }

    /// Dump and parse every part into `T`. Parts that fail to parse are skipped.
    pub async fn dump_typed<T: FromNetlink>(&self, builder: MessageBuilder) -> Result<Vec<T>> {
        let responses = self.dump(builder).await?;
        let mut parsed = Vec::with_capacity(responses.len());
        for payload in responses {
            match T::from_bytes(&payload) {
                Ok(msg) => parsed.push(msg),
                Err(e) => tracing::debug!(error = %e, "skipping unparsable dump entry"),
            }
        }
        Ok(parsed)
    }

    /// Send a request answered by exactly one `T`.
    pub async fn request_typed<T: FromNetlink>(&self, builder: MessageBuilder) -> Result<T> {
        let replies = self.request(builder).await?;
        let first = replies
            .first()
            .ok_or_else(|| Error::InvalidMessage("empty reply".into()))?;
        T::from_bytes(first)
    }

    async fn send(&self, mut builder: MessageBuilder) -> Result<u32> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());
        self.socket.send(&builder.finish()).await?;
        Ok(seq)
    }
}

/// Builder for a dump request.
pub fn dump_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_DUMP)
}

/// Builder for a request answered by a data message.
pub fn get_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST)
}

/// Builder for a request expecting an ACK.
pub fn ack_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_ACK)
}

/// Builder for an exclusive create request expecting an ACK.
pub fn create_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(
        msg_type,
        NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
    )
}
