//! The transport contract between a psample session and a netlink socket.

use std::ops::ControlFlow;
use std::os::unix::io::AsRawFd;

use super::connection::FamilyInfo;
use super::header::GenlMsgHdr;
use crate::netlink::bpf::{self, SockFilter};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::{Error, Result};
use crate::netlink::message::{MessageIter, NlMsgError, NlMsgHdr, NlMsgType};
use crate::netlink::socket::Mode;

/// A generic netlink connection bound to one resolved family.
///
/// [`GenlSocket`](super::GenlSocket) implements this over a real
/// `NETLINK_GENERIC` socket. The provided methods cover group
/// membership by name, request preparation and socket filters.
pub trait GenlTransport: AsRawFd {
    /// The family this connection was opened for.
    fn family(&self) -> &FamilyInfo;

    /// Protocol version put in outgoing GENL headers.
    fn version(&self) -> u8;

    /// Local port ID.
    fn pid(&self) -> u32;

    /// Allocate the next request sequence number.
    fn next_seq(&mut self) -> u32;

    /// Join a multicast group by numeric ID.
    fn add_membership(&mut self, group: u32) -> Result<()>;

    /// Send one finished message.
    fn send(&mut self, msg: &[u8]) -> Result<()>;

    /// Receive one datagram. The slice is valid until the next receive.
    fn recv(&mut self) -> Result<&[u8]>;

    /// Switch between blocking and non-blocking receives.
    fn set_mode(&mut self, mode: Mode) -> Result<()>;

    /// Join a multicast group advertised by the family.
    fn join_group(&mut self, name: &str) -> Result<()> {
        let id = self
            .family()
            .mcast_group(name)
            .ok_or_else(|| Error::GroupNotFound {
                name: name.to_string(),
            })?;
        self.add_membership(id)?;
        tracing::debug!(group = name, id, "joined multicast group");
        Ok(())
    }

    /// Prepare a request with an explicit message type and GENL header.
    ///
    /// Sequence number and port ID are filled in.
    fn prepare(&mut self, msg_type: u16, cmd: u8, version: u8, flags: u16) -> MessageBuilder {
        let mut builder = MessageBuilder::new(msg_type, flags);
        builder.append(&GenlMsgHdr::new(cmd, version));
        let seq = self.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.pid());
        builder
    }

    /// Prepare a request addressed to this connection's family.
    fn prepare_family(&mut self, cmd: u8, flags: u16) -> MessageBuilder {
        let id = self.family().id;
        let version = self.version();
        self.prepare(id, cmd, version, flags)
    }

    /// Attach a classic BPF program to the connection's descriptor.
    fn attach_filter(&mut self, program: &[SockFilter]) -> Result<()> {
        bpf::attach(self.as_raw_fd(), program)
    }

    /// Detach the program attached to the connection's descriptor.
    fn detach_filter(&mut self) -> Result<()> {
        bpf::detach(self.as_raw_fd())
    }
}

/// How a received datagram ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Batch<B> {
    /// Every message was processed; a multipart reply may continue.
    More,
    /// `NLMSG_DONE` or an ACK ended the exchange.
    Done,
    /// The callback stopped processing.
    Break(B),
}

/// Run `cb` over the data messages of one datagram.
///
/// `NLMSG_NOOP` and `NLMSG_OVERRUN` are skipped, `NLMSG_DONE` and ACKs end
/// the batch, a non-zero `NLMSG_ERROR` is returned as a kernel error. When
/// `seq` is given, messages carrying another non-zero sequence number are
/// ignored; multicast notifications carry sequence zero.
pub fn run_batch<B, F>(data: &[u8], seq: Option<u32>, mut cb: F) -> Result<Batch<B>>
where
    F: FnMut(&NlMsgHdr, &[u8]) -> Result<ControlFlow<B>>,
{
    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if let Some(seq) = seq
            && header.nlmsg_seq != 0
            && header.nlmsg_seq != seq
        {
            continue;
        }

        match header.nlmsg_type {
            NlMsgType::NOOP | NlMsgType::OVERRUN => continue,
            NlMsgType::ERROR => {
                let err = NlMsgError::from_bytes(payload)?;
                if err.is_ack() {
                    return Ok(Batch::Done);
                }
                return Err(Error::from_errno(err.error));
            }
            NlMsgType::DONE => return Ok(Batch::Done),
            _ => {}
        }

        if let ControlFlow::Break(b) = cb(header, payload)? {
            return Ok(Batch::Break(b));
        }
    }

    Ok(Batch::More)
}
