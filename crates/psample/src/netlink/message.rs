//! Netlink message framing.
//!
//! One datagram from the kernel may carry several messages back to back,
//! each padded to four bytes. [`MessageIter`] splits them.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Round `len` up to the netlink message alignment.
#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + 3) & !3
}

/// Size of the netlink message header.
pub const NLMSG_HDRLEN: usize = nlmsg_align(std::mem::size_of::<NlMsgHdr>());

/// Netlink message header (mirrors struct nlmsghdr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    /// Length of message including header.
    pub nlmsg_len: u32,
    /// Message type: a family ID or one of [`NlMsgType`].
    pub nlmsg_type: u16,
    pub nlmsg_flags: u16,
    pub nlmsg_seq: u32,
    /// Port ID of the sender, 0 for the kernel.
    pub nlmsg_pid: u32,
}

impl NlMsgHdr {
    /// Header of an empty message.
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            ..Default::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.nlmsg_type == NlMsgType::DONE
    }

    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Borrow the header at the start of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(hdr, _)| hdr)
            .map_err(|_| Error::Truncated {
                expected: NLMSG_HDRLEN,
                actual: data.len(),
            })
    }
}

/// Control message types shared by every netlink family.
pub struct NlMsgType;

impl NlMsgType {
    pub const NOOP: u16 = 1;
    /// Error report; an error code of zero is an ACK.
    pub const ERROR: u16 = 2;
    /// End of a dump.
    pub const DONE: u16 = 3;
    pub const OVERRUN: u16 = 4;
}

pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_ACK: u16 = 0x04;
/// `NLM_F_ROOT | NLM_F_MATCH`: return every object.
pub const NLM_F_DUMP: u16 = 0x100 | 0x200;

/// Splits a datagram into `(header, payload)` pairs.
///
/// A message whose length is shorter than its header or runs past the end
/// of the datagram yields one error and ends the iteration. Trailing bytes
/// too short for a header are ignored.
pub struct MessageIter<'a> {
    data: &'a [u8],
}

impl<'a> MessageIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<(&'a NlMsgHdr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < NLMSG_HDRLEN {
            return None;
        }
        let data = std::mem::take(&mut self.data);

        let header = match NlMsgHdr::from_bytes(data) {
            Ok(header) => header,
            Err(e) => return Some(Err(e)),
        };
        let len = header.nlmsg_len as usize;
        if len < NLMSG_HDRLEN || len > data.len() {
            return Some(Err(Error::InvalidMessage(format!(
                "message length {} out of bounds ({} bytes left)",
                len,
                data.len()
            ))));
        }

        self.data = data.get(nlmsg_align(len)..).unwrap_or_default();
        Some(Ok((header, &data[NLMSG_HDRLEN..len])))
    }
}

/// Payload of an `NLMSG_ERROR` message.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
pub struct NlMsgError {
    /// Negative errno, or 0 for an ACK.
    pub error: i32,
    /// Header of the request being answered.
    pub msg: NlMsgHdr,
}

impl NlMsgError {
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(err, _)| err)
            .map_err(|_| Error::Truncated {
                expected: std::mem::size_of::<Self>(),
                actual: data.len(),
            })
    }

    pub fn is_ack(&self) -> bool {
        self.error == 0
    }
}
