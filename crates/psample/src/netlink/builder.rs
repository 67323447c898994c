//! Request construction.
//!
//! A [`MessageBuilder`] keeps the header apart from the body and joins the
//! two in [`finish`](MessageBuilder::finish), once the length is known.

use zerocopy::{Immutable, IntoBytes};

use super::attr::{NLA_F_NESTED, NlAttr, nla_align};
use super::message::{NLMSG_HDRLEN, NlMsgHdr, nlmsg_align};

/// Open nested attribute, closed by [`MessageBuilder::nest_end`].
#[derive(Debug, Clone, Copy)]
#[must_use = "a nest must be closed with nest_end"]
pub struct NestToken {
    offset: usize,
}

/// One netlink message under construction.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    header: NlMsgHdr,
    body: Vec<u8>,
}

impl MessageBuilder {
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Self {
            header: NlMsgHdr::new(msg_type, flags),
            body: Vec::with_capacity(64),
        }
    }

    /// Append a family header or other fixed payload, padded to 4 bytes.
    pub fn append<T: IntoBytes + Immutable>(&mut self, data: &T) {
        self.append_bytes(data.as_bytes());
    }

    pub fn append_bytes(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
        self.body.resize(nlmsg_align(self.body.len()), 0);
    }

    /// Append an attribute carrying `data`.
    pub fn append_attr(&mut self, kind: u16, data: &[u8]) {
        self.attr_header(kind, data.len());
        self.body.extend_from_slice(data);
        self.pad_attr();
    }

    pub fn append_attr_u16(&mut self, kind: u16, value: u16) {
        self.append_attr(kind, &value.to_ne_bytes());
    }

    pub fn append_attr_u32(&mut self, kind: u16, value: u32) {
        self.append_attr(kind, &value.to_ne_bytes());
    }

    pub fn append_attr_u64(&mut self, kind: u16, value: u64) {
        self.append_attr(kind, &value.to_ne_bytes());
    }

    /// Append a NUL-terminated string attribute.
    pub fn append_attr_str(&mut self, kind: u16, value: &str) {
        self.attr_header(kind, value.len() + 1);
        self.body.extend_from_slice(value.as_bytes());
        self.body.push(0);
        self.pad_attr();
    }

    /// Open a nested attribute.
    pub fn nest_start(&mut self, kind: u16) -> NestToken {
        let offset = self.body.len();
        self.attr_header(kind | NLA_F_NESTED, 0);
        NestToken { offset }
    }

    /// Close a nested attribute, fixing up its length.
    pub fn nest_end(&mut self, token: NestToken) {
        let len = (self.body.len() - token.offset) as u16;
        self.body[token.offset..token.offset + 2].copy_from_slice(&len.to_ne_bytes());
        self.pad_attr();
    }

    fn attr_header(&mut self, kind: u16, payload_len: usize) {
        self.body
            .extend_from_slice(NlAttr::new(kind, payload_len).as_bytes());
    }

    fn pad_attr(&mut self) {
        self.body.resize(nla_align(self.body.len()), 0);
    }

    pub fn set_seq(&mut self, seq: u32) {
        self.header.nlmsg_seq = seq;
    }

    pub fn seq(&self) -> u32 {
        self.header.nlmsg_seq
    }

    pub fn set_pid(&mut self, pid: u32) {
        self.header.nlmsg_pid = pid;
    }

    /// Set the total length and return the wire bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.header.nlmsg_len = (NLMSG_HDRLEN + self.body.len()) as u32;

        let mut msg = Vec::with_capacity(NLMSG_HDRLEN + self.body.len());
        msg.extend_from_slice(self.header.as_bytes());
        msg.resize(NLMSG_HDRLEN, 0);
        msg.extend_from_slice(&self.body);
        msg
    }
}
