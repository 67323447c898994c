//! Generic netlink family header.
//!
//! Four bytes between the netlink header and the attributes:
//!
//! ```text
//! nlmsghdr (16) | cmd (1) version (1) reserved (2) | attributes ...
//! ```

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// `struct genlmsghdr`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct GenlMsgHdr {
    pub cmd: u8,
    pub version: u8,
    pub reserved: u16,
}

/// Size of the GENL header in bytes.
pub const GENL_HDRLEN: usize = std::mem::size_of::<GenlMsgHdr>();

impl GenlMsgHdr {
    pub const fn new(cmd: u8, version: u8) -> Self {
        Self {
            cmd,
            version,
            reserved: 0,
        }
    }

    /// Copy the header off the front of a message payload.
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        Self::read_from_prefix(payload).ok().map(|(hdr, _)| hdr)
    }

    /// Split a message payload into the header and its attribute bytes.
    pub fn split(payload: &[u8]) -> Option<(Self, &[u8])> {
        Self::read_from_prefix(payload).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }
}
