//! Generic Netlink (GENL) support.
//!
//! psample is a generic netlink family: its message type and multicast
//! group IDs are assigned at module load and looked up by name through the
//! controller family before anything else can be sent.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ psample::Session                        │
//! │ (event + control connection, filter)    │
//! └────────────────┬────────────────────────┘
//!                  │ GenlTransport
//! ┌────────────────▼────────────────────────┐
//! │ GenlSocket                              │
//! │ (family id, version, mcast groups)      │
//! └────────────────┬────────────────────────┘
//!                  │
//! ┌────────────────▼────────────────────────┐
//! │ NetlinkSocket (Protocol::Generic)       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use psample::netlink::genl::{GenlSocket, GenlTransport};
//!
//! # fn example() -> psample::Result<()> {
//! let sock = GenlSocket::open("psample", 1)?;
//! println!("psample family ID: {}", sock.family().id);
//! # Ok(())
//! # }
//! ```

mod connection;
mod header;
mod transport;

pub use connection::{FamilyInfo, GenlSocket};
pub use header::{GENL_HDRLEN, GenlMsgHdr};
pub use transport::{Batch, GenlTransport, run_batch};

pub mod psample;

/// Family ID of the generic netlink controller.
pub const GENL_ID_CTRL: u16 = 0x10;

/// Controller commands used for family resolution.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlCmd {
    NewFamily = 1,
    GetFamily = 3,
}

/// Controller attributes (`CTRL_ATTR_*`).
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttr {
    FamilyId = 1,
    FamilyName = 2,
    Version = 3,
    HdrSize = 4,
    MaxAttr = 5,
    McastGroups = 7,
}

/// Attributes of one entry in `CTRL_ATTR_MCAST_GROUPS`.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlAttrMcastGrp {
    Name = 1,
    Id = 2,
}
