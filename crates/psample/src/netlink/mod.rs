//! Synchronous netlink plumbing for the psample family.
//!
//! This module implements the pieces of the netlink protocol a psample
//! client needs: message and attribute framing, a `NETLINK_GENERIC`
//! socket with blocking and non-blocking receives, family resolution
//! through the generic netlink controller, and classic BPF socket
//! filters.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use psample::netlink::genl::{GenlSocket, GenlTransport};
//!
//! # fn example() -> psample::Result<()> {
//! let sock = GenlSocket::open("psample", 1)?;
//! for (name, id) in &sock.family().mcast_groups {
//!     println!("{name}: {id}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod attr;
pub mod bpf;
mod builder;
mod error;
pub mod genl;
pub mod message;
mod socket;

pub use attr::{AttrIter, NlAttr, StrictAttrIter};
pub use builder::{MessageBuilder, NestToken};
pub use error::{Error, Result};
pub use message::{MessageIter, NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use socket::{DEFAULT_RECV_BUFFER, Mode, NetlinkSocket, Protocol};
