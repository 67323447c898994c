//! Packet sampling notifications via Generic Netlink.
//!
//! The kernel's `psample` family multicasts every sampled packet (from
//! `tc` sample actions, switch ASIC sampling, ...) on its `packets` group
//! and group lifecycle changes on its `config` group. A [`Session`] joins
//! both, optionally narrows delivery to one sampling group with an
//! in-kernel socket filter, and hands decoded events to closures.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::ops::ControlFlow;
//! use psample::{Handlers, Mode, Session};
//!
//! # fn example() -> psample::Result<()> {
//! let mut session = Session::open()?;
//! session.bind_group(7)?;
//!
//! let mut seen = 0;
//! let mut handlers = Handlers::new().on_sample(|sample| {
//!     if sample.iif_exist() {
//!         println!("group {} from ifindex {}", sample.group(), sample.iif());
//!     }
//!     seen += 1;
//!     if seen == 10 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
//! });
//! while session.dispatch(&mut handlers, Mode::Blocking)?.is_continue() {}
//! # Ok(())
//! # }
//! ```
//!
//! # Listing groups
//!
//! ```rust,no_run
//! # fn example() -> psample::Result<()> {
//! let mut session = psample::Session::open()?;
//! for group in session.groups()? {
//!     println!("group {} refcount {} seq {}", group.num, group.refcount, group.seq);
//! }
//! # Ok(())
//! # }
//! ```

mod capture;
mod filter;
mod session;
mod stream;
mod table;
mod types;

pub use capture::{COOKED_HDRLEN, CaptureSink, CookedHeader, DEFAULT_SNAPLEN, PcapSink, frame_len};
pub use filter::GroupFilter;
pub use session::{Handlers, Session, SessionBuilder};
pub use stream::SampleStream;
pub use table::AttrTable;
pub use types::{
    ConfigRecord, ConfigView, Event, GroupDescriptor, OwnedEvent, SampleRecord, SampleView,
};

/// psample Generic Netlink family name.
pub const PSAMPLE_GENL_NAME: &str = "psample";

/// psample Generic Netlink version.
pub const PSAMPLE_GENL_VERSION: u8 = 1;

/// Multicast group carrying group lifecycle notifications.
pub const PSAMPLE_NL_MCGRP_CONFIG_NAME: &str = "config";

/// Multicast group carrying sampled packets.
pub const PSAMPLE_NL_MCGRP_SAMPLE_NAME: &str = "packets";

/// psample GENL commands.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsampleCmd {
    /// A sampled packet.
    Sample = 0,
    /// Get or dump sampling groups.
    GetGroup = 1,
    /// A sampling group was created.
    NewGroup = 2,
    /// A sampling group was destroyed.
    DelGroup = 3,
}

impl PsampleCmd {
    /// Map a raw command byte, if known.
    pub fn from_u8(cmd: u8) -> Option<Self> {
        match cmd {
            0 => Some(Self::Sample),
            1 => Some(Self::GetGroup),
            2 => Some(Self::NewGroup),
            3 => Some(Self::DelGroup),
            _ => None,
        }
    }
}

/// psample attributes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsampleAttr {
    IifIndex = 0,
    OifIndex = 1,
    OrigSize = 2,
    SampleGroup = 3,
    GroupSeq = 4,
    SampleRate = 5,
    Data = 6,
    GroupRefcount = 7,
    Tunnel = 8,
    Pad = 9,
    /// Egress traffic class (u16).
    OutTc = 10,
    /// Egress queue occupancy in bytes (u64).
    OutTcOcc = 11,
    /// Transit latency in nanoseconds (u64).
    Latency = 12,
    /// Sampling timestamp in nanoseconds (u64).
    Timestamp = 13,
    /// Ethertype of the sampled packet (u16).
    Proto = 14,
    /// Opaque cookie set by the sampling action.
    UserCookie = 15,
    /// Flag: the rate is a probability rather than 1-in-N.
    SampleProbability = 16,
}

/// Highest attribute ID accepted in a psample message.
pub const PSAMPLE_ATTR_MAX: u16 = PsampleAttr::SampleProbability as u16;
