//! Client library for the Linux `psample` packet sampling family.
//!
//! The kernel publishes packets sampled by `tc` sample actions and
//! sampling-capable switch drivers over the `psample` Generic Netlink
//! family. This crate resolves the family, subscribes to its multicast
//! groups, narrows delivery to one sampling group with an in-kernel BPF
//! filter, and decodes notifications into typed views. Raw datagrams can
//! also be written to a pcap file for Wireshark's netlink dissector.
//!
//! # Features
//!
//! - `serde` - `Serialize` for owned records and group descriptors
//! - `full` - All features enabled
//!
//! # Example
//!
//! ```rust,no_run
//! use std::ops::ControlFlow;
//! use psample::{Event, Mode, Session};
//!
//! fn main() -> psample::Result<()> {
//!     let mut session = Session::open()?;
//!
//!     loop {
//!         session.dispatch_events(Mode::Blocking, |event| {
//!             match event {
//!                 Event::Sample(s) if s.group_exist() => {
//!                     println!("group {} seq {}", s.group(), if s.seq_exist() { s.seq() } else { 0 });
//!                 }
//!                 Event::Config(c) => println!("config cmd {}", c.cmd()),
//!                 _ => {}
//!             }
//!             ControlFlow::<()>::Continue(())
//!         })?;
//!     }
//! }
//! ```
//!
//! # Async
//!
//! ```rust,no_run
//! use psample::{SampleStream, Session};
//! use tokio_stream::StreamExt;
//!
//! # async fn example() -> psample::Result<()> {
//! let mut stream = SampleStream::new(Session::open()?)?;
//! while let Some(event) = stream.next().await {
//!     println!("{:?}", event?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod netlink;

// Re-export common types at crate root for convenience
pub use netlink::genl::psample::{
    AttrTable, CaptureSink, ConfigRecord, ConfigView, Event, GroupDescriptor, GroupFilter,
    Handlers, OwnedEvent, PcapSink, SampleRecord, SampleStream, SampleView, Session,
    SessionBuilder,
};
pub use netlink::genl::{FamilyInfo, GenlSocket, GenlTransport};
pub use netlink::{Error, Mode, Result};
