//! psample event views and owned records.

#[cfg(feature = "serde")]
use serde::Serialize;

use super::table::AttrTable;
use super::{PsampleAttr, PsampleCmd};
use crate::netlink::error::{Error, Result};

#[track_caller]
fn present<T>(value: Option<T>, name: &str) -> T {
    match value {
        Some(v) => v,
        None => panic!("psample attribute {name} is absent; check *_exist() first"),
    }
}

/// A sampled packet, borrowed from the receive buffer.
///
/// Every field is optional on the wire. Query `*_exist()` before reading;
/// reading an absent field panics.
#[derive(Debug, Clone, Copy)]
pub struct SampleView<'a> {
    table: AttrTable<'a>,
}

impl<'a> SampleView<'a> {
    /// Wrap a decoded table.
    pub fn new(table: AttrTable<'a>) -> Self {
        Self { table }
    }

    /// The underlying attribute table.
    pub fn table(&self) -> &AttrTable<'a> {
        &self.table
    }

    pub fn group_exist(&self) -> bool {
        self.table.contains(PsampleAttr::SampleGroup)
    }

    /// Sampling group number.
    #[track_caller]
    pub fn group(&self) -> u32 {
        present(self.table.u32(PsampleAttr::SampleGroup), "group")
    }

    pub fn rate_exist(&self) -> bool {
        self.table.contains(PsampleAttr::SampleRate)
    }

    /// Sampling rate (1-in-N, or a probability if
    /// [`sample_probability`](Self::sample_probability) is set).
    #[track_caller]
    pub fn rate(&self) -> u32 {
        present(self.table.u32(PsampleAttr::SampleRate), "rate")
    }

    pub fn iif_exist(&self) -> bool {
        self.table.contains(PsampleAttr::IifIndex)
    }

    /// Ingress interface index.
    #[track_caller]
    pub fn iif(&self) -> u16 {
        present(self.table.u16(PsampleAttr::IifIndex), "iif")
    }

    pub fn oif_exist(&self) -> bool {
        self.table.contains(PsampleAttr::OifIndex)
    }

    /// Egress interface index.
    #[track_caller]
    pub fn oif(&self) -> u16 {
        present(self.table.u16(PsampleAttr::OifIndex), "oif")
    }

    pub fn origsize_exist(&self) -> bool {
        self.table.contains(PsampleAttr::OrigSize)
    }

    /// Length of the packet before truncation.
    #[track_caller]
    pub fn origsize(&self) -> u32 {
        present(self.table.u32(PsampleAttr::OrigSize), "origsize")
    }

    pub fn seq_exist(&self) -> bool {
        self.table.contains(PsampleAttr::GroupSeq)
    }

    /// Per-group sequence number.
    #[track_caller]
    pub fn seq(&self) -> u32 {
        present(self.table.u32(PsampleAttr::GroupSeq), "seq")
    }

    pub fn data_exist(&self) -> bool {
        self.table.contains(PsampleAttr::Data)
    }

    /// The sampled bytes, starting at the link-layer header.
    #[track_caller]
    pub fn data(&self) -> &'a [u8] {
        present(self.table.get(PsampleAttr::Data), "data")
    }

    pub fn out_tc_exist(&self) -> bool {
        self.table.u16(PsampleAttr::OutTc).is_some()
    }

    /// Egress traffic class.
    #[track_caller]
    pub fn out_tc(&self) -> u16 {
        present(self.table.u16(PsampleAttr::OutTc), "out_tc")
    }

    pub fn out_tc_occ_exist(&self) -> bool {
        self.table.u64(PsampleAttr::OutTcOcc).is_some()
    }

    /// Egress queue occupancy in bytes.
    #[track_caller]
    pub fn out_tc_occ(&self) -> u64 {
        present(self.table.u64(PsampleAttr::OutTcOcc), "out_tc_occ")
    }

    pub fn latency_exist(&self) -> bool {
        self.table.u64(PsampleAttr::Latency).is_some()
    }

    /// Transit latency in nanoseconds.
    #[track_caller]
    pub fn latency(&self) -> u64 {
        present(self.table.u64(PsampleAttr::Latency), "latency")
    }

    pub fn timestamp_exist(&self) -> bool {
        self.table.u64(PsampleAttr::Timestamp).is_some()
    }

    /// Sampling time in nanoseconds.
    #[track_caller]
    pub fn timestamp(&self) -> u64 {
        present(self.table.u64(PsampleAttr::Timestamp), "timestamp")
    }

    pub fn proto_exist(&self) -> bool {
        self.table.u16(PsampleAttr::Proto).is_some()
    }

    /// Ethertype of the sampled packet.
    #[track_caller]
    pub fn proto(&self) -> u16 {
        present(self.table.u16(PsampleAttr::Proto), "proto")
    }

    pub fn user_cookie_exist(&self) -> bool {
        self.table.contains(PsampleAttr::UserCookie)
    }

    /// Cookie attached by the sampling action.
    #[track_caller]
    pub fn user_cookie(&self) -> &'a [u8] {
        present(self.table.get(PsampleAttr::UserCookie), "user_cookie")
    }

    pub fn tunnel_exist(&self) -> bool {
        self.table.contains(PsampleAttr::Tunnel)
    }

    /// Tunnel metadata, as the raw nested attribute stream.
    #[track_caller]
    pub fn tunnel(&self) -> &'a [u8] {
        present(self.table.get(PsampleAttr::Tunnel), "tunnel")
    }

    /// Whether [`rate`](Self::rate) is a probability.
    pub fn sample_probability(&self) -> bool {
        self.table.contains(PsampleAttr::SampleProbability)
    }
}

/// A group lifecycle notification, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct ConfigView<'a> {
    cmd: u8,
    table: AttrTable<'a>,
}

impl<'a> ConfigView<'a> {
    /// Wrap a decoded table with its GENL command.
    pub fn new(cmd: u8, table: AttrTable<'a>) -> Self {
        Self { cmd, table }
    }

    /// Raw GENL command.
    pub fn cmd(&self) -> u8 {
        self.cmd
    }

    /// The command, if it is one psample defines.
    pub fn command(&self) -> Option<PsampleCmd> {
        PsampleCmd::from_u8(self.cmd)
    }

    pub fn group_exist(&self) -> bool {
        self.table.contains(PsampleAttr::SampleGroup)
    }

    #[track_caller]
    pub fn group(&self) -> u32 {
        present(self.table.u32(PsampleAttr::SampleGroup), "group")
    }

    pub fn group_seq_exist(&self) -> bool {
        self.table.contains(PsampleAttr::GroupSeq)
    }

    #[track_caller]
    pub fn group_seq(&self) -> u32 {
        present(self.table.u32(PsampleAttr::GroupSeq), "group_seq")
    }

    pub fn group_refcount_exist(&self) -> bool {
        self.table.contains(PsampleAttr::GroupRefcount)
    }

    #[track_caller]
    pub fn group_refcount(&self) -> u32 {
        present(self.table.u32(PsampleAttr::GroupRefcount), "group_refcount")
    }
}

/// A decoded psample notification.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// `PSAMPLE_CMD_SAMPLE`.
    Sample(SampleView<'a>),
    /// Any other command.
    Config(ConfigView<'a>),
}

impl<'a> Event<'a> {
    /// Classify a message by its GENL command.
    pub fn classify(cmd: u8, table: AttrTable<'a>) -> Self {
        if cmd == PsampleCmd::Sample as u8 {
            Event::Sample(SampleView::new(table))
        } else {
            Event::Config(ConfigView::new(cmd, table))
        }
    }

    /// Copy the event out of the receive buffer.
    pub fn to_owned_event(&self) -> OwnedEvent {
        match self {
            Event::Sample(s) => OwnedEvent::Sample(SampleRecord::from(s)),
            Event::Config(c) => OwnedEvent::Config(ConfigRecord::from(c)),
        }
    }
}

/// One sampling group as reported by `PSAMPLE_CMD_GET_GROUP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GroupDescriptor {
    /// Group number.
    pub num: u32,
    /// Number of sampling actions using the group.
    pub refcount: u32,
    /// Sequence number of the last sample.
    pub seq: u32,
}

impl GroupDescriptor {
    /// Build a descriptor; all three attributes are mandatory.
    pub fn from_table(table: &AttrTable<'_>) -> Result<Self> {
        let field = |attr, name| {
            table
                .u32(attr)
                .ok_or(Error::MissingAttribute { name })
        };
        Ok(Self {
            num: field(PsampleAttr::SampleGroup, "PSAMPLE_ATTR_SAMPLE_GROUP")?,
            refcount: field(PsampleAttr::GroupRefcount, "PSAMPLE_ATTR_GROUP_REFCOUNT")?,
            seq: field(PsampleAttr::GroupSeq, "PSAMPLE_ATTR_GROUP_SEQ")?,
        })
    }
}

/// Owned copy of a [`SampleView`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SampleRecord {
    pub group: Option<u32>,
    pub rate: Option<u32>,
    pub iif: Option<u16>,
    pub oif: Option<u16>,
    pub origsize: Option<u32>,
    pub seq: Option<u32>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub data: Vec<u8>,
    pub out_tc: Option<u16>,
    pub out_tc_occ: Option<u64>,
    pub latency: Option<u64>,
    pub timestamp: Option<u64>,
    pub proto: Option<u16>,
    pub user_cookie: Option<Vec<u8>>,
    pub sample_probability: bool,
}

impl From<&SampleView<'_>> for SampleRecord {
    fn from(view: &SampleView<'_>) -> Self {
        let t = view.table();
        Self {
            group: t.u32(PsampleAttr::SampleGroup),
            rate: t.u32(PsampleAttr::SampleRate),
            iif: t.u16(PsampleAttr::IifIndex),
            oif: t.u16(PsampleAttr::OifIndex),
            origsize: t.u32(PsampleAttr::OrigSize),
            seq: t.u32(PsampleAttr::GroupSeq),
            data: t.get(PsampleAttr::Data).map(<[u8]>::to_vec).unwrap_or_default(),
            out_tc: t.u16(PsampleAttr::OutTc),
            out_tc_occ: t.u64(PsampleAttr::OutTcOcc),
            latency: t.u64(PsampleAttr::Latency),
            timestamp: t.u64(PsampleAttr::Timestamp),
            proto: t.u16(PsampleAttr::Proto),
            user_cookie: t.get(PsampleAttr::UserCookie).map(<[u8]>::to_vec),
            sample_probability: view.sample_probability(),
        }
    }
}

/// Owned copy of a [`ConfigView`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ConfigRecord {
    pub cmd: u8,
    pub group: Option<u32>,
    pub group_seq: Option<u32>,
    pub group_refcount: Option<u32>,
}

impl From<&ConfigView<'_>> for ConfigRecord {
    fn from(view: &ConfigView<'_>) -> Self {
        Self {
            cmd: view.cmd(),
            group: view.table.u32(PsampleAttr::SampleGroup),
            group_seq: view.table.u32(PsampleAttr::GroupSeq),
            group_refcount: view.table.u32(PsampleAttr::GroupRefcount),
        }
    }
}

/// Owned copy of an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "event", rename_all = "snake_case"))]
pub enum OwnedEvent {
    Sample(SampleRecord),
    Config(ConfigRecord),
}
