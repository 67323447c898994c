//! Per-message attribute table.

use super::{PSAMPLE_ATTR_MAX, PsampleAttr};
use crate::netlink::attr::{StrictAttrIter, get};
use crate::netlink::error::{Error, Result};

const SLOTS: usize = PSAMPLE_ATTR_MAX as usize + 1;

/// Attributes of one psample message, indexed by attribute ID.
///
/// Entries borrow the receive buffer. An attribute ID above
/// [`PSAMPLE_ATTR_MAX`] or a fixed-width attribute shorter than its type
/// fails the whole parse. Repeated IDs keep the last occurrence.
#[derive(Debug, Clone, Copy)]
pub struct AttrTable<'a> {
    slots: [Option<&'a [u8]>; SLOTS],
}

/// Minimum payload size enforced at parse time, if any.
fn required_len(kind: u16) -> Option<usize> {
    const IIF: u16 = PsampleAttr::IifIndex as u16;
    const OIF: u16 = PsampleAttr::OifIndex as u16;
    const RATE: u16 = PsampleAttr::SampleRate as u16;
    const ORIGSIZE: u16 = PsampleAttr::OrigSize as u16;
    const GROUP: u16 = PsampleAttr::SampleGroup as u16;
    const SEQ: u16 = PsampleAttr::GroupSeq as u16;
    const REFCOUNT: u16 = PsampleAttr::GroupRefcount as u16;

    match kind {
        IIF | OIF => Some(2),
        RATE | ORIGSIZE | GROUP | SEQ | REFCOUNT => Some(4),
        _ => None,
    }
}

impl<'a> AttrTable<'a> {
    /// Parse the attribute stream following the GENL header.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut slots = [None; SLOTS];

        for attr in StrictAttrIter::new(data) {
            let (kind, payload) = attr?;
            if kind > PSAMPLE_ATTR_MAX {
                return Err(Error::InvalidAttribute(format!(
                    "attribute {} out of range (max {})",
                    kind, PSAMPLE_ATTR_MAX
                )));
            }
            if let Some(min) = required_len(kind)
                && payload.len() < min
            {
                return Err(Error::InvalidAttribute(format!(
                    "attribute {} is {} bytes, expected {}",
                    kind,
                    payload.len(),
                    min
                )));
            }
            slots[kind as usize] = Some(payload);
        }

        Ok(Self { slots })
    }

    /// Payload of an attribute, if present.
    pub fn get(&self, attr: PsampleAttr) -> Option<&'a [u8]> {
        self.slots[attr as usize]
    }

    /// Whether an attribute is present.
    pub fn contains(&self, attr: PsampleAttr) -> bool {
        self.get(attr).is_some()
    }

    /// Value of a u16 attribute; `None` when absent or short.
    pub fn u16(&self, attr: PsampleAttr) -> Option<u16> {
        self.get(attr).and_then(|p| get::u16_ne(p).ok())
    }

    /// Value of a u32 attribute; `None` when absent or short.
    pub fn u32(&self, attr: PsampleAttr) -> Option<u32> {
        self.get(attr).and_then(|p| get::u32_ne(p).ok())
    }

    /// Value of a u64 attribute; `None` when absent or short.
    pub fn u64(&self, attr: PsampleAttr) -> Option<u64> {
        self.get(attr).and_then(|p| get::u64_ne(p).ok())
    }

    /// Number of attributes present.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether the message carried no attributes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
