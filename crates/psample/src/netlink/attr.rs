//! Netlink attribute (nlattr) framing.
//!
//! Attributes are type-length-value records padded to four bytes. The
//! type's two top bits are flags and never part of the attribute ID.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

/// Round `len` up to the attribute alignment.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + 3) & !3
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = nla_align(std::mem::size_of::<NlAttr>());

pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
/// Bits of `nla_type` that carry the attribute ID.
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// `struct nlattr`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including this header, excluding padding.
    pub nla_len: u16,
    pub nla_type: u16,
}

impl NlAttr {
    /// Header for an attribute with `data_len` payload bytes.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Attribute ID with the flag bits cleared.
    pub fn kind(&self) -> u16 {
        self.nla_type & NLA_TYPE_MASK
    }

    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(attr, _)| attr)
            .map_err(|_| Error::Truncated {
                expected: NLA_HDRLEN,
                actual: data.len(),
            })
    }
}

/// Iterator over netlink attributes in a buffer.
///
/// Stops silently at the first malformed attribute. Use [`StrictAttrIter`]
/// when a malformed attribute must fail the parse.
pub struct AttrIter<'a> {
    data: &'a [u8],
}

impl<'a> AttrIter<'a> {
    /// Create a new attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Check if there are no more attributes.
    pub fn is_empty(&self) -> bool {
        self.data.len() < NLA_HDRLEN
    }
}

impl<'a> Iterator for AttrIter<'a> {
    /// Returns (attribute type, payload data).
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        match next_attr(&mut self.data) {
            Some(Ok(item)) => Some(item),
            _ => None,
        }
    }
}

/// Attribute iterator that reports malformed attributes.
///
/// Yields one `Err` for a truncated header or a length running past the
/// buffer, then ends.
pub struct StrictAttrIter<'a> {
    data: &'a [u8],
}

impl<'a> StrictAttrIter<'a> {
    /// Create a new strict attribute iterator.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for StrictAttrIter<'a> {
    type Item = Result<(u16, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = next_attr(&mut self.data);
        if matches!(item, Some(Err(_))) {
            self.data = &[];
        }
        item
    }
}

fn next_attr<'a>(data: &mut &'a [u8]) -> Option<Result<(u16, &'a [u8])>> {
    if data.is_empty() {
        return None;
    }

    let attr = match NlAttr::from_bytes(data) {
        Ok(a) => a,
        Err(e) => return Some(Err(e)),
    };

    let len = attr.nla_len as usize;
    if len < NLA_HDRLEN || len > data.len() {
        return Some(Err(Error::InvalidAttribute(format!(
            "attribute {} has invalid length {} ({} bytes left)",
            attr.kind(),
            len,
            data.len()
        ))));
    }

    let payload = &data[NLA_HDRLEN..len];
    let kind = attr.kind();
    let aligned_len = nla_align(len);

    // Move to next attribute
    if aligned_len >= data.len() {
        *data = &[];
    } else {
        *data = &data[aligned_len..];
    }

    Some(Ok((kind, payload)))
}

/// Typed reads of attribute payloads.
///
/// Integers are host byte order. Payload bytes past the integer's width
/// are ignored, as the kernel's own `nla_get_*` helpers do.
pub mod get {
    use super::*;

    fn array<const N: usize>(data: &[u8], what: &str) -> Result<[u8; N]> {
        data.get(..N)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| {
                Error::InvalidAttribute(format!(
                    "{} attribute needs {} bytes, has {}",
                    what,
                    N,
                    data.len()
                ))
            })
    }

    pub fn u16_ne(data: &[u8]) -> Result<u16> {
        array(data, "u16").map(u16::from_ne_bytes)
    }

    pub fn u32_ne(data: &[u8]) -> Result<u32> {
        array(data, "u32").map(u32::from_ne_bytes)
    }

    pub fn u64_ne(data: &[u8]) -> Result<u64> {
        array(data, "u64").map(u64::from_ne_bytes)
    }

    /// A string up to its NUL terminator, or the whole payload if none.
    pub fn string(data: &[u8]) -> Result<&str> {
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        std::str::from_utf8(&data[..end])
            .map_err(|e| Error::InvalidAttribute(format!("invalid UTF-8: {}", e)))
    }
}
