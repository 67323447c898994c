//! Generic Netlink connection with family resolution.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::os::unix::io::{AsRawFd, RawFd};

use super::header::GenlMsgHdr;
use super::transport::{Batch, GenlTransport, run_batch};
use super::{CtrlAttr, CtrlAttrMcastGrp, CtrlCmd, GENL_ID_CTRL};
use crate::netlink::attr::{AttrIter, get};
use crate::netlink::builder::MessageBuilder;
use crate::netlink::error::{Error, Result};
use crate::netlink::message::{NLM_F_ACK, NLM_F_REQUEST};
use crate::netlink::socket::{DEFAULT_RECV_BUFFER, Mode, NetlinkSocket, Protocol};

/// Information about a Generic Netlink family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyInfo {
    /// Dynamically assigned family ID (used as nlmsg_type).
    pub id: u16,
    /// Family version.
    pub version: u8,
    /// Header size (additional bytes after genlmsghdr).
    pub hdr_size: u32,
    /// Maximum attribute number.
    pub max_attr: u32,
    /// Multicast groups: name -> group ID.
    pub mcast_groups: HashMap<String, u32>,
}

impl FamilyInfo {
    /// Look up a multicast group ID by name.
    pub fn mcast_group(&self, name: &str) -> Option<u32> {
        self.mcast_groups.get(name).copied()
    }

    /// Parse the attributes of a `CTRL_CMD_NEWFAMILY` reply.
    pub fn parse(attrs: &[u8]) -> Result<Self> {
        let mut id: Option<u16> = None;
        let mut version: u8 = 0;
        let mut hdr_size: u32 = 0;
        let mut max_attr: u32 = 0;
        let mut mcast_groups = HashMap::new();

        for (attr_type, payload) in AttrIter::new(attrs) {
            match attr_type {
                t if t == CtrlAttr::FamilyId as u16 => {
                    id = Some(get::u16_ne(payload)?);
                }
                t if t == CtrlAttr::Version as u16 => {
                    version = get::u32_ne(payload)? as u8;
                }
                t if t == CtrlAttr::HdrSize as u16 => {
                    hdr_size = get::u32_ne(payload)?;
                }
                t if t == CtrlAttr::MaxAttr as u16 => {
                    max_attr = get::u32_ne(payload)?;
                }
                t if t == CtrlAttr::McastGroups as u16 => {
                    mcast_groups = parse_mcast_groups(payload)?;
                }
                _ => {}
            }
        }

        let id = id.ok_or_else(|| Error::InvalidMessage("missing family ID".into()))?;

        Ok(Self {
            id,
            version,
            hdr_size,
            max_attr,
            mcast_groups,
        })
    }
}

/// Parse multicast groups from CTRL_ATTR_MCAST_GROUPS.
fn parse_mcast_groups(data: &[u8]) -> Result<HashMap<String, u32>> {
    let mut groups = HashMap::new();

    // Array of nested entries, each holding a name and an ID.
    for (_idx, group_payload) in AttrIter::new(data) {
        let mut name: Option<String> = None;
        let mut grp_id: Option<u32> = None;

        for (attr_type, payload) in AttrIter::new(group_payload) {
            match attr_type {
                t if t == CtrlAttrMcastGrp::Name as u16 => {
                    name = Some(get::string(payload)?.to_string());
                }
                t if t == CtrlAttrMcastGrp::Id as u16 => {
                    grp_id = Some(get::u32_ne(payload)?);
                }
                _ => {}
            }
        }

        if let (Some(name), Some(id)) = (name, grp_id) {
            groups.insert(name, id);
        }
    }

    Ok(groups)
}

/// A generic netlink socket bound to one resolved family.
///
/// # Example
///
/// ```rust,no_run
/// use psample::netlink::genl::{GenlSocket, GenlTransport};
///
/// # fn example() -> psample::Result<()> {
/// let mut sock = GenlSocket::open("psample", 1)?;
/// sock.join_group("packets")?;
/// println!("packets group: {:?}", sock.family().mcast_group("packets"));
/// # Ok(())
/// # }
/// ```
pub struct GenlSocket {
    socket: NetlinkSocket,
    family: FamilyInfo,
    version: u8,
}

impl GenlSocket {
    /// Open a socket and resolve `name`, speaking protocol `version`.
    pub fn open(name: &str, version: u8) -> Result<Self> {
        Self::open_with_buffer(name, version, DEFAULT_RECV_BUFFER)
    }

    /// Like [`open`](Self::open) with an explicit receive buffer size.
    pub fn open_with_buffer(name: &str, version: u8, buf_size: usize) -> Result<Self> {
        let mut socket = NetlinkSocket::with_buffer(Protocol::Generic, buf_size)?;
        let family = query_family(&mut socket, name)?;

        if family.version < version {
            tracing::warn!(
                family = name,
                kernel = family.version,
                requested = version,
                "kernel family version is older than requested"
            );
        }
        tracing::debug!(family = name, id = family.id, pid = socket.pid(), "resolved family");

        Ok(Self {
            socket,
            family,
            version,
        })
    }

    /// Current receive mode.
    pub fn mode(&self) -> Mode {
        self.socket.mode()
    }
}

/// Resolve a family with `CTRL_CMD_GETFAMILY`.
fn query_family(socket: &mut NetlinkSocket, name: &str) -> Result<FamilyInfo> {
    let mut builder = MessageBuilder::new(GENL_ID_CTRL, NLM_F_REQUEST | NLM_F_ACK);
    builder.append(&GenlMsgHdr::new(CtrlCmd::GetFamily as u8, 1));
    builder.append_attr_str(CtrlAttr::FamilyName as u16, name);
    let seq = socket.next_seq();
    builder.set_seq(seq);
    builder.set_pid(socket.pid());
    socket.send(&builder.finish())?;

    let mut family = None;
    loop {
        let data = socket.recv()?;
        let end = run_batch::<(), _>(data, Some(seq), |header, payload| {
            if header.nlmsg_type != GENL_ID_CTRL {
                return Ok(ControlFlow::Continue(()));
            }
            let (_, attrs) = GenlMsgHdr::split(payload)
                .ok_or_else(|| Error::InvalidMessage("GENL header too short".into()))?;
            family = Some(FamilyInfo::parse(attrs)?);
            Ok(ControlFlow::Continue(()))
        });

        match end {
            Ok(Batch::More) => continue,
            Ok(_) => break,
            Err(e) if e.is_not_found() => {
                return Err(Error::FamilyNotFound {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.with_context(format!("resolve family {name}"))),
        }
    }

    family.ok_or_else(|| Error::FamilyNotFound {
        name: name.to_string(),
    })
}

impl GenlTransport for GenlSocket {
    fn family(&self) -> &FamilyInfo {
        &self.family
    }

    fn version(&self) -> u8 {
        self.version
    }

    fn pid(&self) -> u32 {
        self.socket.pid()
    }

    fn next_seq(&mut self) -> u32 {
        self.socket.next_seq()
    }

    fn add_membership(&mut self, group: u32) -> Result<()> {
        self.socket.add_membership(group)
    }

    fn send(&mut self, msg: &[u8]) -> Result<()> {
        self.socket.send(msg)
    }

    fn recv(&mut self) -> Result<&[u8]> {
        self.socket.recv()
    }

    fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.socket.set_mode(mode)
    }
}

impl AsRawFd for GenlSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}
