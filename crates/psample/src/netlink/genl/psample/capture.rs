//! pcap output of raw psample datagrams.
//!
//! Each frame is a Linux cooked (SLL) header followed by the netlink
//! datagram, the layout Wireshark's netlink dissector expects for
//! `LINKTYPE_NETLINK` captures.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use byteorder::NativeEndian;
use pcap_file::pcap::{PcapHeader, PcapPacket};
use pcap_file::{DataLink, Endianness, TsResolution};
use zerocopy::byteorder::{BigEndian, U16};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::netlink::error::{Error, Result};

/// Snapshot length used by [`Session::pcap_init`](super::Session::pcap_init).
pub const DEFAULT_SNAPLEN: u32 = 0xffff;

/// Size of the cooked header in front of every frame.
pub const COOKED_HDRLEN: usize = std::mem::size_of::<CookedHeader>();

const PACKET_OUTGOING: u16 = 4;
const ARPHRD_NETLINK: u16 = 824;

/// Linux cooked capture header (`LINKTYPE_LINUX_SLL`), big-endian.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct CookedHeader {
    pub pkttype: U16<BigEndian>,
    pub hatype: U16<BigEndian>,
    pub halen: U16<BigEndian>,
    pub addr: [u8; 8],
    pub family: U16<BigEndian>,
}

impl CookedHeader {
    /// Header for an outgoing netlink datagram.
    pub fn netlink() -> Self {
        Self {
            pkttype: U16::new(PACKET_OUTGOING),
            hatype: U16::new(ARPHRD_NETLINK),
            halen: U16::new(0),
            addr: [0; 8],
            family: U16::new(libc::AF_NETLINK as u16),
        }
    }
}

/// Payload bytes kept for a datagram of `len` bytes under `snaplen`.
///
/// The header is never cut, so a frame is at most `snaplen` bytes long.
pub fn frame_len(len: usize, snaplen: u32) -> usize {
    let room = (snaplen as usize).saturating_sub(COOKED_HDRLEN);
    len.min(room)
}

/// Destination for capture frames.
pub trait CaptureSink {
    /// Append one frame of `orig_len` bytes.
    fn write_frame(&mut self, ts: Duration, frame: &[u8], orig_len: u32) -> Result<()>;

    /// Push buffered frames to the underlying writer.
    fn flush(&mut self) -> Result<()>;
}

/// A pcap file with link type `NETLINK`, in host byte order with
/// microsecond timestamps.
pub struct PcapSink<W: Write> {
    writer: W,
    snaplen: u32,
}

impl<W: Write> PcapSink<W> {
    /// Write the pcap global header to `writer`.
    pub fn new(mut writer: W, snaplen: u32) -> Result<Self> {
        let header = PcapHeader {
            snaplen,
            datalink: DataLink::NETLINK,
            ts_resolution: TsResolution::MicroSecond,
            endianness: Endianness::native(),
            ..Default::default()
        };
        header.write_to(&mut writer)?;
        Ok(Self { writer, snaplen })
    }

    /// Give back the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl PcapSink<Box<dyn Write + Send>> {
    /// Create a capture file at `path`; `-` writes to stdout.
    pub fn create(path: impl AsRef<Path>, snaplen: u32) -> Result<Self> {
        let path = path.as_ref();
        let writer: Box<dyn Write + Send> = if path == Path::new("-") {
            Box::new(io::stdout())
        } else {
            Box::new(BufWriter::new(File::create(path)?))
        };
        Self::new(writer, snaplen)
    }
}

impl<W: Write> CaptureSink for PcapSink<W> {
    fn write_frame(&mut self, ts: Duration, frame: &[u8], orig_len: u32) -> Result<()> {
        PcapPacket::new(ts, orig_len, frame).write_to::<_, NativeEndian>(
            &mut self.writer,
            TsResolution::MicroSecond,
            self.snaplen,
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Active capture: sink plus a reusable frame buffer.
pub(crate) struct Capture {
    sink: Box<dyn CaptureSink + Send>,
    frame: Vec<u8>,
    snaplen: u32,
}

impl Capture {
    pub(crate) fn new(sink: Box<dyn CaptureSink + Send>, snaplen: u32) -> Result<Self> {
        if (snaplen as usize) <= COOKED_HDRLEN {
            return Err(Error::Capture(format!(
                "snapshot length {} leaves no room after the {} byte header",
                snaplen, COOKED_HDRLEN
            )));
        }
        let mut frame = Vec::with_capacity(snaplen as usize);
        frame.extend_from_slice(CookedHeader::netlink().as_bytes());
        Ok(Self {
            sink,
            frame,
            snaplen,
        })
    }

    /// Write one datagram as a frame stamped with the current time, then flush.
    ///
    /// A cut frame is recorded with its cut length, which keeps `orig_len`
    /// within the snapshot length.
    pub(crate) fn write(&mut self, datagram: &[u8]) -> Result<()> {
        let keep = frame_len(datagram.len(), self.snaplen);
        self.frame.truncate(COOKED_HDRLEN);
        self.frame.extend_from_slice(&datagram[..keep]);

        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let orig_len = self.frame.len() as u32;

        self.sink.write_frame(ts, &self.frame, orig_len)?;
        self.sink.flush()
    }

    /// Flush and release the sink.
    pub(crate) fn finish(mut self) -> Result<()> {
        self.sink.flush()
    }
}
