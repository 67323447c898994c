//! Low-level netlink socket operations.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};

use super::error::{Error, Result};

/// Default receive buffer size.
///
/// A psample notification carries up to 0xffff bytes of packet data plus
/// the netlink and metadata headers, so 128 KiB holds any of them.
pub const DEFAULT_RECV_BUFFER: usize = 128 * 1024;

/// Netlink protocol families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Generic netlink
    Generic,
}

impl Protocol {
    fn as_isize(self) -> isize {
        match self {
            Protocol::Generic => protocols::NETLINK_GENERIC,
        }
    }
}

/// Blocking behaviour of a connection's receive calls.
///
/// In [`Mode::Blocking`] a receive suspends until a datagram arrives, with no
/// timeout. In [`Mode::NonBlocking`] an empty queue is reported as
/// `ErrorKind::WouldBlock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Receive waits for data.
    #[default]
    Blocking,
    /// Receive returns immediately when the queue is empty.
    NonBlocking,
}

impl Mode {
    /// Mode from a boolean `block` flag.
    pub fn from_blocking(block: bool) -> Self {
        if block {
            Mode::Blocking
        } else {
            Mode::NonBlocking
        }
    }
}

/// Synchronous netlink socket.
pub struct NetlinkSocket {
    socket: Socket,
    /// Sequence number counter.
    seq: u32,
    /// Local port ID (assigned by kernel).
    pid: u32,
    mode: Mode,
    buf: BytesMut,
    buf_size: usize,
}

impl NetlinkSocket {
    /// Create a new netlink socket for the given protocol.
    pub fn new(protocol: Protocol) -> Result<Self> {
        Self::with_buffer(protocol, DEFAULT_RECV_BUFFER)
    }

    /// Create a socket whose receive buffer holds `buf_size` bytes.
    ///
    /// Datagrams larger than the buffer are reported by [`recv`](Self::recv)
    /// as [`Error::Truncated`] and dropped.
    pub fn with_buffer(protocol: Protocol, buf_size: usize) -> Result<Self> {
        let mut socket = Socket::new(protocol.as_isize())?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        // Enable extended ACK for better error messages
        socket.set_ext_ack(true).ok(); // Ignore if not supported

        Ok(Self {
            socket,
            seq: 1,
            pid,
            mode: Mode::Blocking,
            buf: BytesMut::with_capacity(buf_size),
            buf_size,
        })
    }

    /// Get the next sequence number.
    pub fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Current receive mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch the descriptor between blocking and non-blocking receives.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.socket
            .set_non_blocking(mode == Mode::NonBlocking)
            .inspect_err(|e| tracing::error!("could not set O_NONBLOCK: {}", e))?;
        self.mode = mode;
        Ok(())
    }

    /// Subscribe to a multicast group.
    pub fn add_membership(&mut self, group: u32) -> Result<()> {
        self.socket.add_membership(group)?;
        Ok(())
    }

    /// Send a message.
    pub fn send(&self, msg: &[u8]) -> Result<()> {
        let sent = self.socket.send(msg, 0)?;
        if sent != msg.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short netlink send: {} of {} bytes", sent, msg.len()),
            )
            .into());
        }
        Ok(())
    }

    /// Receive one datagram into the socket's buffer.
    ///
    /// The returned slice is valid until the next receive. An empty slice
    /// means the peer returned zero bytes. A datagram that did not fit the
    /// buffer is consumed and reported as [`Error::Truncated`].
    pub fn recv(&mut self) -> Result<&[u8]> {
        self.buf.clear();
        self.buf.reserve(self.buf_size);
        // With MSG_TRUNC the kernel reports the full datagram length.
        let n = self.socket.recv(&mut self.buf, libc::MSG_TRUNC)?;
        if n > self.buf.len() {
            tracing::warn!(len = n, buf = self.buf.len(), "netlink datagram truncated");
            return Err(Error::Truncated {
                expected: n,
                actual: self.buf.len(),
            });
        }
        Ok(&self.buf[..n])
    }
}

impl AsRawFd for NetlinkSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}
