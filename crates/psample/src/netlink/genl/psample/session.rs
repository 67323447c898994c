//! psample session: event and control connections, filter, capture.

use std::convert::Infallible;
use std::fmt;
use std::ops::ControlFlow;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

use super::capture::{Capture, CaptureSink, DEFAULT_SNAPLEN, PcapSink};
use super::filter::GroupFilter;
use super::table::AttrTable;
use super::types::{ConfigView, Event, GroupDescriptor, SampleView};
use super::{
    PSAMPLE_GENL_NAME, PSAMPLE_GENL_VERSION, PSAMPLE_NL_MCGRP_CONFIG_NAME,
    PSAMPLE_NL_MCGRP_SAMPLE_NAME, PsampleCmd,
};
use crate::netlink::error::{Error, Result};
use crate::netlink::genl::{
    Batch, CtrlAttr, CtrlCmd, FamilyInfo, GENL_ID_CTRL, GenlMsgHdr, GenlSocket, GenlTransport,
    run_batch,
};
use crate::netlink::message::{NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST};
use crate::netlink::socket::{DEFAULT_RECV_BUFFER, Mode};

type SampleFn<'a, B> = Box<dyn FnMut(SampleView<'_>) -> ControlFlow<B> + 'a>;
type ConfigFn<'a, B> = Box<dyn FnMut(ConfigView<'_>) -> ControlFlow<B> + 'a>;

/// Closures invoked by [`Session::dispatch`].
///
/// A `PSAMPLE_CMD_SAMPLE` message goes to the sample handler when one is
/// set; every other message, and samples when no sample handler is set,
/// go to the config handler. Messages no handler accepts are discarded.
pub struct Handlers<'a, B = ()> {
    sample: Option<SampleFn<'a, B>>,
    config: Option<ConfigFn<'a, B>>,
}

impl<'a, B> Handlers<'a, B> {
    /// No handlers: dispatch drains and discards.
    pub fn new() -> Self {
        Self {
            sample: None,
            config: None,
        }
    }

    /// Set the sampled-packet handler.
    pub fn on_sample<F>(mut self, f: F) -> Self
    where
        F: FnMut(SampleView<'_>) -> ControlFlow<B> + 'a,
    {
        self.sample = Some(Box::new(f));
        self
    }

    /// Set the configuration handler.
    pub fn on_config<F>(mut self, f: F) -> Self
    where
        F: FnMut(ConfigView<'_>) -> ControlFlow<B> + 'a,
    {
        self.config = Some(Box::new(f));
        self
    }

    fn accepts(&self, cmd: u8) -> bool {
        (cmd == PsampleCmd::Sample as u8 && self.sample.is_some()) || self.config.is_some()
    }

    fn invoke(&mut self, cmd: u8, table: AttrTable<'_>) -> ControlFlow<B> {
        if cmd == PsampleCmd::Sample as u8
            && let Some(f) = self.sample.as_mut()
        {
            return f(SampleView::new(table));
        }
        match self.config.as_mut() {
            Some(f) => f(ConfigView::new(cmd, table)),
            None => ControlFlow::Continue(()),
        }
    }
}

impl<B> Default for Handlers<'_, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> fmt::Debug for Handlers<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("sample", &self.sample.is_some())
            .field("config", &self.config.is_some())
            .finish()
    }
}

/// Builder for [`Session`] over real sockets.
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    family: String,
    version: u8,
    config_group: bool,
    sample_group: bool,
    recv_buffer: usize,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            family: PSAMPLE_GENL_NAME.to_string(),
            version: PSAMPLE_GENL_VERSION,
            config_group: true,
            sample_group: true,
            recv_buffer: DEFAULT_RECV_BUFFER,
        }
    }
}

impl SessionBuilder {
    /// Create a builder with the psample defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Family name and version to resolve.
    pub fn family(mut self, name: impl Into<String>, version: u8) -> Self {
        self.family = name.into();
        self.version = version;
        self
    }

    /// Join the `config` multicast group (default: true).
    pub fn config_group(mut self, enabled: bool) -> Self {
        self.config_group = enabled;
        self
    }

    /// Join the `packets` multicast group (default: true).
    pub fn sample_group(mut self, enabled: bool) -> Self {
        self.sample_group = enabled;
        self
    }

    /// Receive buffer size of each connection.
    pub fn recv_buffer(mut self, size: usize) -> Self {
        self.recv_buffer = size;
        self
    }

    /// Open both connections.
    pub fn open(self) -> Result<Session<GenlSocket>> {
        let mut groups = Vec::with_capacity(2);
        if self.config_group {
            groups.push(PSAMPLE_NL_MCGRP_CONFIG_NAME);
        }
        if self.sample_group {
            groups.push(PSAMPLE_NL_MCGRP_SAMPLE_NAME);
        }
        Session::assemble(
            || GenlSocket::open_with_buffer(&self.family, self.version, self.recv_buffer),
            &groups,
        )
    }
}

/// A psample subscription.
///
/// Holds an event connection joined to the `config` and `packets`
/// multicast groups and a separate control connection for requests, so
/// replies never interleave with notifications.
///
/// Dropping the session detaches the group filter and flushes an active
/// capture, logging failures; [`close`](Self::close) does the same and
/// reports them.
pub struct Session<T: GenlTransport = GenlSocket> {
    event: T,
    control: T,
    filter: Option<GroupFilter>,
    capture: Option<Capture>,
}

impl Session<GenlSocket> {
    /// Open a session for the `psample` family.
    pub fn open() -> Result<Self> {
        SessionBuilder::new().open()
    }

    /// Configure a session before opening it.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Start a pcap capture written to `path` (`-` for stdout).
    ///
    /// The family's own description is written first, which lets
    /// Wireshark map the dynamic family ID to the psample dissector.
    pub fn pcap_init(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.capture.is_some() {
            return Err(Error::CaptureAlreadyInitialized);
        }
        let sink = PcapSink::create(path.as_ref(), DEFAULT_SNAPLEN)
            .inspect_err(|e| tracing::error!("could not open capture {:?}: {}", path.as_ref(), e))?;
        self.pcap_init_with(sink, DEFAULT_SNAPLEN)
    }
}

impl<T: GenlTransport> Session<T> {
    /// Open a session over connections produced by `connect`.
    ///
    /// `connect` is called twice: once for the event connection, joined
    /// to both multicast groups, and once for the control connection.
    pub fn open_with<F>(connect: F) -> Result<Self>
    where
        F: FnMut() -> Result<T>,
    {
        Self::assemble(
            connect,
            &[PSAMPLE_NL_MCGRP_CONFIG_NAME, PSAMPLE_NL_MCGRP_SAMPLE_NAME],
        )
    }

    fn assemble<F>(mut connect: F, groups: &[&str]) -> Result<Self>
    where
        F: FnMut() -> Result<T>,
    {
        let mut event =
            connect().inspect_err(|e| tracing::error!("could not open netlink socket: {}", e))?;
        for group in groups {
            event
                .join_group(group)
                .inspect_err(|e| tracing::error!("could not join {} group: {}", group, e))?;
        }
        let control =
            connect().inspect_err(|e| tracing::error!("could not open control socket: {}", e))?;

        tracing::debug!(
            family = event.family().id,
            event_fd = event.as_raw_fd(),
            control_fd = control.as_raw_fd(),
            "psample session open"
        );

        Ok(Self {
            event,
            control,
            filter: None,
            capture: None,
        })
    }

    /// Close the session, reporting teardown failures.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let mut result = Ok(());

        if let Some(filter) = self.filter.take() {
            match self.event.detach_filter() {
                Ok(()) => tracing::debug!(group = filter.group(), "detached group filter"),
                Err(e) => result = Err(e),
            }
        }
        if let Some(capture) = self.capture.take() {
            let flushed = capture.finish();
            if result.is_ok() {
                result = flushed;
            }
        }

        result
    }

    /// Resolved family of the event connection.
    pub fn family(&self) -> &FamilyInfo {
        self.event.family()
    }

    /// Descriptor of the event connection, for external event loops.
    pub fn event_fd(&self) -> RawFd {
        self.event.as_raw_fd()
    }

    /// The event connection.
    pub fn event(&self) -> &T {
        &self.event
    }

    /// The control connection.
    pub fn control(&self) -> &T {
        &self.control
    }

    /// The installed group filter, if any.
    pub fn filter(&self) -> Option<&GroupFilter> {
        self.filter.as_ref()
    }

    /// Set the receive mode of the event connection.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.event.set_mode(mode)
    }

    /// Deliver only messages of `group`; messages without a group pass.
    ///
    /// Replaces any previous filter. If detaching the previous filter
    /// fails it stays installed and the error is returned; if attaching
    /// the new one fails the session is left without a filter.
    pub fn bind_group(&mut self, group: u32) -> Result<()> {
        if let Some(old) = &self.filter {
            self.event.detach_filter().inspect_err(|e| {
                tracing::error!(group = old.group(), "could not detach filter prog: {}", e)
            })?;
            self.filter = None;
        }

        let filter = GroupFilter::new(group);
        self.event
            .attach_filter(filter.program())
            .inspect_err(|e| tracing::error!(group, "could not attach filter prog: {}", e))?;
        tracing::debug!(group, "attached group filter");
        self.filter = Some(filter);
        Ok(())
    }

    /// Receive and dispatch one batch of notifications.
    ///
    /// In [`Mode::Blocking`] one datagram is received, waiting as long as it
    /// takes. In [`Mode::NonBlocking`] datagrams are processed until the
    /// queue is empty, which is not an error. The first handler returning
    /// `Break` ends the batch and its value is returned.
    pub fn dispatch<B>(
        &mut self,
        handlers: &mut Handlers<'_, B>,
        mode: Mode,
    ) -> Result<ControlFlow<B>> {
        self.pump(mode, |cmd, attrs| {
            if !handlers.accepts(cmd) {
                return Ok(ControlFlow::Continue(()));
            }
            let table = AttrTable::parse(attrs)?;
            Ok(handlers.invoke(cmd, table))
        })
    }

    /// Like [`dispatch`](Self::dispatch) with one callback for every event.
    pub fn dispatch_events<B, F>(&mut self, mode: Mode, mut cb: F) -> Result<ControlFlow<B>>
    where
        F: FnMut(Event<'_>) -> ControlFlow<B>,
    {
        self.pump(mode, |cmd, attrs| {
            let table = AttrTable::parse(attrs)?;
            Ok(cb(Event::classify(cmd, table)))
        })
    }

    fn pump<B, F>(&mut self, mode: Mode, mut on_msg: F) -> Result<ControlFlow<B>>
    where
        F: FnMut(u8, &[u8]) -> Result<ControlFlow<B>>,
    {
        self.event.set_mode(mode)?;
        let family = self.event.family().id;

        loop {
            let data = match self.event.recv() {
                Ok(data) => data,
                Err(e) if mode == Mode::NonBlocking && e.is_would_block() => {
                    return Ok(ControlFlow::Continue(()));
                }
                Err(e) => {
                    tracing::error!("could not recv: {}", e);
                    return Err(e);
                }
            };
            if data.is_empty() {
                return Ok(ControlFlow::Continue(()));
            }

            let end = run_batch(data, None, |header, payload| {
                if header.nlmsg_type != family {
                    return Ok(ControlFlow::Continue(()));
                }
                let (genl, attrs) = GenlMsgHdr::split(payload)
                    .ok_or_else(|| Error::InvalidMessage("GENL header too short".into()))?;
                on_msg(genl.cmd, attrs)
            })?;

            if let Batch::Break(b) = end {
                return Ok(ControlFlow::Break(b));
            }
            if mode == Mode::Blocking {
                return Ok(ControlFlow::Continue(()));
            }
        }
    }

    /// Dump the kernel's sampling groups into `cb`.
    ///
    /// Stops at the first `Break`. A record missing its number, refcount
    /// or sequence fails the call.
    pub fn group_foreach<B, F>(&mut self, mut cb: F) -> Result<ControlFlow<B>>
    where
        F: FnMut(&GroupDescriptor) -> ControlFlow<B>,
    {
        let msg = self.control.prepare_family(
            PsampleCmd::GetGroup as u8,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_DUMP,
        );
        let seq = msg.seq();
        self.control
            .send(&msg.finish())
            .inspect_err(|e| tracing::error!("failed to send group dump: {}", e))?;

        loop {
            let data = self
                .control
                .recv()
                .inspect_err(|e| tracing::error!("failed to recv message: {}", e))?;

            let end = run_batch(data, Some(seq), |_, payload| {
                let (_, attrs) = GenlMsgHdr::split(payload)
                    .ok_or_else(|| Error::InvalidMessage("GENL header too short".into()))?;
                let table = AttrTable::parse(attrs)?;
                let group = GroupDescriptor::from_table(&table)?;
                Ok(cb(&group))
            })
            .map_err(|e| e.with_context("dump psample groups"))?;

            match end {
                Batch::More => continue,
                Batch::Done => return Ok(ControlFlow::Continue(())),
                Batch::Break(b) => return Ok(ControlFlow::Break(b)),
            }
        }
    }

    /// Collect every sampling group.
    pub fn groups(&mut self) -> Result<Vec<GroupDescriptor>> {
        let mut groups = Vec::new();
        let _ = self.group_foreach(|group| {
            groups.push(*group);
            ControlFlow::<Infallible>::Continue(())
        })?;
        Ok(groups)
    }

    /// Start a capture into `sink` with the given snapshot length.
    pub fn pcap_init_with<S>(&mut self, sink: S, snaplen: u32) -> Result<()>
    where
        S: CaptureSink + Send + 'static,
    {
        if self.capture.is_some() {
            return Err(Error::CaptureAlreadyInitialized);
        }
        let mut capture = Capture::new(Box::new(sink), snaplen)?;

        self.reflect_family(&mut capture)
            .inspect_err(|e| tracing::error!("failed to dump generic netlink family: {}", e))?;

        tracing::debug!(snaplen, "capture initialized");
        self.capture = Some(capture);
        Ok(())
    }

    /// Write the control family's reply describing psample into the capture.
    fn reflect_family(&mut self, capture: &mut Capture) -> Result<()> {
        let id = self.control.family().id;
        let mut msg = self.control.prepare(
            GENL_ID_CTRL,
            CtrlCmd::GetFamily as u8,
            1,
            NLM_F_REQUEST | NLM_F_ACK,
        );
        msg.append_attr_u16(CtrlAttr::FamilyId as u16, id);
        let seq = msg.seq();
        self.control.send(&msg.finish())?;

        loop {
            let data = self.control.recv()?;
            if data.is_empty() {
                return Ok(());
            }
            capture.write(data)?;
            match run_batch::<(), _>(data, Some(seq), |_, _| Ok(ControlFlow::Continue(())))? {
                Batch::More => continue,
                _ => return Ok(()),
            }
        }
    }

    /// Write every datagram of the event connection into the capture.
    ///
    /// Switches the event connection to blocking mode and runs until a
    /// receive fails (returned as an error) or yields zero bytes.
    pub fn write_pcap_dispatch(&mut self) -> Result<()> {
        let capture = self
            .capture
            .as_mut()
            .ok_or(Error::CaptureNotInitialized)?;
        self.event.set_mode(Mode::Blocking)?;

        loop {
            let data = self
                .event
                .recv()
                .inspect_err(|e| tracing::error!("could not recv: {}", e))?;
            if data.is_empty() {
                return Ok(());
            }
            capture.write(data)?;
        }
    }

    /// Flush and close the capture.
    pub fn pcap_fini(&mut self) -> Result<()> {
        let capture = self.capture.take().ok_or(Error::CaptureNotInitialized)?;
        capture.finish()
    }

    /// Whether a capture is active.
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }
}

impl<T: GenlTransport> AsRawFd for Session<T> {
    fn as_raw_fd(&self) -> RawFd {
        self.event_fd()
    }
}

impl<T: GenlTransport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::warn!("psample session teardown failed: {}", e);
        }
    }
}

impl<T: GenlTransport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("family", self.family())
            .field("event_fd", &self.event_fd())
            .field("control_fd", &self.control.as_raw_fd())
            .field("filter", &self.filter)
            .field("capturing", &self.capture.is_some())
            .finish()
    }
}
