//! Async stream of psample events.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio_stream::Stream;

use super::session::Session;
use super::types::OwnedEvent;
use crate::netlink::error::Result;
use crate::netlink::genl::{GenlSocket, GenlTransport};
use crate::netlink::socket::Mode;

/// A [`Session`] driven by the tokio reactor.
///
/// The event connection is switched to non-blocking mode and drained on
/// every readiness notification. Events are copied out of the receive
/// buffer as [`OwnedEvent`]s.
///
/// # Example
///
/// ```rust,no_run
/// use psample::{OwnedEvent, SampleStream, Session};
/// use tokio_stream::StreamExt;
///
/// # async fn example() -> psample::Result<()> {
/// let mut stream = SampleStream::new(Session::open()?)?;
/// while let Some(event) = stream.next().await {
///     if let OwnedEvent::Sample(sample) = event? {
///         println!("group {:?}: {} bytes", sample.group, sample.data.len());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct SampleStream<T: GenlTransport = GenlSocket> {
    fd: AsyncFd<Session<T>>,
    pending: VecDeque<OwnedEvent>,
}

impl<T: GenlTransport> SampleStream<T> {
    /// Register the session's event descriptor with the reactor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(mut session: Session<T>) -> Result<Self> {
        session.set_mode(Mode::NonBlocking)?;
        // SAFETY: the session owns its event socket. The descriptor stays
        // open and unchanged until the session is dropped or handed back
        // through `into_session`.
        let fd = unsafe { AsyncFd::register_with_interest(session, Interest::READABLE) }
            .map_err(std::io::Error::from)?;
        Ok(Self {
            fd,
            pending: VecDeque::new(),
        })
    }

    /// Get a reference to the underlying session.
    pub fn session(&self) -> &Session<T> {
        self.fd.get_ref()
    }

    /// Get a mutable reference to the underlying session.
    pub fn session_mut(&mut self) -> &mut Session<T> {
        self.fd.get_mut()
    }

    /// Deregister and give back the session, still in non-blocking mode.
    pub fn into_session(self) -> Session<T> {
        self.fd.into_inner()
    }
}

impl<T: GenlTransport> Stream for SampleStream<T> {
    type Item = Result<OwnedEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            let mut guard = match this.fd.poll_read_ready_mut(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
                Poll::Pending => return Poll::Pending,
            };

            let pending = &mut this.pending;
            let drained = guard
                .get_inner_mut()
                .dispatch_events(Mode::NonBlocking, |event| {
                    pending.push_back(event.to_owned_event());
                    ControlFlow::<()>::Continue(())
                });

            // A non-blocking pass only returns once the queue is empty.
            guard.clear_ready();
            if let Err(e) = drained {
                return Poll::Ready(Some(Err(e)));
            }
        }
    }
}

impl<T: GenlTransport> Unpin for SampleStream<T> {}
