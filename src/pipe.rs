//! One end of an in-memory full-duplex pipe

use crate::deadline::{Deadline, DeadlineTimer};
use crate::error::{Result, SocketPairError};
use crate::transport::NoAddr;

use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::trace;

/// State shared between a [`PipeConn`] and its [`PipeConnHandle`]s
#[derive(Debug)]
struct PipeShared {
    io: Mutex<Option<DuplexStream>>,
    read_deadline: Deadline,
    write_deadline: Deadline,
    /// Fires on close so pending polls on this end wake up
    done: CancellationToken,
}

impl PipeShared {
    fn set_read_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.ensure_open()?;
        self.read_deadline.set(at);
        Ok(())
    }

    fn set_write_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.ensure_open()?;
        self.write_deadline.set(at);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // Dropping the stream outside the lock gives the peer EOF.
        let io = self.io.lock().take();
        match io {
            Some(io) => {
                self.done.cancel();
                drop(io);
                trace!("pipe end closed");
                Ok(())
            }
            None => Err(SocketPairError::Closed),
        }
    }

    fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SocketPairError::Closed);
        }
        Ok(())
    }
}

/// Connection handed out by [`PipeListener`](crate::listener::PipeListener).
///
/// Reads and writes go through a [`DuplexStream`]; each direction holds at
/// most the configured buffer size before the writer waits on the reader.
/// Deadlines apply to the `AsyncRead`/`AsyncWrite` surface and fail with
/// [`io::ErrorKind::TimedOut`].
///
/// I/O needs `&mut self`. To change deadlines or close the end while another
/// task is blocked in a read or write, use a [`handle`](Self::handle).
/// Dropping the connection closes it.
pub struct PipeConn {
    shared: Arc<PipeShared>,
    read_timer: DeadlineTimer,
    write_timer: DeadlineTimer,
    read_closed: Pin<Box<WaitForCancellationFutureOwned>>,
    write_closed: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl PipeConn {
    /// Create two connected ends with `buffer_size` bytes of capacity per
    /// direction.
    pub fn pair(buffer_size: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(buffer_size);
        (Self::new(a), Self::new(b))
    }

    fn new(io: DuplexStream) -> Self {
        let shared = Arc::new(PipeShared {
            io: Mutex::new(Some(io)),
            read_deadline: Deadline::new(),
            write_deadline: Deadline::new(),
            done: CancellationToken::new(),
        });
        Self {
            read_timer: shared.read_deadline.timer(),
            write_timer: shared.write_deadline.timer(),
            read_closed: Box::pin(shared.done.clone().cancelled_owned()),
            write_closed: Box::pin(shared.done.clone().cancelled_owned()),
            shared,
        }
    }

    /// Cloneable control handle for this end
    pub fn handle(&self) -> PipeConnHandle {
        PipeConnHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn local_addr(&self) -> NoAddr {
        NoAddr
    }

    pub fn remote_addr(&self) -> NoAddr {
        NoAddr
    }

    pub fn set_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.shared.set_read_deadline(at)?;
        self.shared.set_write_deadline(at)
    }

    pub fn set_read_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.shared.set_read_deadline(at)
    }

    pub fn set_write_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.shared.set_write_deadline(at)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Close this end. The peer reads EOF and its writes fail with
    /// `BrokenPipe`; a second close fails with [`SocketPairError::Closed`].
    pub fn close(&self) -> Result<()> {
        self.shared.close()
    }

    /// Shared gate for every poll: closed first, then the deadline.
    fn poll_gate(
        closed: &mut Pin<Box<WaitForCancellationFutureOwned>>,
        timer: &mut DeadlineTimer,
        cx: &mut Context<'_>,
        op: &'static str,
    ) -> Option<io::Error> {
        if closed.as_mut().poll(cx).is_ready() {
            return Some(SocketPairError::Closed.into());
        }
        if timer.poll_expired(cx).is_ready() {
            return Some(SocketPairError::timeout(op).into());
        }
        None
    }
}

impl Drop for PipeConn {
    fn drop(&mut self) {
        // Handles may outlive the connection; the peer still gets EOF.
        let _ = self.shared.close();
    }
}

impl std::fmt::Debug for PipeConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeConn")
            .field("closed", &self.is_closed())
            .field("read_deadline", &self.shared.read_deadline.get())
            .field("write_deadline", &self.shared.write_deadline.get())
            .finish()
    }
}

/// Control side of a [`PipeConn`], usable from any task.
///
/// Deadline changes and close take effect on reads and writes already in
/// progress: a blocked read wakes with `TimedOut` or `NotConnected`.
#[derive(Debug, Clone)]
pub struct PipeConnHandle {
    shared: Arc<PipeShared>,
}

impl PipeConnHandle {
    pub fn set_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.shared.set_read_deadline(at)?;
        self.shared.set_write_deadline(at)
    }

    pub fn set_read_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.shared.set_read_deadline(at)
    }

    pub fn set_write_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.shared.set_write_deadline(at)
    }

    /// Close the connection this handle controls. Same contract as
    /// [`PipeConn::close`].
    pub fn close(&self) -> Result<()> {
        self.shared.close()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

fn closed() -> io::Error {
    SocketPairError::Closed.into()
}

impl AsyncRead for PipeConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(err) = Self::poll_gate(&mut this.read_closed, &mut this.read_timer, cx, "read")
        {
            return Poll::Ready(Err(err));
        }
        let mut io = this.shared.io.lock();
        match io.as_mut() {
            Some(io) => Pin::new(io).poll_read(cx, buf),
            None => Poll::Ready(Err(closed())),
        }
    }
}

impl AsyncWrite for PipeConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Some(err) =
            Self::poll_gate(&mut this.write_closed, &mut this.write_timer, cx, "write")
        {
            return Poll::Ready(Err(err));
        }
        let mut io = this.shared.io.lock();
        match io.as_mut() {
            Some(io) => Pin::new(io).poll_write(cx, buf),
            None => Poll::Ready(Err(closed())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut io = self.shared.io.lock();
        match io.as_mut() {
            Some(io) => Pin::new(io).poll_flush(cx),
            None => Poll::Ready(Err(closed())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut io = self.shared.io.lock();
        match io.as_mut() {
            Some(io) => Pin::new(io).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}
