//! Datagram endpoint pairs built on `socketpair(2)`
//!
//! Both descriptors are non-blocking and registered with the Tokio reactor.
//! A read or write makes one non-blocking attempt; on would-block it waits
//! for readiness and tries again, until it succeeds, fails for real, hits its
//! deadline, or the endpoint is closed.

use crate::deadline::Deadline;
use crate::error::{Result, SocketPairError};
use crate::metrics::global_metrics;
use crate::transport::{NoAddr, PacketConn};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::io;
use std::os::unix::net::UnixDatagram;
use std::sync::Arc;
use tokio::io::unix::AsyncFd;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Create two connected datagram endpoints.
///
/// Fails with the OS error if the kernel cannot allocate the pair, if either
/// descriptor cannot be made non-blocking, or if reactor registration fails.
/// Descriptors created before the failure are closed on the way out.
///
/// Outside a Tokio runtime this fails with [`SocketPairError::Io`] before any
/// descriptor is created.
///
/// # Panics
///
/// Panics inside a runtime built without I/O enabled.
pub fn packet_socket_pair() -> Result<(PacketEndpoint, PacketEndpoint)> {
    SocketPairError::require_runtime()?;
    let (first, second) = UnixDatagram::pair()?;
    first.set_nonblocking(true)?;
    second.set_nonblocking(true)?;

    let first = PacketEndpoint::new(first, 0)?;
    let second = PacketEndpoint::new(second, 1)?;

    global_metrics().packet_pair_created();
    debug!("packet socket pair created");
    Ok((first, second))
}

/// One end of a packet socket pair.
///
/// The peer is fixed at creation: every received datagram reports
/// [`NoAddr`] as its source and the destination passed to
/// [`write_to`](Self::write_to) is ignored.
///
/// Concurrent reads (or concurrent writes) on the same endpoint are not
/// supported; a read and a write may run concurrently, and `close` and the
/// deadline setters may be called from anywhere.
pub struct PacketEndpoint {
    io: Mutex<Option<Arc<AsyncFd<UnixDatagram>>>>,
    done: CancellationToken,
    read_deadline: Deadline,
    write_deadline: Deadline,
    index: u8,
}

impl PacketEndpoint {
    fn new(socket: UnixDatagram, index: u8) -> Result<Self> {
        let io = AsyncFd::new(socket)?;
        Ok(Self {
            io: Mutex::new(Some(Arc::new(io))),
            done: CancellationToken::new(),
            read_deadline: Deadline::new(),
            write_deadline: Deadline::new(),
            index,
        })
    }

    /// Receive one datagram. Bytes beyond `buf.len()` are discarded by the
    /// kernel.
    pub async fn read_from(&self, buf: &mut [u8]) -> Result<(usize, NoAddr)> {
        let io = self.handle()?;
        let mut timer = self.read_deadline.timer();

        let n = tokio::select! {
            biased;
            _ = self.done.cancelled() => return Err(SocketPairError::Closed),
            _ = timer.expired() => {
                global_metrics().timeout();
                trace!(endpoint = self.index, "read deadline exceeded");
                return Err(SocketPairError::timeout("read"));
            }
            res = recv_when_ready(&io, buf, self.index) => res?,
        };

        global_metrics().received(n);
        Ok((n, NoAddr))
    }

    /// Send `buf` as one datagram to the peer. `_target` is ignored.
    pub async fn write_to(&self, buf: &[u8], _target: &NoAddr) -> Result<usize> {
        let io = self.handle()?;
        let mut timer = self.write_deadline.timer();

        let n = tokio::select! {
            biased;
            _ = self.done.cancelled() => return Err(SocketPairError::Closed),
            _ = timer.expired() => {
                global_metrics().timeout();
                trace!(endpoint = self.index, "write deadline exceeded");
                return Err(SocketPairError::timeout("write"));
            }
            res = send_when_ready(&io, buf, self.index) => res?,
        };

        global_metrics().sent(n);
        Ok(n)
    }

    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let (n, _) = self.read_from(buf).await?;
        Ok(n)
    }

    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        self.write_to(buf, &NoAddr).await
    }

    /// Receive one datagram of at most `max_len` bytes into a fresh buffer.
    pub async fn read_packet(&self, max_len: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(max_len);
        let (n, _) = self.read_from(&mut buf).await?;
        buf.truncate(n);
        Ok(buf.freeze())
    }

    pub fn local_addr(&self) -> NoAddr {
        NoAddr
    }

    pub fn remote_addr(&self) -> NoAddr {
        NoAddr
    }

    pub fn set_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.set_read_deadline(at)?;
        self.set_write_deadline(at)
    }

    pub fn set_read_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.ensure_open()?;
        self.read_deadline.set(at);
        Ok(())
    }

    pub fn set_write_deadline(&self, at: Option<Instant>) -> Result<()> {
        self.ensure_open()?;
        self.write_deadline.set(at);
        Ok(())
    }

    /// Release the descriptor. Blocked reads and writes on this endpoint
    /// return [`SocketPairError::Closed`]; the peer endpoint stays open.
    pub fn close(&self) -> Result<()> {
        let io = self.io.lock().take().ok_or(SocketPairError::Closed)?;
        self.done.cancel();
        // In-flight operations hold their own handle until they observe
        // `done`; the descriptor closes when the last one lets go.
        drop(io);

        global_metrics().endpoint_closed();
        debug!(endpoint = self.index, "packet endpoint closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    fn handle(&self) -> Result<Arc<AsyncFd<UnixDatagram>>> {
        self.io.lock().clone().ok_or(SocketPairError::Closed)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SocketPairError::Closed);
        }
        Ok(())
    }
}

async fn recv_when_ready(
    io: &AsyncFd<UnixDatagram>,
    buf: &mut [u8],
    index: u8,
) -> io::Result<usize> {
    loop {
        let mut guard = io.readable().await?;
        match guard.try_io(|inner| inner.get_ref().recv(buf)) {
            Ok(result) => return result,
            Err(_would_block) => trace!(endpoint = index, "read would block"),
        }
    }
}

async fn send_when_ready(
    io: &AsyncFd<UnixDatagram>,
    buf: &[u8],
    index: u8,
) -> io::Result<usize> {
    loop {
        let mut guard = io.writable().await?;
        match guard.try_io(|inner| inner.get_ref().send(buf)) {
            Ok(result) => return result,
            Err(_would_block) => trace!(endpoint = index, "write would block"),
        }
    }
}

impl PacketConn for PacketEndpoint {
    type Addr = NoAddr;

    async fn read_from(&self, buf: &mut [u8]) -> Result<(usize, NoAddr)> {
        PacketEndpoint::read_from(self, buf).await
    }

    async fn write_to(&self, buf: &[u8], target: &NoAddr) -> Result<usize> {
        PacketEndpoint::write_to(self, buf, target).await
    }

    fn local_addr(&self) -> NoAddr {
        NoAddr
    }

    fn set_deadline(&self, at: Option<Instant>) -> Result<()> {
        PacketEndpoint::set_deadline(self, at)
    }

    fn set_read_deadline(&self, at: Option<Instant>) -> Result<()> {
        PacketEndpoint::set_read_deadline(self, at)
    }

    fn set_write_deadline(&self, at: Option<Instant>) -> Result<()> {
        PacketEndpoint::set_write_deadline(self, at)
    }

    fn close(&self) -> Result<()> {
        PacketEndpoint::close(self)
    }
}

impl std::fmt::Debug for PacketEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketEndpoint")
            .field("index", &self.index)
            .field("closed", &self.is_closed())
            .field("read_deadline", &self.read_deadline.get())
            .field("write_deadline", &self.write_deadline.get())
            .finish()
    }
}
