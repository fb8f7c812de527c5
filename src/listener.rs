//! Pipe-backed listener: pairs each dial with exactly one accept

use crate::config::PipeConfig;
use crate::error::{Result, SocketPairError};
use crate::metrics::global_metrics;
use crate::pipe::PipeConn;
use crate::transport::NoAddr;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Server end in flight from a dial to an accept. The accept acknowledges
/// receipt; until it does, the dial has not succeeded.
struct Handoff {
    conn: PipeConn,
    ack: oneshot::Sender<()>,
}

/// Rendezvous state. Offers and the close transition both happen under this
/// lock, so nothing is offered once `done` has fired.
#[derive(Default)]
struct RendezvousState {
    /// Accept calls currently waiting, oldest first
    acceptors: VecDeque<oneshot::Sender<Handoff>>,
}

/// Offer `server` to the oldest live acceptor, returning the receiver for its
/// acknowledgement, or the pipe end back when nobody is waiting.
fn offer(
    state: &mut RendezvousState,
    mut server: PipeConn,
) -> std::result::Result<oneshot::Receiver<()>, PipeConn> {
    while let Some(tx) = state.acceptors.pop_front() {
        let (ack_tx, ack_rx) = oneshot::channel();
        match tx.send(Handoff {
            conn: server,
            ack: ack_tx,
        }) {
            Ok(()) => return Ok(ack_rx),
            // That accept was dropped; try the next one.
            Err(returned) => server = returned.conn,
        }
    }
    Err(server)
}

struct ListenerInner {
    config: PipeConfig,
    state: Mutex<RendezvousState>,
    /// Wakes dialers when an acceptor starts waiting
    arrivals: Notify,
    /// Fires once, on close
    done: CancellationToken,
}

/// Listener that can only be reached by its own [`dial`](Self::dial) calls.
///
/// Each dial builds a fresh in-memory pipe and succeeds only while some
/// [`accept`](Self::accept) is waiting to take the other end: nothing is
/// queued on the dial side, so a fast dialer cannot outrun a slow acceptor.
/// Clones share the same listener.
#[derive(Clone)]
pub struct PipeListener {
    inner: Arc<ListenerInner>,
}

impl PipeListener {
    /// Open a listener with the default configuration
    pub fn new() -> Self {
        Self::with_config(PipeConfig::default())
    }

    /// Open a listener. The configuration is not validated here; use
    /// [`PipeConfig::listen`] for that.
    pub fn with_config(config: PipeConfig) -> Self {
        global_metrics().listener_created();
        debug!(
            pipe_buffer_size = config.pipe_buffer_size,
            "pipe listener opened"
        );
        Self {
            inner: Arc::new(ListenerInner {
                config,
                state: Mutex::new(RendezvousState::default()),
                arrivals: Notify::new(),
                done: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &PipeConfig {
        &self.inner.config
    }

    /// Wait for a dial and return the server half of its pipe.
    ///
    /// Fails with [`SocketPairError::Closed`] once the listener is closed,
    /// including when the close happens while waiting.
    pub async fn accept(&self) -> Result<PipeConn> {
        loop {
            let rx = {
                let mut state = self.inner.state.lock();
                if self.inner.done.is_cancelled() {
                    global_metrics().accept_rejected();
                    return Err(SocketPairError::Closed);
                }
                // Accept futures dropped before a dial reached them leave
                // stale senders behind.
                state.acceptors.retain(|tx| !tx.is_closed());
                let (tx, rx) = oneshot::channel();
                state.acceptors.push_back(tx);
                rx
            };
            self.inner.arrivals.notify_waiters();

            // Close drops every queued sender, which resolves `rx` with an
            // error.
            let handoff = match rx.await {
                Ok(handoff) => handoff,
                Err(_) => {
                    global_metrics().accept_rejected();
                    return Err(SocketPairError::Closed);
                }
            };
            // The ack is sent in the same poll that received the pipe, so the
            // dialer only sees success once this accept is returning it.
            if handoff.ack.send(()).is_ok() {
                return Ok(handoff.conn);
            }
            trace!("dialer gave up before the handoff completed");
        }
    }

    /// Create a pipe, hand its server half to a waiting accept, and return the
    /// client half.
    pub async fn dial(&self) -> Result<PipeConn> {
        self.dial_with_cancellation(&CancellationToken::new()).await
    }

    /// Like [`dial`](Self::dial), but gives up with
    /// [`SocketPairError::Cancelled`] if `cancel` fires first.
    ///
    /// Exactly one of cancellation, close, or a handoff happens. A token that
    /// has already fired wins over everything else.
    pub async fn dial_with_cancellation(&self, cancel: &CancellationToken) -> Result<PipeConn> {
        let buffer_size = self.inner.config.pipe_buffer_size;
        let (mut client, mut server) = PipeConn::pair(buffer_size);

        loop {
            if cancel.is_cancelled() {
                global_metrics().dial_cancelled();
                trace!("dial cancelled");
                return Err(SocketPairError::Cancelled);
            }

            let notified = self.inner.arrivals.notified();
            tokio::pin!(notified);
            let offered = {
                let mut state = self.inner.state.lock();
                if self.inner.done.is_cancelled() {
                    global_metrics().dial_rejected();
                    return Err(SocketPairError::Closed);
                }
                // Registered while holding the lock: an acceptor that queues
                // after we release it is guaranteed to wake us.
                notified.as_mut().enable();
                offer(&mut state, server)
            };

            let mut ack = match offered {
                Ok(ack) => ack,
                Err(returned) => {
                    server = returned;
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {}
                        _ = self.inner.done.cancelled() => {}
                        _ = &mut notified => {}
                    }
                    continue;
                }
            };

            tokio::select! {
                biased;
                res = &mut ack => {
                    if res.is_ok() {
                        global_metrics().pairing();
                        trace!("pipe handed to acceptor");
                        return Ok(client);
                    }
                }
                _ = cancel.cancelled() => {}
                _ = self.inner.done.cancelled() => {}
            }
            // Giving up (or the acceptor vanished): refuse any late ack, but
            // honor one that already arrived.
            ack.close();
            if ack.try_recv().is_ok() {
                global_metrics().pairing();
                trace!("pipe handed to acceptor");
                return Ok(client);
            }

            // The server end went down with the acceptor; start over.
            trace!("acceptor dropped mid-handoff; retrying with a fresh pipe");
            (client, server) = PipeConn::pair(buffer_size);
        }
    }

    /// Close the listener. Idempotent; every call returns `Ok(())`.
    ///
    /// Pending and future accepts and dials fail with
    /// [`SocketPairError::Closed`].
    pub fn close(&self) -> Result<()> {
        let waiting = {
            let mut state = self.inner.state.lock();
            if self.inner.done.is_cancelled() {
                return Ok(());
            }
            self.inner.done.cancel();
            std::mem::take(&mut state.acceptors)
        };

        global_metrics().listener_closed();
        debug!(waiting_acceptors = waiting.len(), "pipe listener closed");
        drop(waiting);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.done.is_cancelled()
    }

    /// Always the absent address: the listener is unreachable from outside
    /// the process.
    pub fn local_addr(&self) -> NoAddr {
        NoAddr
    }
}

impl Default for PipeListener {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeListener")
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}
