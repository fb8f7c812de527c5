//! Error types for socketpair-tokio

use std::io;
use thiserror::Error;

/// Result type for socketpair operations
pub type Result<T> = std::result::Result<T, SocketPairError>;

/// Errors surfaced by listeners, pipes, and socket pairs.
///
/// Would-block conditions never appear here: they are absorbed by the
/// readiness retry loops.
#[derive(Error, Debug)]
pub enum SocketPairError {
    /// OS or kernel error, passed through unchanged
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The listener or endpoint has been closed
    #[error("use of closed network connection")]
    Closed,

    /// The dial's cancellation token fired before an accept took the pipe
    #[error("dial cancelled")]
    Cancelled,

    /// A read or write deadline passed before the operation completed
    #[error("{op} timed out: deadline exceeded")]
    Timeout { op: &'static str },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ── Constructors ────────────────────────────────────────────────────────

impl SocketPairError {
    pub fn timeout(op: &'static str) -> Self {
        Self::Timeout { op }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Socket constructors need a reactor to register with.
    pub(crate) fn require_runtime() -> Result<()> {
        tokio::runtime::Handle::try_current().map(drop).map_err(|e| {
            Self::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("socket pair needs a Tokio runtime: {e}"),
            ))
        })
    }
}

// ── Predicates ──────────────────────────────────────────────────────────

impl SocketPairError {
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Timeouts and cancellations can be retried on the same object; a
    /// closed listener or endpoint cannot.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Cancelled => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed | Self::Config { .. })
    }
}

// ── Bridge: SocketPairError → io::Error ─────────────────────────────────

impl From<SocketPairError> for io::Error {
    fn from(e: SocketPairError) -> Self {
        match e {
            SocketPairError::Io(inner) => inner,
            SocketPairError::Closed => io::Error::new(io::ErrorKind::NotConnected, e),
            SocketPairError::Cancelled => io::Error::new(io::ErrorKind::Interrupted, e),
            SocketPairError::Timeout { .. } => io::Error::new(io::ErrorKind::TimedOut, e),
            SocketPairError::Config { .. } => io::Error::new(io::ErrorKind::InvalidInput, e),
        }
    }
}
