//! Connected stream socket pairs

use crate::error::{Result, SocketPairError};
use std::os::unix::net::UnixStream as StdUnixStream;
use tokio::net::UnixStream;
use tracing::debug;

/// Create two connected `AF_UNIX`/`SOCK_STREAM` sockets, both non-blocking
/// and registered with the Tokio reactor.
///
/// Unlike the pipes handed out by
/// [`PipeListener`](crate::listener::PipeListener) these are real kernel
/// sockets, for code that needs file descriptors. Descriptors created before
/// a failure are closed on the way out.
///
/// Outside a Tokio runtime this fails with
/// [`SocketPairError::Io`](crate::error::SocketPairError::Io) before any
/// descriptor is created.
///
/// # Panics
///
/// Panics inside a runtime built without I/O enabled.
pub fn stream_socket_pair() -> Result<(UnixStream, UnixStream)> {
    SocketPairError::require_runtime()?;
    let (first, second) = StdUnixStream::pair()?;
    first.set_nonblocking(true)?;
    second.set_nonblocking(true)?;

    let first = UnixStream::from_std(first)?;
    let second = UnixStream::from_std(second)?;

    debug!("stream socket pair created");
    Ok((first, second))
}
