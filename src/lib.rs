//! # socketpair-tokio: In-Process Connected Endpoints
//!
//! Connected communication endpoints for test harnesses, without touching
//! real network hardware:
//!
//! - [`PipeListener`]: a listener reachable only through its own `dial`.
//!   Each dial is paired with exactly one accept, and both sides get one end
//!   of an in-memory full-duplex pipe.
//! - [`packet_socket_pair`]: two datagram endpoints from `socketpair(2)`,
//!   with readiness-driven non-blocking I/O and absolute deadlines.
//! - [`stream_socket_pair`]: two connected Unix stream sockets.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │  PipeListener / PacketEndpoint ← user API │
//! │  PipeConn                      ← pipe end │
//! │  deadline                      ← timers   │
//! │  transport                     ← NoAddr   │
//! ├───────────────────────────────────────────┤
//! │  tokio::io::duplex / AsyncFd + socketpair │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use socketpair_tokio::PipeListener;
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let listener = PipeListener::new();
//!
//!     let server = listener.clone();
//!     let accepted = tokio::spawn(async move { server.accept().await });
//!
//!     let mut client = listener.dial().await?;
//!     let mut server_end = accepted.await??;
//!
//!     // Pipes are unbuffered by default: the write completes as the peer reads.
//!     let mut buf = [0u8; 4];
//!     let (sent, received) = tokio::join!(
//!         client.write_all(b"ping"),
//!         server_end.read_exact(&mut buf),
//!     );
//!     sent?;
//!     received?;
//!     assert_eq!(&buf, b"ping");
//!
//!     listener.close()?;
//!     Ok(())
//! }
//! ```

// ── Layer 1: Addressing, errors, configuration ──────────────────────────

pub mod config;
pub mod error;
pub mod transport;
pub use config::PipeConfig;
pub use error::{Result, SocketPairError};
pub use transport::{Addr, NoAddr, PacketConn};

// ── Layer 2: Deadlines ──────────────────────────────────────────────────

pub mod deadline;
pub use deadline::Deadline;

// ── Layer 3: Endpoints ──────────────────────────────────────────────────

pub mod listener;
pub mod packet;
pub mod pipe;
pub mod stream;

pub use listener::PipeListener;
pub use packet::{packet_socket_pair, PacketEndpoint};
pub use pipe::{PipeConn, PipeConnHandle};
pub use stream::stream_socket_pair;

pub mod metrics;

// ── Version info ────────────────────────────────────────────────────────

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
