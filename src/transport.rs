//! Addressing and the packet-connection seam
//!
//! Every endpoint this crate hands out is pre-bound to exactly one peer, so
//! addresses carry no information. They are still modeled as a real type,
//! [`NoAddr`], so harness code written against address-bearing interfaces gets
//! a well-defined value instead of a failure.

use crate::error::Result;
use std::fmt::{self, Debug, Display};
use std::future::Future;
use std::hash::Hash;
use tokio::time::Instant;

/// Marker trait for address types.
///
/// Any type satisfying the required bounds automatically implements `Addr`
/// via the blanket impl.
pub trait Addr: Clone + Eq + Hash + Send + Sync + Debug + Display + 'static {}

impl<T: Clone + Eq + Hash + Send + Sync + Debug + Display + 'static> Addr for T {}

/// The absent address: the local and remote address of every pipe and pair
/// end, and the source address of every received datagram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoAddr;

impl NoAddr {
    /// Network name, in the `net.Addr` sense
    pub fn network(&self) -> &'static str {
        "unix"
    }
}

impl Display for NoAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<unbound>")
    }
}

/// Datagram connection with a fixed peer.
///
/// Shaped after the classic packet-connection interface: reads report a
/// source address and writes take a destination, but both are [`Self::Addr`]
/// values that implementations are free to ignore.
pub trait PacketConn: Send + Sync + 'static {
    /// The address type used to identify endpoints.
    type Addr: Addr;

    /// Receive one datagram into `buf`, returning `(bytes_read, source)`.
    fn read_from<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = Result<(usize, Self::Addr)>> + Send + 'a;

    /// Send `buf` as one datagram to `target`.
    fn write_to<'a>(
        &'a self,
        buf: &'a [u8],
        target: &'a Self::Addr,
    ) -> impl Future<Output = Result<usize>> + Send + 'a;

    /// Return the local address.
    fn local_addr(&self) -> Self::Addr;

    /// Set both deadlines. `None` clears them.
    fn set_deadline(&self, at: Option<Instant>) -> Result<()>;

    /// Set the absolute expiry for current and future reads.
    fn set_read_deadline(&self, at: Option<Instant>) -> Result<()>;

    /// Set the absolute expiry for current and future writes.
    fn set_write_deadline(&self, at: Option<Instant>) -> Result<()>;

    /// Release the underlying descriptor.
    fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_addr<A: Addr>(_: &A) {}

    #[test]
    fn test_no_addr_is_addr() {
        let addr = NoAddr;
        assert_addr(&addr);
        assert_eq!(addr, NoAddr::default());
        assert_eq!(addr.to_string(), "<unbound>");
        assert_eq!(addr.network(), "unix");
    }
}
