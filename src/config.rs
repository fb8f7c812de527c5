//! Configuration types for pipe-backed listeners

use crate::error::{Result, SocketPairError};
use crate::listener::PipeListener;

/// Default capacity of each pipe direction.
///
/// One byte is the smallest capacity a duplex stream accepts, so a write
/// waits on the peer's read after at most one byte, the way an unbuffered
/// OS pipe behaves. Use [`PipeConfig::bulk`] or
/// [`PipeConfig::pipe_buffer_size`] to trade that for throughput.
pub const DEFAULT_PIPE_BUFFER_SIZE: usize = 1;

/// Pipe listener configuration builder
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Bytes a writer may get ahead of the reader before it blocks, per
    /// direction
    pub pipe_buffer_size: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            pipe_buffer_size: DEFAULT_PIPE_BUFFER_SIZE,
        }
    }
}

impl PipeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-direction pipe capacity
    pub fn pipe_buffer_size(mut self, size: usize) -> Self {
        self.pipe_buffer_size = size;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipe_buffer_size == 0 {
            return Err(SocketPairError::config(
                "Pipe buffer size must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Validate and open a listener with this configuration
    pub fn listen(self) -> Result<PipeListener> {
        self.validate()?;
        Ok(PipeListener::with_config(self))
    }
}

/// Preset configurations
impl PipeConfig {
    /// One byte per direction: every write waits on the peer's read. Same as
    /// the default, spelled out for callers that depend on it.
    pub fn unbuffered() -> Self {
        Self::default().pipe_buffer_size(1)
    }

    /// Large buffers for bulk-transfer harnesses
    pub fn bulk() -> Self {
        Self::default().pipe_buffer_size(1024 * 1024)
    }
}
