use std::path::{Path, PathBuf};
use std::time::Duration;

use super::channel::default_channel_path;
use super::{DuplexChannel, RingBuffer};
use crate::error::Result;

/// Data region size of each direction unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// How long `open` waits for the creator to publish the channel header.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for creating or opening a [`DuplexChannel`].
///
/// Capacities are data region sizes; the trailer is added on top, so
/// `with_inbound_capacity(64 * 1024)` yields an inbound length of
/// `64 KiB + TRAILER_LENGTH`.
#[derive(Debug, Clone)]
pub struct ChannelBuilder {
    path: PathBuf,
    inbound_capacity: usize,
    outbound_capacity: usize,
    handshake_timeout: Duration,
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self {
            path: default_channel_path(),
            inbound_capacity: DEFAULT_CAPACITY,
            outbound_capacity: DEFAULT_CAPACITY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl ChannelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Same data capacity for both directions.
    pub fn with_capacity(self, capacity: usize) -> Self {
        self.with_inbound_capacity(capacity)
            .with_outbound_capacity(capacity)
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full inbound ring buffer length, trailer included.
    pub fn inbound_length(&self) -> usize {
        RingBuffer::length_for_capacity(self.inbound_capacity)
    }

    /// Full outbound ring buffer length, trailer included.
    pub fn outbound_length(&self) -> usize {
        RingBuffer::length_for_capacity(self.outbound_capacity)
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Exclusively create the channel file and publish its header.
    pub fn create(self) -> Result<DuplexChannel> {
        DuplexChannel::create(&self.path, self.inbound_length(), self.outbound_length())
    }

    /// Open an existing channel, waiting up to the handshake timeout for it to be ready.
    pub fn open(self) -> Result<DuplexChannel> {
        DuplexChannel::open(&self.path, self.handshake_timeout)
    }
}
