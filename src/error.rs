//! Error types for ring buffers, duplex channels and the forwarding loop

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for channel-level operations
pub type Result<T, E = ChannelError> = std::result::Result<T, E>;

/// Failures reported by [`RingBuffer`](crate::SPSC::RingBuffer) operations.
///
/// Only [`RingBufferError::BackPressured`] is transient; everything else is fatal
/// to the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingBufferError {
    /// Region length is not a power-of-two capacity plus the trailer
    #[error("invalid ring buffer length {length}: capacity must be a power of two in {min}..={max} plus a {trailer} byte trailer", min = crate::SPSC::Buffer::layout::MIN_CAPACITY, max = crate::SPSC::Buffer::layout::MAX_CAPACITY, trailer = crate::SPSC::Buffer::layout::TRAILER_LENGTH)]
    InvalidCapacity { length: usize },

    /// Region base address cannot hold the record header and trailer atomics
    #[error("ring buffer region at {address:#x} is not {alignment}-byte aligned")]
    Misaligned { address: usize, alignment: usize },

    /// Payload exceeds the per-message limit of the buffer
    #[error("message length {length} exceeds max message length {max}")]
    MessageTooLarge { length: usize, max: usize },

    /// Not enough free space right now; retry once the consumer catches up
    #[error("ring buffer back-pressured: {required} bytes required, {available} available")]
    BackPressured { required: usize, available: usize },

    /// Commit or abort referenced an offset that is not an outstanding claim
    #[error("no outstanding claim at offset {offset}")]
    InvalidClaim { offset: usize },

    /// Application type ids must be >= 1; negative ids are reserved for framing
    #[error("invalid message type id {type_id}: must be >= 1")]
    InvalidMessageType { type_id: i32 },
}

impl RingBufferError {
    /// True when the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackPressured { .. })
    }
}

/// Failures while creating or opening a duplex channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel already exists at {}", .path.display())]
    AlreadyExists { path: PathBuf },

    #[error("failed to create channel file {}: {source}", .path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to map channel file {}: {source}", .path.display())]
    MapFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The creator never published the ready version within the bound
    #[error("channel at {} not ready after {waited:?}", .path.display())]
    HandshakeTimeout { path: PathBuf, waited: Duration },

    #[error("channel at {} has an invalid layout: {reason}", .path.display())]
    InvalidLayout { path: PathBuf, reason: String },

    #[error(transparent)]
    RingBuffer(#[from] RingBufferError),
}

/// Failure that ends a forwarding loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    #[error("could not write to outbound: {0}")]
    Outbound(#[source] RingBufferError),
}
