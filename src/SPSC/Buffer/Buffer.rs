// The SPSC ring buffer view over one data region + trailer

use super::layout::RingBufferDescriptor;
use crate::Core::MemoryView;

use std::ptr::NonNull;

/// A lock-free, single-producer, single-consumer ring buffer of variable-length records.
///
/// This struct is NOT stored in shared memory. It is a transient view that holds
/// pointers to the data region and to the [`RingBufferDescriptor`] trailer that
/// follows it, so several processes can hold views of the same buffer.
///
/// ### Concurrency Design:
/// - **Producer** (`try_claim`/`commit`/`abort`/`write`): owns `tail_position` and every
///   record header it writes. Headers are written before the tail that covers them is
///   published with `Release`; a record's committed length is stored with `Release`
///   after its payload.
/// - **Consumer** (`read`/`controlled_read`): owns `head_position` and
///   `head_cache_position`. It loads the tail and each record length with `Acquire`,
///   zeroes the bytes it consumed, then publishes the new head with `Release`.
///
/// The view is `Send + Sync` so it can be shared between the producer and consumer
/// threads, but the buffer is only correct with at most one thread producing and one
/// thread consuming at a time.
pub struct RingBuffer {
    /// Data region, `capacity` bytes.
    pub(crate) data: MemoryView,

    /// Trailer directly after the data region.
    pub(crate) descriptor: NonNull<RingBufferDescriptor>,

    /// Size of the data region in bytes (power of two).
    pub(crate) capacity: usize,

    /// `capacity - 1`, wraps positions into record offsets.
    pub(crate) mask: usize,

    /// Largest payload accepted by a single record.
    pub(crate) max_message_length: usize,
}

unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

/// Space reserved by [`RingBuffer::try_claim`], consumed by exactly one
/// [`RingBuffer::commit`] or [`RingBuffer::abort`].
#[must_use = "a claim blocks the consumer until it is committed or aborted"]
#[derive(Debug, PartialEq, Eq)]
pub struct Claim {
    pub(crate) offset: usize,
    pub(crate) length: usize,
}

impl Claim {
    /// Offset of the record header within the data region.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Payload bytes reserved.
    pub fn length(&self) -> usize {
        self.length
    }
}

/// What a [`RingBuffer::controlled_read`] handler wants done with the message it
/// was just given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlledAction {
    /// Consume the message and keep reading.
    Continue,
    /// Consume the message and stop.
    Break,
    /// Leave the message in the buffer and stop; it is delivered again next read.
    Abort,
    /// Consume the message, release everything read so far to the producer now, and
    /// keep reading.
    Commit,
}
