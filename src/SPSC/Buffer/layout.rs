use std::mem::size_of;
use std::sync::atomic::AtomicI64;

/// Cache line length assumed by the shared layout.
pub const CACHE_LINE_LENGTH: usize = 64;

/// Smallest data region a ring buffer accepts.
pub const MIN_CAPACITY: usize = 64;

/// Largest data region a ring buffer accepts. Record lengths are stored as i32, so
/// `capacity / 8` plus a header must stay below `i32::MAX`.
pub const MAX_CAPACITY: usize = 1 << 30;

/// Byte offsets of the descriptor fields, relative to the start of the trailer.
///
/// Each counter is preceded by two cache lines so adjacent-line prefetching never
/// pulls a producer-owned field into the consumer's cache and vice versa.
pub const TAIL_POSITION_OFFSET: usize = CACHE_LINE_LENGTH * 2;
pub const HEAD_CACHE_POSITION_OFFSET: usize = CACHE_LINE_LENGTH * 4;
pub const HEAD_POSITION_OFFSET: usize = CACHE_LINE_LENGTH * 6;
pub const CORRELATION_COUNTER_OFFSET: usize = CACHE_LINE_LENGTH * 8;
pub const CONSUMER_HEARTBEAT_OFFSET: usize = CACHE_LINE_LENGTH * 10;

/// Length of the trailer that follows every ring buffer's data region.
pub const TRAILER_LENGTH: usize = CACHE_LINE_LENGTH * 12;

const FIELD_PAD: usize = CACHE_LINE_LENGTH * 2 - size_of::<i64>();

/// The trailer ("descriptor") stored directly after a ring buffer's data region.
///
/// Ownership of the fields:
/// - `tail_position`: written by the producer only.
/// - `head_cache_position`: consumer only; a snapshot of the tail so the consumer
///   does not re-read `tail_position` for every record.
/// - `head_position`: written by the consumer only.
/// - `correlation_counter`: either side, read-modify-write.
/// - `consumer_heartbeat`: written by the consumer, read by the producer.
#[repr(C)]
pub struct RingBufferDescriptor {
    _begin_pad: [u8; CACHE_LINE_LENGTH * 2],
    pub tail_position: AtomicI64,
    _tail_pad: [u8; FIELD_PAD],
    pub head_cache_position: AtomicI64,
    _head_cache_pad: [u8; FIELD_PAD],
    pub head_position: AtomicI64,
    _head_pad: [u8; FIELD_PAD],
    pub correlation_counter: AtomicI64,
    _correlation_pad: [u8; FIELD_PAD],
    pub consumer_heartbeat: AtomicI64,
    _heartbeat_pad: [u8; FIELD_PAD],
}

const _: () = assert!(size_of::<RingBufferDescriptor>() == TRAILER_LENGTH);

/// Header at offset 0 of a duplex channel segment, followed by the inbound and
/// outbound ring buffers.
///
/// `version` stays 0 until the creator has written both lengths; peers must not
/// trust the lengths before observing a non-zero version.
#[repr(C)]
pub struct ChannelHeader {
    pub version: AtomicI64,
    pub inbound_length: AtomicI64,
    pub outbound_length: AtomicI64,
    _pad: [u8; CACHE_LINE_LENGTH - 3 * size_of::<i64>()],
}

/// Length of the channel header region, one cache line.
pub const CHANNEL_HEADER_LENGTH: usize = size_of::<ChannelHeader>();

const _: () = assert!(CHANNEL_HEADER_LENGTH == CACHE_LINE_LENGTH);
