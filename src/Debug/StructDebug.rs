use std::fmt;

use crate::SPSC::Buffer::RingBuffer;
use crate::SPSC::DuplexChannel;

/// Debug function for RingBuffer
///
/// Shows the data region location and the live positions; loads are `Acquire`
/// and never disturb either side.
pub fn debug_ring_buffer(buffer: &RingBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RingBuffer")
        .field("data", &format_args!("{:p}", buffer.data.as_ptr()))
        .field("capacity", &buffer.capacity())
        .field("max_message_length", &buffer.max_message_length())
        .field("producer_position", &buffer.producer_position())
        .field("consumer_position", &buffer.consumer_position())
        .finish()
}

/// Debug function for DuplexChannel
///
/// Shows:
/// - Backing file path and segment size
/// - Published header version
/// - Both ring buffers
pub fn debug_duplex_channel(channel: &DuplexChannel, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("DuplexChannel")
        .field("path", &channel.path())
        .field("segment_length", &channel.segment_length())
        .field("version", &channel.version())
        .field("inbound", channel.inbound())
        .field("outbound", channel.outbound())
        .finish_non_exhaustive()
}
