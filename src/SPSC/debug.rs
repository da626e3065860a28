use super::{DuplexChannel, RingBuffer};
use std::fmt;

// Debug proxy implementations that call the standalone debug functions
impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_ring_buffer(self, f)
    }
}

impl fmt::Debug for DuplexChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_duplex_channel(self, f)
    }
}
