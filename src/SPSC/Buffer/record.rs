//! Record framing inside a ring buffer's data region.
//!
//! ```text
//!  0               4               8
//! +---------------+---------------+-------------------------+-----------+
//! | length: i32   | type_id: i32  | payload ...             | pad to 8  |
//! +---------------+---------------+-------------------------+-----------+
//! ```
//!
//! `length` is the header plus payload, unaligned. It is stored negated while the
//! record is claimed but not committed. A record whose `type_id` is
//! [`PADDING_TYPE_ID`] carries no message and is skipped by readers.

use crate::error::RingBufferError;

pub const LENGTH_OFFSET: usize = 0;
pub const TYPE_OFFSET: usize = 4;
pub const HEADER_LENGTH: usize = 8;

/// Records start on multiples of this boundary.
pub const RECORD_ALIGNMENT: usize = HEADER_LENGTH;

/// Type id reserved for padding records (wrap fill and aborted claims).
pub const PADDING_TYPE_ID: i32 = -1;

#[inline]
pub const fn length_offset(record_offset: usize) -> usize {
    record_offset + LENGTH_OFFSET
}

#[inline]
pub const fn type_offset(record_offset: usize) -> usize {
    record_offset + TYPE_OFFSET
}

#[inline]
pub const fn payload_offset(record_offset: usize) -> usize {
    record_offset + HEADER_LENGTH
}

/// Round `value` up to `alignment`, which must be a power of two.
#[inline]
pub const fn align(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Bytes a record with `payload_length` bytes of payload occupies in the ring.
#[inline]
pub const fn aligned_record_length(payload_length: usize) -> usize {
    align(HEADER_LENGTH + payload_length, RECORD_ALIGNMENT)
}

/// Reject type ids that collide with framing sentinels.
#[inline]
pub fn check_type_id(type_id: i32) -> Result<(), RingBufferError> {
    if type_id < 1 {
        return Err(RingBufferError::InvalidMessageType { type_id });
    }
    Ok(())
}
