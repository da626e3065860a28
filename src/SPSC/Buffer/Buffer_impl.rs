use std::io::IoSlice;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use super::layout::{RingBufferDescriptor, MAX_CAPACITY, MIN_CAPACITY, TRAILER_LENGTH};
use super::record::{
    align, aligned_record_length, check_type_id, length_offset, payload_offset, type_offset,
    HEADER_LENGTH, PADDING_TYPE_ID, RECORD_ALIGNMENT,
};
use super::Buffer::{Claim, ControlledAction, RingBuffer};
use crate::error::RingBufferError;
use crate::Core::MemoryView;

impl RingBuffer {
    /// Capacity of the data region for a ring buffer occupying `length` bytes in total.
    ///
    /// `length` must be a power-of-two capacity between [`MIN_CAPACITY`] and
    /// [`MAX_CAPACITY`] plus [`TRAILER_LENGTH`].
    pub fn capacity_for_length(length: usize) -> Result<usize, RingBufferError> {
        length
            .checked_sub(TRAILER_LENGTH)
            .filter(|capacity| {
                (MIN_CAPACITY..=MAX_CAPACITY).contains(capacity) && capacity.is_power_of_two()
            })
            .ok_or(RingBufferError::InvalidCapacity { length })
    }

    /// Total region length (data + trailer) for a data region of `capacity` bytes.
    #[inline]
    pub const fn length_for_capacity(capacity: usize) -> usize {
        capacity.saturating_add(TRAILER_LENGTH)
    }

    /// Create a ring buffer view over `region` (data region followed by the trailer).
    ///
    /// The memory is used as is: a brand new buffer needs a zeroed trailer, which is
    /// the creator's job and happens once.
    ///
    /// # Safety
    /// `region` must stay mapped for the lifetime of the returned view, and the
    /// single-producer/single-consumer discipline must hold across every view of the
    /// same memory.
    pub unsafe fn init(region: MemoryView) -> Result<Self, RingBufferError> {
        let capacity = Self::capacity_for_length(region.len())?;

        let address = region.as_ptr() as usize;
        if address % RECORD_ALIGNMENT != 0 {
            return Err(RingBufferError::Misaligned { address, alignment: RECORD_ALIGNMENT });
        }

        let descriptor = region.struct_ref::<RingBufferDescriptor>(capacity).into();

        Ok(Self {
            data: region.slice(0, capacity),
            descriptor,
            capacity,
            mask: capacity - 1,
            max_message_length: capacity / 8,
        })
    }

    /// Same as [`init`](Self::init), from a raw base pointer and total length.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `length` bytes, with the same
    /// lifetime and discipline requirements as [`init`](Self::init).
    pub unsafe fn new(ptr: *mut u8, length: usize) -> Result<Self, RingBufferError> {
        let region = MemoryView::new(ptr, length).ok_or(RingBufferError::Misaligned {
            address: 0,
            alignment: RECORD_ALIGNMENT,
        })?;
        Self::init(region)
    }

    #[inline]
    pub(crate) fn descriptor(&self) -> &RingBufferDescriptor {
        // Safety: valid for the view's lifetime per `init`'s contract
        unsafe { self.descriptor.as_ref() }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest payload a single message may carry: `capacity / 8`.
    #[inline]
    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    /// Write one message. Never blocks.
    ///
    /// Returns [`RingBufferError::BackPressured`] when the consumer has not freed
    /// enough space yet; the buffer is left untouched in that case.
    pub fn write(&self, type_id: i32, payload: &[u8]) -> Result<(), RingBufferError> {
        let claim = self.try_claim(type_id, payload.len())?;
        self.data.put_bytes(payload_offset(claim.offset), payload);
        self.commit(claim)
    }

    /// Write one message gathered from several spans, in order.
    pub fn writev(&self, type_id: i32, spans: &[IoSlice<'_>]) -> Result<(), RingBufferError> {
        let length = spans
            .iter()
            .try_fold(0usize, |total, span| total.checked_add(span.len()))
            .ok_or(RingBufferError::MessageTooLarge {
                length: usize::MAX,
                max: self.max_message_length,
            })?;

        let claim = self.try_claim(type_id, length)?;
        let mut offset = payload_offset(claim.offset);
        for span in spans {
            self.data.put_bytes(offset, span);
            offset += span.len();
        }
        self.commit(claim)
    }

    /// Reserve space for a `length` byte message.
    ///
    /// When the record does not fit between the tail and the end of the data region,
    /// the remainder is filled with a padding record and the message is placed at
    /// offset 0. The provisional header marks the record uncommitted, so the consumer
    /// stops at it until [`commit`](Self::commit) or [`abort`](Self::abort).
    pub fn try_claim(&self, type_id: i32, length: usize) -> Result<Claim, RingBufferError> {
        check_type_id(type_id)?;
        if length > self.max_message_length {
            return Err(RingBufferError::MessageTooLarge { length, max: self.max_message_length });
        }

        let record_length = HEADER_LENGTH + length;
        let aligned_length = aligned_record_length(length);
        let descriptor = self.descriptor();

        let tail = descriptor.tail_position.load(Relaxed);
        let head = descriptor.head_position.load(Acquire);
        let available = self.capacity - (tail - head) as usize;

        let record_index = tail as usize & self.mask;
        let to_buffer_end = self.capacity - record_index;
        let (write_index, padding) = if aligned_length <= to_buffer_end {
            (record_index, 0)
        } else {
            (0, to_buffer_end)
        };

        let required = aligned_length + padding;
        if required > available {
            return Err(RingBufferError::BackPressured { required, available });
        }

        if padding != 0 {
            self.data.put_i32(type_offset(record_index), PADDING_TYPE_ID);
            self.data.put_i32_ordered(length_offset(record_index), padding as i32);
        }

        self.data.put_i32(type_offset(write_index), type_id);
        self.data.put_i32_ordered(length_offset(write_index), -(record_length as i32));

        // Headers above are visible to any consumer that observes this tail.
        descriptor.tail_position.store(tail + required as i64, Release);

        Ok(Claim { offset: write_index, length })
    }

    /// Copy `src` into a claimed record's payload, `index` bytes from its start.
    pub fn put_claimed(&self, claim: &Claim, index: usize, src: &[u8]) -> Result<(), RingBufferError> {
        let fits = index.checked_add(src.len()).map_or(false, |end| end <= claim.length);
        if !fits {
            return Err(RingBufferError::InvalidClaim { offset: claim.offset });
        }
        self.data.put_bytes(payload_offset(claim.offset) + index, src);
        Ok(())
    }

    /// Publish a claimed record.
    ///
    /// The positive length is stored with `Release`, so payload bytes written since
    /// the claim are visible to the consumer that observes it.
    pub fn commit(&self, claim: Claim) -> Result<(), RingBufferError> {
        let record_length = self.verify_claim(&claim)?;
        self.data.put_i32_ordered(length_offset(claim.offset), record_length);
        Ok(())
    }

    /// Discard a claimed record; readers skip it as padding.
    pub fn abort(&self, claim: Claim) -> Result<(), RingBufferError> {
        let record_length = self.verify_claim(&claim)?;
        self.data.put_i32(type_offset(claim.offset), PADDING_TYPE_ID);
        self.data.put_i32_ordered(length_offset(claim.offset), record_length);
        Ok(())
    }

    /// Returns the committed record length for an outstanding claim.
    fn verify_claim(&self, claim: &Claim) -> Result<i32, RingBufferError> {
        let offset = claim.offset;
        let invalid = RingBufferError::InvalidClaim { offset };

        if offset > self.capacity - HEADER_LENGTH || offset % RECORD_ALIGNMENT != 0 {
            return Err(invalid);
        }

        // The producer wrote this header itself, so a plain load suffices.
        let length = self.data.get_i32(length_offset(offset));
        match length.checked_neg() {
            Some(record_length)
                if length < 0 && record_length as usize == HEADER_LENGTH + claim.length =>
            {
                Ok(record_length)
            }
            _ => Err(invalid),
        }
    }

    /// Drain up to `message_count_limit` messages, calling `handler(type_id, payload)`
    /// for each. Padding is skipped without counting.
    ///
    /// Stops early at the first uncommitted record or when no more records have been
    /// published. The head is published once, after the scan, so the producer sees the
    /// freed space in a single step. Returns the number of messages handled.
    pub fn read<F>(&self, mut handler: F, message_count_limit: usize) -> usize
    where
        F: FnMut(i32, &[u8]),
    {
        self.controlled_read(
            |type_id, payload| {
                handler(type_id, payload);
                ControlledAction::Continue
            },
            message_count_limit,
        )
    }

    /// Like [`read`](Self::read), with the handler deciding per message whether to
    /// consume it, stop, or release space early. See [`ControlledAction`].
    pub fn controlled_read<F>(&self, mut handler: F, message_count_limit: usize) -> usize
    where
        F: FnMut(i32, &[u8]) -> ControlledAction,
    {
        let descriptor = self.descriptor();

        // Consumer-owned fields: no other writer.
        let head = descriptor.head_position.load(Relaxed);
        let mut tail_snapshot = descriptor.head_cache_position.load(Relaxed);

        let mut cursor = head;
        let mut published = head;
        let mut handled = 0;

        while handled < message_count_limit {
            if cursor >= tail_snapshot {
                tail_snapshot = descriptor.tail_position.load(Acquire);
                descriptor.head_cache_position.store(tail_snapshot, Relaxed);
                if cursor >= tail_snapshot {
                    break;
                }
            }

            let record_index = cursor as usize & self.mask;
            let record_length = self.data.get_i32_volatile(length_offset(record_index));
            if record_length <= 0 {
                // claimed but not committed yet, or tail published ahead of the header
                break;
            }

            let aligned_length = align(record_length as usize, RECORD_ALIGNMENT);
            if (record_length as usize) < HEADER_LENGTH
                || aligned_length > self.capacity - record_index
            {
                // a header no producer of this layout writes; wait as if uncommitted
                break;
            }

            let next = cursor + aligned_length as i64;
            let type_id = self.data.get_i32(type_offset(record_index));
            if type_id == PADDING_TYPE_ID {
                cursor = next;
                continue;
            }

            let payload = self
                .data
                .bytes(payload_offset(record_index), record_length as usize - HEADER_LENGTH);

            match handler(type_id, payload) {
                ControlledAction::Abort => break,
                ControlledAction::Break => {
                    cursor = next;
                    handled += 1;
                    break;
                }
                ControlledAction::Commit => {
                    cursor = next;
                    handled += 1;
                    self.release(published, cursor);
                    published = cursor;
                }
                ControlledAction::Continue => {
                    cursor = next;
                    handled += 1;
                }
            }
        }

        if cursor != published {
            self.release(published, cursor);
        }

        handled
    }

    /// Zero the consumed bytes `[from, to)` and hand them back to the producer.
    ///
    /// Released space reads back with length 0, which the reader treats as not yet
    /// written, even when a producer publishes its tail ahead of the header.
    fn release(&self, from: i64, to: i64) {
        let index = from as usize & self.mask;
        let length = (to - from) as usize;
        let to_buffer_end = length.min(self.capacity - index);

        self.data.fill(index, to_buffer_end, 0);
        if length > to_buffer_end {
            self.data.fill(0, length - to_buffer_end, 0);
        }

        self.descriptor().head_position.store(to, Release);
    }

    /// Next value of the shared correlation counter. Safe from any thread or process
    /// mapping the buffer; returns the value before the increment.
    pub fn next_correlation_id(&self) -> i64 {
        self.descriptor().correlation_counter.fetch_add(1, AcqRel)
    }

    /// Record consumer liveness. Staleness thresholds are up to the caller.
    pub fn consumer_heartbeat_time(&self, time_ms: i64) {
        self.descriptor().consumer_heartbeat.store(time_ms, Release);
    }

    /// Last liveness timestamp stored by the consumer.
    pub fn consumer_heartbeat_time_ms(&self) -> i64 {
        self.descriptor().consumer_heartbeat.load(Acquire)
    }

    /// Total bytes ever claimed by the producer, padding included.
    pub fn producer_position(&self) -> i64 {
        self.descriptor().tail_position.load(Acquire)
    }

    /// Total bytes ever released by the consumer.
    pub fn consumer_position(&self) -> i64 {
        self.descriptor().head_position.load(Acquire)
    }

    /// Bytes currently occupied by unread records.
    pub fn size(&self) -> usize {
        let descriptor = self.descriptor();
        let mut head_after = descriptor.head_position.load(Acquire);
        loop {
            let head_before = head_after;
            let tail = descriptor.tail_position.load(Acquire);
            head_after = descriptor.head_position.load(Acquire);

            if head_after == head_before {
                return ((tail - head_after).max(0) as usize).min(self.capacity);
            }
        }
    }
}
