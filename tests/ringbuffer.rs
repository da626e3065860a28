use dmxp_duplex::Core::{HeapMemory, SharedMemoryBackend};
use dmxp_duplex::SPSC::Buffer::layout::{
    HEAD_CACHE_POSITION_OFFSET, MAX_CAPACITY, MIN_CAPACITY, TAIL_POSITION_OFFSET,
    TRAILER_LENGTH,
};
use dmxp_duplex::SPSC::{ControlledAction, RingBuffer};
use dmxp_duplex::RingBufferError;
use std::io::IoSlice;
use std::thread;

fn heap_ring(capacity: usize) -> (HeapMemory, RingBuffer) {
    let memory = HeapMemory::new(RingBuffer::length_for_capacity(capacity)).unwrap();
    let rb = unsafe { RingBuffer::init(memory.view()).unwrap() };
    (memory, rb)
}

fn drain(rb: &RingBuffer, limit: usize) -> Vec<(i32, Vec<u8>)> {
    let mut messages = Vec::new();
    rb.read(|type_id, payload| messages.push((type_id, payload.to_vec())), limit);
    messages
}

#[test]
fn capacity_and_max_message_length() {
    for capacity in [MIN_CAPACITY, 1024, 64 * 1024] {
        let (_memory, rb) = heap_ring(capacity);
        assert_eq!(rb.capacity(), capacity);
        assert_eq!(rb.max_message_length(), capacity / 8);
        assert_eq!(rb.size(), 0);
        assert_eq!(rb.producer_position(), 0);
        assert_eq!(rb.consumer_position(), 0);
    }
}

#[test]
fn init_rejects_invalid_lengths() {
    for length in [1000 + TRAILER_LENGTH, 32 + TRAILER_LENGTH, TRAILER_LENGTH, 16] {
        let memory = HeapMemory::new(length).unwrap();
        let result = unsafe { RingBuffer::init(memory.view()) };
        assert!(
            matches!(result, Err(RingBufferError::InvalidCapacity { length: l }) if l == length),
            "length {} should be rejected",
            length
        );
    }
}

#[test]
fn capacity_is_bounded_by_i32_record_lengths() {
    assert_eq!(
        RingBuffer::capacity_for_length(MAX_CAPACITY + TRAILER_LENGTH),
        Ok(MAX_CAPACITY)
    );
    for capacity in [MAX_CAPACITY * 2, 1usize << 34] {
        let length = capacity + TRAILER_LENGTH;
        assert_eq!(
            RingBuffer::capacity_for_length(length),
            Err(RingBufferError::InvalidCapacity { length })
        );
    }
    // the largest record header still fits an i32
    assert!(MAX_CAPACITY / 8 + 8 <= i32::MAX as usize);
}

#[test]
fn new_rejects_null_and_misaligned_regions() {
    let length = RingBuffer::length_for_capacity(1024);
    let result = unsafe { RingBuffer::new(std::ptr::null_mut(), length) };
    assert!(matches!(result, Err(RingBufferError::Misaligned { address: 0, .. })));

    let memory = HeapMemory::new(length + 8).unwrap();
    let shifted = unsafe { memory.as_ptr().add(4) };
    let result = unsafe { RingBuffer::new(shifted, length) };
    assert_eq!(
        result.err(),
        Some(RingBufferError::Misaligned { address: shifted as usize, alignment: 8 })
    );

    let rb = unsafe { RingBuffer::new(memory.as_ptr(), length).unwrap() };
    assert_eq!(rb.capacity(), 1024);
}

#[test]
fn simple_write_read() {
    let (_memory, rb) = heap_ring(1024);

    rb.write(7, b"abc").unwrap();
    assert_eq!(rb.size(), 16);

    let messages = drain(&rb, 10);
    assert_eq!(messages, vec![(7, b"abc".to_vec())]);
    assert_eq!(rb.size(), 0);
    assert_eq!(rb.consumer_position(), rb.producer_position());

    // nothing left
    assert_eq!(rb.read(|_, _| panic!("unexpected message"), 10), 0);
}

#[test]
fn empty_payload_is_delivered() {
    let (_memory, rb) = heap_ring(1024);
    rb.write(3, b"").unwrap();
    assert_eq!(drain(&rb, 10), vec![(3, Vec::new())]);
}

#[test]
fn read_respects_limit() {
    let (_memory, rb) = heap_ring(1024);
    for i in 1..=5 {
        rb.write(i, &[i as u8]).unwrap();
    }

    let first = drain(&rb, 2);
    assert_eq!(first.iter().map(|(t, _)| *t).collect::<Vec<_>>(), vec![1, 2]);
    let rest = drain(&rb, 10);
    assert_eq!(rest.iter().map(|(t, _)| *t).collect::<Vec<_>>(), vec![3, 4, 5]);
}

#[test]
fn rejects_reserved_type_ids() {
    let (_memory, rb) = heap_ring(1024);
    for type_id in [0, -1, i32::MIN] {
        assert_eq!(
            rb.write(type_id, b"x"),
            Err(RingBufferError::InvalidMessageType { type_id })
        );
    }
    assert_eq!(rb.producer_position(), 0);
}

#[test]
fn rejects_oversized_messages() {
    let (_memory, rb) = heap_ring(1024);
    let max = rb.max_message_length();

    let too_big = vec![0u8; max + 1];
    assert_eq!(
        rb.write(1, &too_big),
        Err(RingBufferError::MessageTooLarge { length: max + 1, max })
    );
    assert_eq!(rb.producer_position(), 0);

    let exact = vec![9u8; max];
    rb.write(1, &exact).unwrap();
    assert_eq!(drain(&rb, 1), vec![(1, exact)]);
}

#[test]
fn back_pressure_leaves_buffer_untouched() {
    let (_memory, rb) = heap_ring(1024);
    let payload = vec![0x5Au8; rb.max_message_length()];

    // 128 byte payloads take 136 bytes each: seven fit, 72 bytes remain
    for _ in 0..7 {
        rb.write(1, &payload).unwrap();
    }
    let tail = rb.producer_position();
    assert_eq!(tail, 952);

    let err = rb.write(2, &payload).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err, RingBufferError::BackPressured { required: 208, available: 72 });
    assert_eq!(rb.producer_position(), tail);

    // freeing one record makes room for the padding plus the wrapped record
    assert_eq!(rb.read(|_, _| {}, 1), 1);
    rb.write(2, b"wrapped").unwrap();
    assert_eq!(rb.producer_position(), tail + 208);

    let messages = drain(&rb, 100);
    assert_eq!(messages.len(), 7);
    assert!(messages[..6].iter().all(|(t, p)| *t == 1 && *p == payload));
    assert_eq!(messages[6], (2, b"wrapped".to_vec()));
}

#[test]
fn wrap_around_inserts_padding() {
    let (memory, rb) = heap_ring(256);

    for i in 0..7 {
        rb.write(1, &[i as u8; 24]).unwrap();
    }
    assert_eq!(drain(&rb, 10).len(), 7);
    assert_eq!(rb.consumer_position(), 224);

    // 38 byte record does not fit the last 32 bytes
    let claim = rb.try_claim(5, 30).unwrap();
    assert_eq!(claim.offset(), 0);
    assert_eq!(claim.length(), 30);
    rb.put_claimed(&claim, 0, &[7u8; 30]).unwrap();
    rb.commit(claim).unwrap();

    let data = unsafe { memory.view() };
    assert_eq!(data.get_i32(224), 32);
    assert_eq!(data.get_i32(228), -1);

    assert_eq!(drain(&rb, 10), vec![(5, vec![7u8; 30])]);
    assert_eq!(rb.producer_position(), 224 + 32 + 40);
    assert_eq!(rb.consumer_position(), rb.producer_position());
}

#[test]
fn writev_gathers_spans() {
    let (_memory, rb) = heap_ring(1024);
    let spans = [IoSlice::new(b"hello"), IoSlice::new(b""), IoSlice::new(b" world")];
    rb.writev(9, &spans).unwrap();
    assert_eq!(drain(&rb, 1), vec![(9, b"hello world".to_vec())]);
}

#[test]
fn writev_rejects_oversized_total() {
    let (_memory, rb) = heap_ring(1024);
    let half = vec![0u8; rb.max_message_length() / 2 + 1];
    let spans = [IoSlice::new(&half), IoSlice::new(&half)];
    assert!(matches!(
        rb.writev(1, &spans),
        Err(RingBufferError::MessageTooLarge { .. })
    ));
}

#[test]
fn aborted_claim_is_skipped() {
    let (_memory, rb) = heap_ring(1024);

    let claim = rb.try_claim(5, 4).unwrap();
    rb.put_claimed(&claim, 0, b"xxxx").unwrap();
    rb.abort(claim).unwrap();
    rb.write(6, b"ok").unwrap();

    assert_eq!(drain(&rb, 10), vec![(6, b"ok".to_vec())]);
    // the aborted record's space is released along with the rest
    assert_eq!(rb.size(), 0);
}

#[test]
fn uncommitted_claim_blocks_reader() {
    let (_memory, rb) = heap_ring(1024);

    let claim = rb.try_claim(1, 4).unwrap();
    rb.write(2, b"after").unwrap();
    assert_eq!(rb.read(|_, _| {}, 10), 0);

    rb.put_claimed(&claim, 0, b"head").unwrap();
    rb.commit(claim).unwrap();
    assert_eq!(
        drain(&rb, 10),
        vec![(1, b"head".to_vec()), (2, b"after".to_vec())]
    );
}

#[test]
fn put_claimed_stays_inside_claim() {
    let (_memory, rb) = heap_ring(1024);
    let claim = rb.try_claim(1, 4).unwrap();

    assert_eq!(
        rb.put_claimed(&claim, 2, b"abc"),
        Err(RingBufferError::InvalidClaim { offset: 0 })
    );
    assert!(rb.put_claimed(&claim, usize::MAX, b"a").is_err());

    rb.put_claimed(&claim, 0, b"ab").unwrap();
    rb.put_claimed(&claim, 2, b"cd").unwrap();
    rb.commit(claim).unwrap();
    assert_eq!(drain(&rb, 1), vec![(1, b"abcd".to_vec())]);
}

#[test]
fn claim_from_another_buffer_is_invalid() {
    let (_memory_a, a) = heap_ring(1024);
    let (_memory_b, b) = heap_ring(1024);

    let claim = a.try_claim(1, 4).unwrap();
    assert_eq!(b.commit(claim), Err(RingBufferError::InvalidClaim { offset: 0 }));
    assert_eq!(b.producer_position(), 0);
    assert_eq!(b.read(|_, _| {}, 10), 0);
}

#[test]
fn controlled_read_abort_leaves_message() {
    let (_memory, rb) = heap_ring(1024);
    for i in 1..=4 {
        rb.write(i, &[i as u8]).unwrap();
    }

    let handled = rb.controlled_read(
        |type_id, _| {
            if type_id == 2 {
                ControlledAction::Abort
            } else {
                ControlledAction::Continue
            }
        },
        10,
    );
    assert_eq!(handled, 1);
    assert_eq!(rb.consumer_position(), 16);

    let rest = drain(&rb, 10);
    assert_eq!(rest.iter().map(|(t, _)| *t).collect::<Vec<_>>(), vec![2, 3, 4]);
}

#[test]
fn controlled_read_break_stops_after_message() {
    let (_memory, rb) = heap_ring(1024);
    for i in 1..=3 {
        rb.write(i, &[i as u8]).unwrap();
    }

    let handled = rb.controlled_read(|_, _| ControlledAction::Break, 10);
    assert_eq!(handled, 1);
    assert_eq!(rb.consumer_position(), 16);
    assert_eq!(drain(&rb, 10).len(), 2);
}

#[test]
fn controlled_read_commit_releases_early() {
    let (_memory, rb) = heap_ring(1024);
    for i in 1..=3 {
        rb.write(i, &[i as u8]).unwrap();
    }

    let mut observed = Vec::new();
    let handled = rb.controlled_read(
        |type_id, _| {
            observed.push(rb.consumer_position());
            if type_id == 1 {
                ControlledAction::Commit
            } else {
                ControlledAction::Continue
            }
        },
        10,
    );

    assert_eq!(handled, 3);
    // head moved after the first message, not again until the scan ended
    assert_eq!(observed, vec![0, 16, 16]);
    assert_eq!(rb.consumer_position(), 48);
}

#[test]
fn correlation_ids_are_unique() {
    let (_memory, rb) = heap_ring(1024);
    assert_eq!(rb.next_correlation_id(), 0);
    assert_eq!(rb.next_correlation_id(), 1);

    let threads = 8;
    let per_thread = 1000;
    let mut ids: Vec<i64> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| s.spawn(|| (0..per_thread).map(|_| rb.next_correlation_id()).collect::<Vec<_>>()))
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    ids.sort_unstable();
    let expected: Vec<i64> = (2..2 + (threads * per_thread) as i64).collect();
    assert_eq!(ids, expected);
}

#[test]
fn heartbeat_round_trip() {
    let (_memory, rb) = heap_ring(1024);
    assert_eq!(rb.consumer_heartbeat_time_ms(), 0);
    rb.consumer_heartbeat_time(1_700_000_000_000);
    assert_eq!(rb.consumer_heartbeat_time_ms(), 1_700_000_000_000);
}

#[test]
fn heartbeat_is_never_torn() {
    let (_memory, rb) = heap_ring(1024);
    const LANES: i64 = 0x0001_0001_0001_0001;

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..=0x7fffi64 {
                rb.consumer_heartbeat_time(i * LANES);
            }
        });
        s.spawn(|| {
            let mut last = 0;
            for _ in 0..100_000 {
                let value = rb.consumer_heartbeat_time_ms();
                assert_eq!(value % LANES, 0, "torn heartbeat {:#x}", value);
                assert!(value >= last, "heartbeat went backwards");
                last = value;
            }
        });
    });

    assert_eq!(rb.consumer_heartbeat_time_ms(), 0x7fff * LANES);
}

#[test]
fn consumed_bytes_read_back_as_zero() {
    let capacity = 64;
    let (memory, rb) = heap_ring(capacity);
    let raw = unsafe { memory.view() };

    // four 16 byte records fill the ring
    for i in 1..=4 {
        rb.write(i, &[i as u8; 8]).unwrap();
    }
    assert_eq!(rb.read(|_, _| {}, 10), 4);
    assert!(raw.bytes(0, capacity).iter().all(|b| *b == 0));

    // a producer that publishes the tail before its header is not re-delivered
    // the previous lap's record
    raw.put_i64_ordered(capacity + TAIL_POSITION_OFFSET, 80);
    let mut stale = Vec::new();
    rb.read(|t, p| stale.push((t, p.to_vec())), 10);
    assert!(stale.is_empty(), "record re-delivered: {:?}", stale);
    assert_eq!(rb.consumer_position(), 64);
}

#[test]
fn consumed_bytes_are_zeroed_across_wrap() {
    let (memory, rb) = heap_ring(256);
    let raw = unsafe { memory.view() };

    for _ in 0..7 {
        rb.write(1, &[0xEE; 24]).unwrap();
    }
    assert_eq!(rb.read(|_, _| {}, 10), 7);
    // padding at 224 plus a record at 0
    rb.write(2, &[0xEE; 30]).unwrap();
    assert_eq!(raw.get_i32(224), 32);

    assert_eq!(drain(&rb, 10), vec![(2, vec![0xEE; 30])]);
    assert!(raw.bytes(0, 256).iter().all(|b| *b == 0));
}

#[test]
fn commit_action_zeroes_before_publishing() {
    let (memory, rb) = heap_ring(1024);
    let raw = unsafe { memory.view() };
    rb.write(1, b"first").unwrap();
    rb.write(2, b"second").unwrap();

    let handled = rb.controlled_read(
        |type_id, _| {
            if type_id == 1 {
                ControlledAction::Commit
            } else {
                // first record already released and cleared
                assert!(raw.bytes(0, 16).iter().all(|b| *b == 0));
                assert_eq!(raw.get_i32(16), 14);
                ControlledAction::Continue
            }
        },
        10,
    );
    assert_eq!(handled, 2);
    assert!(raw.bytes(0, 32).iter().all(|b| *b == 0));
}

#[test]
fn malformed_headers_stop_the_scan() {
    let capacity = 256;
    let (memory, rb) = heap_ring(capacity);
    let raw = unsafe { memory.view() };
    let tail_offset = capacity + TAIL_POSITION_OFFSET;

    // shorter than a header, and longer than the whole data region
    for length in [3, 1000] {
        raw.put_i32(4, 1);
        raw.put_i32_ordered(0, length);
        raw.put_i64_ordered(tail_offset, 16);

        assert_eq!(rb.read(|_, _| panic!("malformed record delivered"), 10), 0);
        assert_eq!(rb.consumer_position(), 0);
    }
    raw.put_i32_ordered(0, 0);
    raw.put_i64_ordered(tail_offset, 0);
    raw.put_i64(capacity + HEAD_CACHE_POSITION_OFFSET, 0);

    // move both sides to offset 192, then claim to run past the end
    for _ in 0..12 {
        rb.write(1, &[0u8; 8]).unwrap();
    }
    assert_eq!(rb.read(|_, _| {}, 12), 12);
    raw.put_i32(196, 1);
    raw.put_i32_ordered(192, 72);
    raw.put_i64_ordered(tail_offset, 208);

    assert_eq!(rb.read(|_, _| panic!("malformed record delivered"), 10), 0);
    assert_eq!(rb.consumer_position(), 192);
}
