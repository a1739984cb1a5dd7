// End-to-end tests for the SPSC ring buffer across both backings.

use bytemuck::{Pod, Zeroable};
use ringlink::{RingBuffer, RingError};

/// Velocity command, the kind of small POD message the ring is built for.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct CmdVel {
    linear: f32,
    angular: f32,
}

#[cfg(unix)]
fn unique_name(prefix: &str) -> String {
    format!(
        "/{}_{}_{}",
        prefix,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    )
}

#[test]
fn fifo_order() {
    let ring = RingBuffer::<u64>::new(16);
    for i in 0..10u64 {
        ring.push(i).unwrap();
    }
    for i in 0..10u64 {
        assert_eq!(ring.pop().unwrap(), i);
    }
    assert!(ring.is_empty());
}

#[test]
fn capacity_invariant_under_mixed_ops() {
    let ring = RingBuffer::<u32>::new(8);
    let mut next = 0u32;
    for round in 0..100 {
        // Push a varying burst, ignoring full rejections.
        for _ in 0..(round % 13) {
            let _ = ring.push(next);
            next += 1;
        }
        assert!(ring.len() <= ring.capacity());
        // Pop a varying burst, ignoring empty rejections.
        for _ in 0..(round % 7) {
            let _ = ring.pop();
        }
        assert!(ring.len() <= ring.capacity());
    }
}

#[test]
fn full_and_empty_boundaries() {
    let ring = RingBuffer::<u64>::new(4);

    // Exactly capacity() pushes succeed.
    for i in 0..4u64 {
        ring.push(i).unwrap();
    }
    assert!(ring.is_full());

    // The next push fails and leaves the state unchanged.
    let err = ring.push(99).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(ring.len(), 4);

    // Drain it, then popping the empty ring fails and changes nothing.
    for i in 0..4u64 {
        assert_eq!(ring.pop().unwrap(), i);
    }
    let err = ring.pop().unwrap_err();
    assert!(err.is_retryable());
    assert!(ring.is_empty());
    assert_eq!(ring.len(), 0);
}

// Ring of capacity 4: fill, overflow, make room, refill, drain in order.
#[test]
fn wraparound_scenario() {
    let ring = RingBuffer::<i32>::new(4);
    for v in [1, 2, 3, 4] {
        ring.push(v).unwrap();
    }
    assert!(matches!(ring.push(5), Err(RingError::Timeout(_))));
    assert_eq!(ring.pop().unwrap(), 1);
    ring.push(5).unwrap();
    assert_eq!(ring.drain(), vec![2, 3, 4, 5]);
}

#[test]
fn snapshot_round_trip() {
    let ring = RingBuffer::<CmdVel>::new(8);
    // Advance the cursors past a wrap first.
    for i in 0..6 {
        ring.push(CmdVel {
            linear: i as f32,
            angular: 0.0,
        })
        .unwrap();
        ring.pop().unwrap();
    }
    let live: Vec<CmdVel> = (0..5)
        .map(|i| CmdVel {
            linear: i as f32 * 0.5,
            angular: -(i as f32),
        })
        .collect();
    for cmd in &live {
        ring.push(*cmd).unwrap();
    }

    let data = ring.snapshot_with_data();
    assert_eq!(data.elements, live);

    let restored = RingBuffer::from_snapshot(&data).unwrap();
    assert_eq!(restored.capacity(), ring.capacity());
    assert_eq!(restored.drain(), live);
}

#[test]
fn snapshot_is_cheap_and_consistent() {
    let ring = RingBuffer::<u64>::new(4);
    ring.push(10).unwrap();
    ring.push(20).unwrap();
    ring.pop().unwrap();

    let snap = ring.snapshot();
    assert_eq!(snap.write_pos, 2);
    assert_eq!(snap.read_pos, 1);
    assert_eq!(snap.capacity, 4);
    assert_eq!(snap.len(), 1);
}

#[test]
fn from_snapshot_rejects_corrupt_headers() {
    let ring = RingBuffer::<u64>::new(4);
    ring.push(7).unwrap();

    let mut data = ring.snapshot_with_data();
    data.snapshot.magic ^= 0xFF;
    assert!(matches!(
        RingBuffer::from_snapshot(&data),
        Err(RingError::InvalidArgument(_))
    ));

    let mut data = ring.snapshot_with_data();
    data.snapshot.capacity = 0;
    assert!(matches!(
        RingBuffer::from_snapshot(&data),
        Err(RingError::InvalidArgument(_))
    ));
}

#[test]
fn snapshot_serde_round_trip() {
    let ring = RingBuffer::<u64>::new(4);
    ring.push(10).unwrap();
    ring.push(20).unwrap();

    let json = serde_json::to_string(&ring.snapshot_with_data()).unwrap();
    let parsed: ringlink::RingSnapshotData<u64> = serde_json::from_str(&json).unwrap();
    let restored = RingBuffer::from_snapshot(&parsed).unwrap();
    assert_eq!(restored.drain(), vec![10, 20]);
}

#[test]
fn spsc_across_threads() {
    use std::sync::Arc;

    const COUNT: u64 = 100_000;
    let ring = Arc::new(RingBuffer::<u64>::new(64));

    let producer = {
        let ring = Arc::clone(&ring);
        std::thread::spawn(move || {
            for i in 0..COUNT {
                // Full is backpressure, not failure: retry until accepted.
                while ring.push(i).is_err() {
                    std::thread::yield_now();
                }
            }
        })
    };

    let consumer = {
        let ring = Arc::clone(&ring);
        std::thread::spawn(move || {
            let mut expected = 0u64;
            while expected < COUNT {
                match ring.pop() {
                    Ok(value) => {
                        assert_eq!(value, expected, "FIFO order violated");
                        expected += 1;
                    }
                    Err(_) => std::thread::yield_now(),
                }
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();
    assert!(ring.is_empty());
}

// Creator pushes, attacher pops, every element observed exactly once.
#[cfg(unix)]
#[test]
fn shared_memory_continuity() {
    let name = unique_name("ringlink_cont");
    let creator = RingBuffer::<i32>::create_shm(&name, 8).unwrap();
    creator.push(10).unwrap();
    creator.push(20).unwrap();

    let attacher = RingBuffer::<i32>::attach_shm(&name).unwrap();
    assert_eq!(attacher.pop().unwrap(), 10);
    assert_eq!(attacher.pop().unwrap(), 20);
    assert!(matches!(attacher.pop(), Err(RingError::Timeout(_))));

    // Elements pushed after the attach flow through the same cursors.
    creator.push(30).unwrap();
    assert_eq!(attacher.pop().unwrap(), 30);
    assert!(attacher.is_empty());
}

#[cfg(unix)]
#[test]
fn create_collision_and_missing_attach() {
    let name = unique_name("ringlink_collide");
    let _ring = RingBuffer::<u64>::create_shm(&name, 4).unwrap();
    assert!(matches!(
        RingBuffer::<u64>::create_shm(&name, 4),
        Err(RingError::AlreadyExists(_))
    ));

    let missing = unique_name("ringlink_missing");
    assert!(matches!(
        RingBuffer::<u64>::attach_shm(&missing),
        Err(RingError::NotFound(_))
    ));
}

#[cfg(unix)]
#[test]
fn malformed_names_are_rejected() {
    for bad in ["", "no_leading_slash"] {
        assert!(matches!(
            RingBuffer::<u64>::create_shm(bad, 4),
            Err(RingError::InvalidArgument(_))
        ));
        assert!(matches!(
            RingBuffer::<u64>::attach_shm(bad),
            Err(RingError::InvalidArgument(_))
        ));
    }
}

#[cfg(unix)]
#[test]
fn shared_ring_survives_wraparound() {
    let name = unique_name("ringlink_wrap");
    let creator = RingBuffer::<u64>::create_shm(&name, 4).unwrap();
    let attacher = RingBuffer::<u64>::attach_shm(&name).unwrap();

    // Many times around the slot array, producer and consumer in lockstep.
    for i in 0..1000u64 {
        creator.push(i).unwrap();
        assert_eq!(attacher.pop().unwrap(), i);
    }
    assert!(attacher.is_empty());
    assert!(creator.is_empty());
}
