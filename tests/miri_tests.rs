//! Miri-compatible tests for detecting undefined behavior.
//!
//! Run with: `cargo +nightly miri test --test miri_tests`
//!
//! These exercise the unsafe surface — raw-view binding over a heap region,
//! slot copies, ring cell access, reset-in-place — with small sizes so miri
//! finishes quickly. No System V tests here: miri cannot run syscalls.

use shmqueue_rs::{HeapRegion, Queue, QueueConfig, QueueError};

#[test]
fn miri_create_push_pop() {
    let config = QueueConfig::new(64, 4, false);
    let region = HeapRegion::new(config.region_bytes());
    let queue = Queue::create_in(region, &config).unwrap();

    queue.push_with_tag(3, b"abc").unwrap();
    queue.push(b"defg").unwrap();

    let mut buf = Vec::new();
    assert_eq!(queue.try_pop(&mut buf).unwrap(), Some(3));
    assert_eq!(buf, b"abc");
    assert_eq!(queue.try_pop(&mut buf).unwrap(), Some(0));
    assert_eq!(buf, b"defg");
    assert_eq!(queue.try_pop(&mut buf).unwrap(), None);
}

#[test]
fn miri_rebind_and_wrap_around() {
    let config = QueueConfig::new(64, 2, false);
    let region = HeapRegion::new(config.region_bytes());
    let producer = Queue::create_in(region.clone(), &config).unwrap();
    let consumer = Queue::open_in(region).unwrap();

    // Cycle several rounds so ring cells are reused across attachments.
    let mut buf = Vec::new();
    for round in 0..6u64 {
        producer.push(&round.to_le_bytes()).unwrap();
        consumer.try_pop(&mut buf).unwrap().unwrap();
        assert_eq!(buf, round.to_le_bytes());
    }
}

#[test]
fn miri_overwrite_and_reset() {
    let config = QueueConfig::new(64, 2, true);
    let region = HeapRegion::new(config.region_bytes());
    let mut queue = Queue::create_in(region, &config).unwrap();

    for i in 0..4u8 {
        queue.push(&[i]).unwrap();
    }
    assert_eq!(queue.len(), 2);

    queue.reset();
    assert!(queue.is_empty());
    queue.push(b"fresh").unwrap();

    let mut buf = Vec::new();
    queue.pop(&mut buf).unwrap();
    assert_eq!(buf, b"fresh");
}

#[test]
fn miri_invalid_open_reports_format_error() {
    let region = HeapRegion::new(1024);
    assert!(matches!(
        Queue::open_in(region),
        Err(QueueError::InvalidFormat { .. })
    ));
}
