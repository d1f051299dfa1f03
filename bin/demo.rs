//! Producer/consumer demonstration over an in-process queue.
//!
//! Two producers publish checksummed messages while one consumer drains
//! them; totals and the handle metrics are printed at the end.
//!
//! Run with: `cargo run --bin demo`

use shmqueue_rs::{HeapRegion, Queue, QueueConfig, QueueError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const PRODUCERS: usize = 2;
const PER_PRODUCER: u64 = 100_000;

fn checksum(tag: u32, seq: u64) -> u64 {
    (u64::from(tag) << 48) ^ seq.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn main() {
    let config = QueueConfig::new(64, 1024, false);
    let region = HeapRegion::new(config.region_bytes());
    let queue = Arc::new(Queue::create_in(region, &config).expect("create queue"));

    println!(
        "demo: {} producers x {} messages, {} slots of {} bytes",
        PRODUCERS,
        PER_PRODUCER,
        queue.capacity(),
        queue.max_payload()
    );

    let start = Instant::now();
    let total = PRODUCERS * PER_PRODUCER as usize;
    let received = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer_id| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut payload = [0u8; 16];
                for seq in 0..PER_PRODUCER {
                    payload[..8].copy_from_slice(&seq.to_le_bytes());
                    payload[8..]
                        .copy_from_slice(&checksum(producer_id as u32, seq).to_le_bytes());
                    loop {
                        match queue.push_with_tag(producer_id as u32, &payload) {
                            Ok(()) => break,
                            Err(QueueError::Full) => thread::yield_now(),
                            Err(err) => panic!("push failed: {err}"),
                        }
                    }
                }
            })
        })
        .collect();

    let consumer = {
        let queue = Arc::clone(&queue);
        let received = Arc::clone(&received);
        thread::spawn(move || {
            let mut buf = Vec::new();
            let mut bad = 0u64;
            while received.load(Ordering::Acquire) < total {
                match queue.try_pop(&mut buf).expect("pop") {
                    Some(tag) => {
                        let seq = u64::from_le_bytes(buf[..8].try_into().expect("seq bytes"));
                        let sum = u64::from_le_bytes(buf[8..].try_into().expect("sum bytes"));
                        if sum != checksum(tag, seq) {
                            bad += 1;
                        }
                        received.fetch_add(1, Ordering::AcqRel);
                    }
                    None => thread::yield_now(),
                }
            }
            bad
        })
    };

    for handle in producers {
        handle.join().expect("producer");
    }
    let corrupted = consumer.join().expect("consumer");
    let elapsed = start.elapsed();

    println!(
        "received {} messages in {:.3}s ({:.0} msg/s), {} corrupted",
        received.load(Ordering::Acquire),
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64(),
        corrupted
    );
    println!("{}", queue.dump());
}
