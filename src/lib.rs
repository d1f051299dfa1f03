//! shmqueue - Lock-Free MPMC Message Queue over Shared Memory
//!
//! A bounded multi-producer multi-consumer byte-message queue backed by a
//! single contiguous shared-memory region, for IPC between cooperating
//! processes on one host. Two lock-free slot-ID rings drive the queue: a
//! *resource ring* of free slots and a *node ring* of filled slots, over a
//! fixed array of cache-line-sized payload slots.
//!
//! # Key Features
//!
//! - Per-cell rotating sequence numbers (no locks, no ABA on slot reuse)
//! - Any number of producers and consumers, across processes
//! - Optional overwrite mode: full-queue pushes drop the oldest message
//! - Shared pause flag to quiesce all attachments without losing state
//! - Pluggable region providers: System V shared memory or heap memory
//!
//! # Example
//!
//! ```
//! use shmqueue_rs::{HeapRegion, Queue, QueueConfig};
//!
//! let config = QueueConfig::new(64, 8, false);
//! let region = HeapRegion::new(config.region_bytes());
//!
//! let queue = Queue::create_in(region.clone(), &config).unwrap();
//! queue.push_with_tag(1, b"hello").unwrap();
//!
//! let consumer = Queue::open_in(region).unwrap();
//! let mut buf = Vec::new();
//! let tag = consumer.pop(&mut buf).unwrap();
//! assert_eq!((tag, buf.as_slice()), (1, &b"hello"[..]));
//! ```
//!
//! Cross-process use goes through [`ShmQueue`]: one process calls
//! `ShmQueue::create(key, &config)`, any other attaches with
//! `ShmQueue::open(key)`, and `ShmQueue::destroy(key)` removes the segment.

mod config;
mod invariants;
mod layout;
mod metrics;
mod queue;
mod region;
mod ring;
mod slot;

pub use config::{QueueConfig, MAX_DATA_SIZE, MAX_NODE_COUNT};
pub use metrics::MetricsSnapshot;
pub use queue::{Queue, QueueError};
pub use region::{HeapRegion, Region};
#[cfg(unix)]
pub use region::SysvRegion;

/// Queue over a System V shared-memory segment, addressable by integer key.
#[cfg(unix)]
pub type ShmQueue = Queue<SysvRegion>;
