use crate::config::QueueConfig;
use crate::invariants::debug_assert_id_in_range;
use crate::layout::{self, Layout, QueueHeader, RegionViews};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::region::Region;
#[cfg(unix)]
use crate::region::SysvRegion;
use crate::slot;
use std::fmt::Write as _;
use std::hint;
use std::sync::atomic::Ordering;
use std::thread;
use thiserror::Error;

/// PAUSE-hint burst ceiling for the empty-queue wait in [`Queue::pop`].
/// Bursts double from 1 up to here, then the wait degrades to `yield_now`.
const POP_SPIN_LIMIT: u32 = 128;

/// Error types for queue operations.
///
/// All errors are returned by value and leave the shared state exactly as a
/// successful call would have left whatever it had already done; none are
/// fatal to the queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Payload exceeds the configured per-slot capacity.
    #[error("payload of {size} bytes exceeds the slot capacity of {max} bytes")]
    TooLarge {
        /// Bytes the caller tried to push.
        size: usize,
        /// Configured per-slot payload capacity.
        max: usize,
    },
    /// No free slot, and overwrite is disabled (or stealing raced empty).
    #[error("queue is full")]
    Full,
    /// The queue is in the paused state.
    #[error("queue is paused")]
    Paused,
    /// The key does not name an existing region.
    #[error("no shared region exists for key {key}")]
    NotFound {
        /// The key that was looked up.
        key: i32,
    },
    /// The key already names a region (exclusive creation failed).
    #[error("a shared region already exists for key {key}")]
    Exists {
        /// The key that was requested.
        key: i32,
    },
    /// The region does not hold a queue in the expected format.
    #[error("region is not a queue in the expected format: {reason}")]
    InvalidFormat {
        /// What the format validation tripped over.
        reason: &'static str,
    },
    /// A region-provider syscall failed.
    #[error("shared memory operation failed")]
    Os(#[from] std::io::Error),
}

/// Bounded lock-free MPMC message queue over a shared byte region.
///
/// Two slot-ID rings drive the queue: the *resource ring* circulates free
/// slot IDs (doubling as backpressure — no free ID means full) and the *node
/// ring* transfers filled slots to consumers. Push acquires a free ID, copies
/// the payload into that slot, and publishes the ID on the node ring; pop is
/// the mirror. Every shared mutation is an atomic on a ring or the header,
/// so any number of producers and consumers in any number of processes can
/// operate on one queue.
///
/// A handle owns its region attachment; dropping (or [`close`](Self::close))
/// detaches without destroying the shared segment.
///
/// # Example
///
/// ```
/// use shmqueue_rs::{HeapRegion, Queue, QueueConfig};
///
/// let config = QueueConfig::new(64, 8, false);
/// let region = HeapRegion::new(config.region_bytes());
///
/// let queue = Queue::create_in(region.clone(), &config).unwrap();
/// queue.push(b"hello").unwrap();
///
/// let consumer = Queue::open_in(region).unwrap();
/// let mut buf = Vec::new();
/// consumer.pop(&mut buf).unwrap();
/// assert_eq!(buf, b"hello");
/// ```
pub struct Queue<R: Region> {
    region: R,
    views: RegionViews,
    layout: Layout,
    metrics: Metrics,
}

// SAFETY: the views' raw pointers target the region owned by `region`;
// all shared mutation through them is atomic or slot-ownership-guarded.
unsafe impl<R: Region + Send> Send for Queue<R> {}
unsafe impl<R: Region + Sync> Sync for Queue<R> {}

impl<R: Region> Queue<R> {
    /// Initializes a queue inside `region`.
    ///
    /// The region is treated as borrowed memory rather than an OS-named
    /// segment: the header records a key of `-1`. The caller must not share
    /// `region` with concurrent users until this returns.
    pub fn create_in(region: R, config: &QueueConfig) -> Result<Self, QueueError> {
        Self::create_bound(region, config, -1)
    }

    pub(crate) fn create_bound(
        region: R,
        config: &QueueConfig,
        key: i32,
    ) -> Result<Self, QueueError> {
        let layout = Layout::for_config(config);
        if region.len() < layout.total_bytes {
            return Err(QueueError::InvalidFormat {
                reason: "region smaller than the computed layout",
            });
        }

        // SAFETY: the region holds at least total_bytes, providers deliver
        // 64-byte alignment, and the region is not yet shared.
        let views = unsafe { layout::init_region(region.base(), &layout, config.overwrite, key) };

        Ok(Self {
            region,
            views,
            layout,
            metrics: Metrics::new(),
        })
    }

    /// Attaches to a queue previously created in `region`, validating the
    /// magic number and format before binding typed views.
    pub fn open_in(region: R) -> Result<Self, QueueError> {
        // SAFETY: the provider vouches for base/len of a live mapping.
        let (views, layout) = unsafe { layout::bind_region(region.base(), region.len()) }?;

        Ok(Self {
            region,
            views,
            layout,
            metrics: Metrics::new(),
        })
    }

    #[inline]
    fn header(&self) -> &QueueHeader {
        // SAFETY: `region` keeps the mapping alive; binding validated it.
        unsafe { self.views.header.as_ref() }
    }

    #[inline]
    fn slot_ptr(&self, id: u32) -> *mut u8 {
        debug_assert_id_in_range!(id, self.layout.node_count);
        // SAFETY: id < node_count, so the offset stays inside the slot array.
        unsafe {
            self.views
                .slots
                .as_ptr()
                .add(id as usize * self.layout.node_total_size as usize)
        }
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Publishes `payload` with a tag of 0.
    #[inline]
    pub fn push(&self, payload: &[u8]) -> Result<(), QueueError> {
        self.push_with_tag(0, payload)
    }

    /// Publishes `payload` with a caller-chosen tag.
    ///
    /// With overwrite enabled, a full queue makes room by stealing the
    /// oldest filled slot off the node ring; that message is dropped without
    /// any signal to consumers (the drop is counted in this handle's
    /// [`metrics`](Self::metrics)).
    pub fn push_with_tag(&self, tag: u32, payload: &[u8]) -> Result<(), QueueError> {
        let max = self.layout.node_data_size as usize;
        if payload.len() > max {
            return Err(QueueError::TooLarge {
                size: payload.len(),
                max,
            });
        }

        if self.is_paused() {
            self.metrics.record_pause_rejection();
            return Err(QueueError::Paused);
        }

        let id = match self.views.resource_ring.pop() {
            Some(id) => id,
            None => {
                if self.is_overwrite() {
                    // Steal the oldest filled slot; its payload is dropped.
                    match self.views.node_ring.pop() {
                        Some(id) => {
                            self.metrics.record_overwrite_drop();
                            id
                        }
                        None => {
                            // Both rings observed empty under a race.
                            self.metrics.record_full_rejection();
                            return Err(QueueError::Full);
                        }
                    }
                } else {
                    self.metrics.record_full_rejection();
                    return Err(QueueError::Full);
                }
            }
        };

        // SAFETY: holding `id` grants exclusive write access to its slot,
        // and payload.len() <= node_data_size was checked above.
        unsafe { slot::write(self.slot_ptr(id), tag, payload) };

        // Room always exists: ring capacities match the slot count and we
        // hold this ID exclusively. A rejection can only mean a peer is
        // stalled between its counter CAS and its seq store on the target
        // cell; it clears as soon as that peer is scheduled.
        while !self.views.node_ring.push(id) {
            hint::spin_loop();
        }

        self.metrics.record_push();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Attempts to consume one message into `out` (cleared first).
    ///
    /// Returns `Ok(Some(tag))` on success, `Ok(None)` if the queue is empty,
    /// and [`QueueError::Paused`] if the queue is paused.
    pub fn try_pop(&self, out: &mut Vec<u8>) -> Result<Option<u32>, QueueError> {
        if self.is_paused() {
            self.metrics.record_pause_rejection();
            return Err(QueueError::Paused);
        }

        let id = match self.views.node_ring.pop() {
            Some(id) => id,
            None => return Ok(None),
        };

        // SAFETY: holding `id` grants exclusive read access to its slot.
        let tag = unsafe { slot::read(self.slot_ptr(id), self.layout.node_data_size, out) };

        // As in push: capacities match, so a rejection is a transiently
        // stalled peer on the target cell, never a real full ring.
        while !self.views.resource_ring.push(id) {
            hint::spin_loop();
        }

        self.metrics.record_pop();
        Ok(Some(tag))
    }

    /// Consumes one message into `out`, spinning until one arrives.
    ///
    /// The wait never blocks on a kernel primitive: each miss burns a burst
    /// of PAUSE hints, doubling per round up to [`POP_SPIN_LIMIT`], after
    /// which the wait degrades to `yield_now`. Every empty round is counted
    /// in this handle's [`metrics`](Self::metrics) (`empty_waits`), so an
    /// operator can see consumers outpacing producers. Returns the message
    /// tag, or [`QueueError::Paused`] as soon as the queue is paused —
    /// pausing is the way to release consumers stuck on an empty queue.
    pub fn pop(&self, out: &mut Vec<u8>) -> Result<u32, QueueError> {
        let mut spins = 1u32;
        loop {
            match self.try_pop(out)? {
                Some(tag) => return Ok(tag),
                None => {
                    self.metrics.record_empty_wait();
                    if spins <= POP_SPIN_LIMIT {
                        for _ in 0..spins {
                            hint::spin_loop();
                        }
                        spins <<= 1;
                    } else {
                        thread::yield_now();
                    }
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // CONTROL & INTROSPECTION
    // ---------------------------------------------------------------------

    /// Pauses the queue: pushes fail fast and pops return
    /// [`QueueError::Paused`]. Visible to every attached process.
    pub fn pause(&self) {
        self.header().pause.store(true, Ordering::Release);
    }

    /// Clears the pause flag.
    pub fn resume(&self) {
        self.header().pause.store(false, Ordering::Release);
    }

    /// Re-initializes both rings and zeroes every slot in place. The header
    /// (including the pause flag) is preserved.
    ///
    /// The caller must guarantee that no attachment in any process is
    /// pushing or popping for the duration; this cannot be checked locally.
    pub fn reset(&mut self) {
        // SAFETY: &mut self rules out racing through this handle; cross-
        // process quiescence is the caller's contract documented above.
        unsafe { layout::reset_region(self.region.base(), &self.layout) };
    }

    /// Detaches from the region. The shared segment (if any) is untouched;
    /// use [`Queue::destroy`] to remove a named segment.
    pub fn close(self) {
        drop(self);
    }

    /// Slot count (power of two).
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.layout.node_count
    }

    /// Per-slot payload capacity in bytes (64-byte multiple).
    #[inline]
    pub fn max_payload(&self) -> usize {
        self.layout.node_data_size as usize
    }

    /// Number of filled slots awaiting consumption. Racy by nature.
    #[inline]
    pub fn len(&self) -> usize {
        self.views.node_ring.len() as usize
    }

    /// True if no filled slot is awaiting consumption.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.views.node_ring.is_empty()
    }

    /// True if full-queue pushes drop the oldest message instead of failing.
    #[inline]
    pub fn is_overwrite(&self) -> bool {
        self.header().overwrite != 0
    }

    /// Current state of the shared pause flag.
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.header().pause.load(Ordering::Acquire)
    }

    /// Key the region was created under; negative for borrowed memory.
    #[inline]
    pub fn key(&self) -> i32 {
        self.header().key
    }

    /// Snapshot of this handle's operation counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Renders the header and both rings' counters for diagnostics.
    pub fn dump(&self) -> String {
        let header = self.header();
        let (resource_head, resource_tail) = self.views.resource_ring.counters();
        let (node_head, node_tail) = self.views.node_ring.counters();

        let mut out = String::new();
        let _ = writeln!(out, "Queue");
        let _ = writeln!(out, "  Header:");
        let _ = writeln!(out, "    Magic:           {:#018x}", header.magic);
        let _ = writeln!(out, "    Node Count:      {}", header.node_count);
        let _ = writeln!(out, "    Node Data Size:  {}", header.node_data_size);
        let _ = writeln!(out, "    Node Total Size: {}", header.node_total_size);
        let _ = writeln!(out, "    Overwrite:       {}", header.overwrite != 0);
        let _ = writeln!(out, "    Paused:          {}", self.is_paused());
        let _ = writeln!(out, "    Key:             {}", header.key);
        let _ = writeln!(out, "  Resource Ring:");
        let _ = writeln!(out, "    Head Seq:        {resource_head}");
        let _ = writeln!(out, "    Tail Seq:        {resource_tail}");
        let _ = writeln!(out, "  Node Ring:");
        let _ = writeln!(out, "    Head Seq:        {node_head}");
        let _ = writeln!(out, "    Tail Seq:        {node_tail}");
        out
    }
}

#[cfg(unix)]
impl Queue<SysvRegion> {
    /// Exclusively creates the shared segment for `key`, sized for `config`,
    /// and initializes a queue in it.
    pub fn create(key: i32, config: &QueueConfig) -> Result<Self, QueueError> {
        let layout = Layout::for_config(config);
        let region = SysvRegion::create(key, layout.total_bytes)?;
        Self::create_bound(region, config, key)
    }

    /// Attaches to the queue in the segment named by `key`.
    pub fn open(key: i32) -> Result<Self, QueueError> {
        Self::open_in(SysvRegion::open(key)?)
    }

    /// Removes the segment named by `key`. Existing attachments remain
    /// valid until they detach.
    pub fn destroy(key: i32) -> Result<(), QueueError> {
        SysvRegion::remove(key)
    }
}
