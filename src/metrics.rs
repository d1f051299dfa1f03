use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one queue handle.
///
/// Counters are local to the attachment, not part of the shared region:
/// each handle observes its own traffic. Updates are relaxed; snapshots are
/// approximate under concurrency.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    pushes: CachePadded<AtomicU64>,
    pops: CachePadded<AtomicU64>,
    empty_waits: CachePadded<AtomicU64>,
    overwrite_drops: AtomicU64,
    full_rejections: AtomicU64,
    pause_rejections: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_push(&self) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_pop(&self) {
        self.pops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_empty_wait(&self) {
        self.empty_waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_overwrite_drop(&self) {
        self.overwrite_drops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_full_rejection(&self) {
        self.full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_pause_rejection(&self) {
        self.pause_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pushes: self.pushes.load(Ordering::Relaxed),
            pops: self.pops.load(Ordering::Relaxed),
            empty_waits: self.empty_waits.load(Ordering::Relaxed),
            overwrite_drops: self.overwrite_drops.load(Ordering::Relaxed),
            full_rejections: self.full_rejections.load(Ordering::Relaxed),
            pause_rejections: self.pause_rejections.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a handle's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages published through this handle.
    pub pushes: u64,
    /// Messages consumed through this handle.
    pub pops: u64,
    /// Empty rounds a blocking pop waited through on this handle.
    pub empty_waits: u64,
    /// Oldest-message drops performed by overwrite-mode pushes.
    pub overwrite_drops: u64,
    /// Pushes rejected because no slot was available.
    pub full_rejections: u64,
    /// Operations rejected while the queue was paused.
    pub pause_rejections: u64,
}
