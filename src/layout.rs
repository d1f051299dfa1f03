//! Shared-region layout contract.
//!
//! A queue region is four sections, in order, each starting on a 64-byte
//! boundary:
//!
//! ```text
//! [ queue header ]
//! [ resource ring: RingHdr + capacity cells ]   free slot IDs
//! [ node ring:     RingHdr + capacity cells ]   filled slot IDs
//! [ slot array:    capacity x node_total_size ]
//! ```
//!
//! The creator writes the header and initializes both rings and the slot
//! array in place; every other attachment validates the magic and version,
//! recomputes the same offsets from the header fields, and binds typed views
//! over the sections. Fields are native-endian and native-alignment: the
//! layout is a single-host contract, not a portable wire format.

use crate::config::{round_up_cache_line, QueueConfig, CACHE_LINE};
use crate::queue::QueueError;
use crate::ring::IdRing;
use crate::slot::SLOT_HEADER_BYTES;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::AtomicBool;

/// Magic bytes `"SHMQRING"` identifying the region format.
pub(crate) const QUEUE_MAGIC: u64 = u64::from_le_bytes(*b"SHMQRING");

/// Region format version (increment on breaking layout changes).
pub(crate) const FORMAT_VERSION: u32 = 1;

/// Header at the start of every queue region.
///
/// Written once by the creator; `pause` is the only field mutated afterwards.
#[repr(C, align(64))]
pub(crate) struct QueueHeader {
    pub(crate) magic: u64,
    pub(crate) version: u32,
    /// Slot count. Power of two.
    pub(crate) node_count: u32,
    /// Per-slot payload capacity. 64-byte multiple.
    pub(crate) node_data_size: u64,
    /// Slot stride: header + payload capacity, rounded to a 64-byte multiple.
    pub(crate) node_total_size: u64,
    /// Key the region was created under; negative for borrowed memory that
    /// is not an OS-named segment.
    pub(crate) key: i32,
    pub(crate) overwrite: u8,
    pub(crate) pause: AtomicBool,
    _pad: [u8; 26],
}

/// Byte layout of a region for a given (slot count, payload size).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layout {
    pub(crate) node_count: u32,
    pub(crate) node_data_size: u64,
    pub(crate) node_total_size: u64,
    ring_bytes: usize,
    pub(crate) total_bytes: usize,
}

impl Layout {
    fn new(node_count: u32, node_data_size: u64) -> Self {
        debug_assert!(node_count.is_power_of_two());
        debug_assert_eq!(node_data_size % CACHE_LINE, 0);

        let node_total_size = round_up_cache_line(SLOT_HEADER_BYTES as u64 + node_data_size);
        let ring_bytes = align_up(IdRing::bytes_for(node_count), CACHE_LINE as usize);
        let total_bytes = mem::size_of::<QueueHeader>()
            + 2 * ring_bytes
            + node_count as usize * node_total_size as usize;

        Self {
            node_count,
            node_data_size,
            node_total_size,
            ring_bytes,
            total_bytes,
        }
    }

    pub(crate) fn for_config(config: &QueueConfig) -> Self {
        Self::new(config.node_count(), config.node_data_size())
    }

    /// Recomputes the layout from an attached header, cross-checking the
    /// recorded stride against what these fields imply.
    pub(crate) fn from_header(header: &QueueHeader) -> Result<Self, QueueError> {
        if header.node_count == 0 || !header.node_count.is_power_of_two() {
            return Err(QueueError::InvalidFormat {
                reason: "slot count is not a power of two",
            });
        }
        if header.node_data_size == 0 || header.node_data_size % CACHE_LINE != 0 {
            return Err(QueueError::InvalidFormat {
                reason: "payload capacity is not a 64-byte multiple",
            });
        }

        let layout = Self::new(header.node_count, header.node_data_size);
        if layout.node_total_size != header.node_total_size {
            return Err(QueueError::InvalidFormat {
                reason: "recorded slot stride does not match the layout",
            });
        }
        Ok(layout)
    }

    fn resource_ring_offset() -> usize {
        mem::size_of::<QueueHeader>()
    }

    fn node_ring_offset(&self) -> usize {
        Self::resource_ring_offset() + self.ring_bytes
    }

    fn slots_offset(&self) -> usize {
        Self::resource_ring_offset() + 2 * self.ring_bytes
    }

    fn slots_bytes(&self) -> usize {
        self.node_count as usize * self.node_total_size as usize
    }
}

/// Typed views over an initialized region's sections.
#[derive(Debug)]
pub(crate) struct RegionViews {
    pub(crate) header: NonNull<QueueHeader>,
    pub(crate) resource_ring: IdRing,
    pub(crate) node_ring: IdRing,
    pub(crate) slots: NonNull<u8>,
}

// SAFETY: the views only expose shared mutation through atomics (header
// pause flag, ring counters/cells); slot bytes are guarded by ID ownership.
unsafe impl Send for RegionViews {}
unsafe impl Sync for RegionViews {}

/// Initializes a queue in place: header, pre-filled resource ring, empty
/// node ring, zeroed slot array.
///
/// # Safety
///
/// `base` must point to at least `layout.total_bytes` writable bytes,
/// 64-byte aligned, with no concurrent access during initialization.
pub(crate) unsafe fn init_region(
    base: NonNull<u8>,
    layout: &Layout,
    overwrite: bool,
    key: i32,
) -> RegionViews {
    let header = base.cast::<QueueHeader>();
    ptr::write(
        header.as_ptr(),
        QueueHeader {
            magic: QUEUE_MAGIC,
            version: FORMAT_VERSION,
            node_count: layout.node_count,
            node_data_size: layout.node_data_size,
            node_total_size: layout.node_total_size,
            key,
            overwrite: u8::from(overwrite),
            pause: AtomicBool::new(false),
            _pad: [0; 26],
        },
    );

    let resource_base = NonNull::new_unchecked(base.as_ptr().add(Layout::resource_ring_offset()));
    let resource_ring = IdRing::init_at(resource_base, layout.node_count, layout.node_count);

    let node_base = NonNull::new_unchecked(base.as_ptr().add(layout.node_ring_offset()));
    let node_ring = IdRing::init_at(node_base, layout.node_count, 0);

    let slots = NonNull::new_unchecked(base.as_ptr().add(layout.slots_offset()));
    ptr::write_bytes(slots.as_ptr(), 0, layout.slots_bytes());

    RegionViews {
        header,
        resource_ring,
        node_ring,
        slots,
    }
}

/// Validates and binds typed views over a region initialized by
/// [`init_region`], possibly in another process.
///
/// # Safety
///
/// `base` must point to `region_len` mapped bytes, 64-byte aligned.
pub(crate) unsafe fn bind_region(
    base: NonNull<u8>,
    region_len: usize,
) -> Result<(RegionViews, Layout), QueueError> {
    if region_len < mem::size_of::<QueueHeader>() {
        return Err(QueueError::InvalidFormat {
            reason: "region smaller than the queue header",
        });
    }

    let header = base.cast::<QueueHeader>();
    {
        let h = header.as_ref();
        if h.magic != QUEUE_MAGIC {
            return Err(QueueError::InvalidFormat {
                reason: "magic number mismatch",
            });
        }
        if h.version != FORMAT_VERSION {
            return Err(QueueError::InvalidFormat {
                reason: "unsupported format version",
            });
        }
    }

    let layout = Layout::from_header(header.as_ref())?;
    if region_len < layout.total_bytes {
        return Err(QueueError::InvalidFormat {
            reason: "region truncated for the recorded layout",
        });
    }

    let resource_base = NonNull::new_unchecked(base.as_ptr().add(Layout::resource_ring_offset()));
    let resource_ring = IdRing::bind(resource_base);

    let node_base = NonNull::new_unchecked(base.as_ptr().add(layout.node_ring_offset()));
    let node_ring = IdRing::bind(node_base);

    if resource_ring.capacity() != layout.node_count || node_ring.capacity() != layout.node_count {
        return Err(QueueError::InvalidFormat {
            reason: "ring capacity disagrees with the header",
        });
    }

    let slots = NonNull::new_unchecked(base.as_ptr().add(layout.slots_offset()));

    Ok((
        RegionViews {
            header,
            resource_ring,
            node_ring,
            slots,
        },
        layout,
    ))
}

/// Re-initializes both rings and zeroes the slot array in place. The header
/// is left untouched; existing views stay valid because section addresses
/// and capacities do not change.
///
/// # Safety
///
/// As for [`init_region`]: no ring traffic may be in flight anywhere.
pub(crate) unsafe fn reset_region(base: NonNull<u8>, layout: &Layout) {
    let resource_base = NonNull::new_unchecked(base.as_ptr().add(Layout::resource_ring_offset()));
    let _ = IdRing::init_at(resource_base, layout.node_count, layout.node_count);

    let node_base = NonNull::new_unchecked(base.as_ptr().add(layout.node_ring_offset()));
    let _ = IdRing::init_at(node_base, layout.node_count, 0);

    let slots = base.as_ptr().add(layout.slots_offset());
    ptr::write_bytes(slots, 0, layout.slots_bytes());
}

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{HeapRegion, Region};

    #[test]
    fn test_header_is_one_cache_line() {
        assert_eq!(mem::size_of::<QueueHeader>(), 64);
    }

    #[test]
    fn test_layout_offsets_are_cache_aligned() {
        let layout = Layout::for_config(&QueueConfig::new(100, 5, false));
        assert_eq!(layout.node_count, 8);
        assert_eq!(layout.node_data_size, 128);
        assert_eq!(layout.node_total_size, 192);
        assert_eq!(Layout::resource_ring_offset() % 64, 0);
        assert_eq!(layout.node_ring_offset() % 64, 0);
        assert_eq!(layout.slots_offset() % 64, 0);
        assert_eq!(
            layout.total_bytes,
            layout.slots_offset() + 8 * layout.node_total_size as usize
        );
    }

    #[test]
    fn test_init_then_bind_round_trip() {
        let config = QueueConfig::new(64, 4, true);
        let layout = Layout::for_config(&config);
        let region = HeapRegion::new(layout.total_bytes);

        let views = unsafe { init_region(region.base(), &layout, config.overwrite, 42) };
        assert_eq!(views.resource_ring.len(), 4);
        assert!(views.node_ring.is_empty());

        let (bound, rebound_layout) =
            unsafe { bind_region(region.base(), region.len()) }.unwrap();
        let header = unsafe { bound.header.as_ref() };
        assert_eq!(header.node_count, 4);
        assert_eq!(header.key, 42);
        assert_eq!(header.overwrite, 1);
        assert_eq!(rebound_layout.total_bytes, layout.total_bytes);
    }

    #[test]
    fn test_bind_rejects_garbage() {
        let region = HeapRegion::new(4096);
        let err = unsafe { bind_region(region.base(), region.len()) }.unwrap_err();
        assert!(matches!(err, QueueError::InvalidFormat { .. }));
    }

    #[test]
    fn test_reset_restores_initial_ring_state() {
        let config = QueueConfig::new(64, 4, false);
        let layout = Layout::for_config(&config);
        let region = HeapRegion::new(layout.total_bytes);
        let views = unsafe { init_region(region.base(), &layout, false, -1) };

        let id = views.resource_ring.pop().unwrap();
        assert!(views.node_ring.push(id));

        unsafe { reset_region(region.base(), &layout) };
        assert_eq!(views.resource_ring.len(), 4);
        assert!(views.node_ring.is_empty());
    }
}
