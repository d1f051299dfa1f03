//! Region providers.
//!
//! The queue core works over any contiguously addressable byte region; the
//! provider decides where those bytes live. [`SysvRegion`] maps an OS-named
//! System V segment so unrelated processes can attach by integer key.
//! [`HeapRegion`] owns plain process memory for in-process queues and tests;
//! it is the "borrowed memory" case — there is no named segment to detach
//! from or remove.

#[cfg(unix)]
use crate::queue::QueueError;
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout as AllocLayout};
use std::ptr::NonNull;
use std::sync::Arc;

/// Alignment every provider must deliver: the layout pins each region
/// section to a cache-line boundary.
const REGION_ALIGN: usize = 64;

/// A contiguously addressable byte region hosting one queue.
pub trait Region {
    /// Base address of the region. Must be 64-byte aligned.
    fn base(&self) -> NonNull<u8>;

    /// Region length in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------
// Heap-backed region
// ---------------------------------------------------------------------

struct AlignedBuf {
    ptr: NonNull<u8>,
    layout: AllocLayout,
}

// SAFETY: AlignedBuf is a plain allocation; all concurrent access to its
// bytes goes through the queue's atomics and slot-ownership protocol.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: allocated in HeapRegion::new with exactly this layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Zero-initialized, 64-byte-aligned process memory.
///
/// Clones share the same allocation, modelling multiple attachments to one
/// region within a single process.
#[derive(Clone)]
pub struct HeapRegion {
    inner: Arc<AlignedBuf>,
}

impl HeapRegion {
    /// Allocates a zeroed region of `len` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero or overflows the allocator's size limits.
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "region length must be non-zero");
        let layout = match AllocLayout::from_size_align(len, REGION_ALIGN) {
            Ok(layout) => layout,
            Err(_) => panic!("region length {len} overflows the allocator"),
        };

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        };

        Self {
            inner: Arc::new(AlignedBuf { ptr, layout }),
        }
    }
}

impl Region for HeapRegion {
    fn base(&self) -> NonNull<u8> {
        self.inner.ptr
    }

    fn len(&self) -> usize {
        self.inner.layout.size()
    }
}

// ---------------------------------------------------------------------
// System V shared-memory region
// ---------------------------------------------------------------------

/// An attachment to a System V shared-memory segment.
///
/// Dropping the value detaches the local mapping (`shmdt`); the segment
/// itself lives until [`SysvRegion::remove`] destroys it by key.
#[cfg(unix)]
pub struct SysvRegion {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is process-global; the handle only hands out the base
// pointer and length. Concurrent access discipline lives in the queue.
#[cfg(unix)]
unsafe impl Send for SysvRegion {}
#[cfg(unix)]
unsafe impl Sync for SysvRegion {}

#[cfg(unix)]
impl SysvRegion {
    /// Exclusively creates a segment of `len` bytes under `key`.
    pub fn create(key: i32, len: usize) -> Result<Self, QueueError> {
        // SAFETY: shmget has no memory-safety preconditions.
        let shmid = unsafe { libc::shmget(key, len, libc::IPC_CREAT | libc::IPC_EXCL | 0o666) };
        if shmid < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EEXIST) {
                return Err(QueueError::Exists { key });
            }
            return Err(QueueError::Os(err));
        }
        Self::attach(shmid, len)
    }

    /// Attaches to the existing segment named by `key`.
    pub fn open(key: i32) -> Result<Self, QueueError> {
        let shmid = Self::lookup(key)?;

        // The creator sized the segment; recover the length from the kernel.
        // SAFETY: ds is a plain output struct for IPC_STAT.
        let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
        if unsafe { libc::shmctl(shmid, libc::IPC_STAT, &mut ds) } != 0 {
            return Err(QueueError::Os(std::io::Error::last_os_error()));
        }
        Self::attach(shmid, ds.shm_segsz as usize)
    }

    /// Removes the segment named by `key`. Existing attachments remain valid
    /// until they detach.
    pub fn remove(key: i32) -> Result<(), QueueError> {
        let shmid = Self::lookup(key)?;
        // SAFETY: IPC_RMID takes no buffer.
        if unsafe { libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut()) } != 0 {
            return Err(QueueError::Os(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn lookup(key: i32) -> Result<i32, QueueError> {
        // SAFETY: shmget has no memory-safety preconditions.
        let shmid = unsafe { libc::shmget(key, 0, 0) };
        if shmid < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOENT) {
                return Err(QueueError::NotFound { key });
            }
            return Err(QueueError::Os(err));
        }
        Ok(shmid)
    }

    fn attach(shmid: i32, len: usize) -> Result<Self, QueueError> {
        // SAFETY: shmat maps the segment at a kernel-chosen, page-aligned
        // (therefore 64-byte-aligned) address.
        let raw = unsafe { libc::shmat(shmid, std::ptr::null(), 0) };
        if raw as isize == -1 {
            return Err(QueueError::Os(std::io::Error::last_os_error()));
        }
        match NonNull::new(raw.cast::<u8>()) {
            Some(base) => Ok(Self { base, len }),
            None => Err(QueueError::Os(std::io::Error::last_os_error())),
        }
    }
}

#[cfg(unix)]
impl Drop for SysvRegion {
    fn drop(&mut self) {
        // SAFETY: base came from shmat and is detached exactly once.
        unsafe { libc::shmdt(self.base.as_ptr().cast()) };
    }
}

#[cfg(unix)]
impl Region for SysvRegion {
    fn base(&self) -> NonNull<u8> {
        self.base
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_region_is_zeroed_and_aligned() {
        let region = HeapRegion::new(4096);
        assert_eq!(region.len(), 4096);
        assert_eq!(region.base().as_ptr() as usize % REGION_ALIGN, 0);

        // SAFETY: freshly allocated, solely owned here.
        let bytes = unsafe { std::slice::from_raw_parts(region.base().as_ptr(), region.len()) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_heap_region_clones_share_memory() {
        let a = HeapRegion::new(64);
        let b = a.clone();
        assert_eq!(a.base(), b.base());

        // SAFETY: single-threaded test, no aliasing reads in flight.
        unsafe { *a.base().as_ptr() = 0xAB };
        assert_eq!(unsafe { *b.base().as_ptr() }, 0xAB);
    }

    #[cfg(unix)]
    #[test]
    fn test_sysv_open_missing_key_is_not_found() {
        // A key derived from the pid is extremely unlikely to exist.
        let key = 0x5143_0000 | (std::process::id() as i32 & 0xFFFF);
        assert!(matches!(
            SysvRegion::open(key),
            Err(QueueError::NotFound { .. })
        ));
    }
}
