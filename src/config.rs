/// Slots are sized and sections aligned to this many bytes.
pub(crate) const CACHE_LINE: u64 = 64;

/// Upper bound on the slot count (1M slots) to prevent excessive memory usage.
pub const MAX_NODE_COUNT: u32 = 1 << 20;

/// Upper bound on the per-slot payload capacity (16 MiB).
pub const MAX_DATA_SIZE: u64 = 1 << 24;

/// Creation parameters for a queue.
///
/// `count` and `data_size` are requests: creation rounds `count` up to a
/// power of two and `data_size` up to a 64-byte multiple. The rounded values
/// are recorded in the shared header and visible through the queue handle.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Maximum payload bytes per message (rounded up to a 64-byte multiple).
    pub data_size: u64,
    /// Number of payload slots (rounded up to a power of two).
    pub count: u32,
    /// On full-queue push, drop the oldest filled slot instead of refusing.
    pub overwrite: bool,
}

impl QueueConfig {
    /// Creates a new configuration with custom settings.
    ///
    /// # Panics
    ///
    /// Panics if `count` is 0 or exceeds [`MAX_NODE_COUNT`], or if
    /// `data_size` is 0 or exceeds [`MAX_DATA_SIZE`]. Both bounds are closed
    /// under rounding.
    pub const fn new(data_size: u64, count: u32, overwrite: bool) -> Self {
        assert!(count > 0, "count must be non-zero");
        assert!(count <= MAX_NODE_COUNT, "count must not exceed 1M slots");
        assert!(data_size > 0, "data_size must be non-zero");
        assert!(data_size <= MAX_DATA_SIZE, "data_size must not exceed 16 MiB");

        Self {
            data_size,
            count,
            overwrite,
        }
    }

    /// Slot count after power-of-two rounding.
    #[inline]
    pub const fn node_count(&self) -> u32 {
        round_up_pow2(self.count)
    }

    /// Per-slot payload capacity after cache-line rounding.
    #[inline]
    pub const fn node_data_size(&self) -> u64 {
        round_up_cache_line(self.data_size)
    }

    /// Total bytes a region must provide to host a queue with this
    /// configuration (header, both rings, slot array).
    pub fn region_bytes(&self) -> usize {
        crate::layout::Layout::for_config(self).total_bytes
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_size: 1024,
            count: 1024,
            overwrite: false,
        }
    }
}

/// Round up to the next power of two (identity for powers of two).
pub(crate) const fn round_up_pow2(n: u32) -> u32 {
    if n <= 1 {
        1
    } else {
        1 << (32 - (n - 1).leading_zeros())
    }
}

/// Round up to the next 64-byte multiple (identity for multiples).
pub(crate) const fn round_up_cache_line(n: u64) -> u64 {
    (n + (CACHE_LINE - 1)) & !(CACHE_LINE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow2_rounding() {
        assert_eq!(round_up_pow2(1), 1);
        assert_eq!(round_up_pow2(2), 2);
        assert_eq!(round_up_pow2(5), 8);
        assert_eq!(round_up_pow2(1023), 1024);
        assert_eq!(round_up_pow2(1024), 1024);
    }

    #[test]
    fn test_cache_line_rounding() {
        assert_eq!(round_up_cache_line(1), 64);
        assert_eq!(round_up_cache_line(64), 64);
        assert_eq!(round_up_cache_line(65), 128);
    }

    #[test]
    fn test_config_reports_rounded_values() {
        let config = QueueConfig::new(100, 5, false);
        assert_eq!(config.node_count(), 8);
        assert_eq!(config.node_data_size(), 128);
    }

    #[test]
    #[should_panic(expected = "count must be non-zero")]
    fn test_zero_count_rejected() {
        let _ = QueueConfig::new(64, 0, false);
    }
}
