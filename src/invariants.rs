//! Debug assertion macros for queue and ring invariants.
//!
//! These macros provide runtime checks for the documented invariants of the
//! slot-ID rings and the dual-ring queue. They are only active in debug
//! builds (`#[cfg(debug_assertions)]`), so there is zero overhead in release
//! builds.

// =============================================================================
// INV-RING-01: Bounded Count
// =============================================================================

/// Assert that a ring never holds more IDs than its capacity.
///
/// **Invariant**: `0 ≤ (tail_seq - head_seq) ≤ capacity`
///
/// Used in: `IdRing::push()` after winning the tail CAS
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "INV-RING-01 violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

// =============================================================================
// INV-RING-02: Monotonic Progress
// =============================================================================

/// Assert that a head/tail counter only increases.
///
/// **Invariant**: `new_value ≥ old_value` (counters are 64-bit and never wrap
/// in practice)
///
/// Used in: `IdRing::push()` and `IdRing::pop()` around the counter CAS
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-RING-02 violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-ID-01: Slot ID Range
// =============================================================================

/// Assert that a slot ID circulating between the rings addresses a real slot.
///
/// **Invariant**: every ID handed out by either ring is in `[0, node_count)`
///
/// Used in: `Queue::push()` / `Queue::pop()` after obtaining an ID
macro_rules! debug_assert_id_in_range {
    ($id:expr, $count:expr) => {
        debug_assert!(
            $id < $count,
            "INV-ID-01 violated: slot id {} outside [0, {})",
            $id,
            $count
        )
    };
}

// =============================================================================
// INV-SLOT-01: Recorded Size
// =============================================================================

/// Assert that a filled slot's recorded size fits the configured capacity.
///
/// **Invariant**: `slot.size ≤ node_data_size` for every slot published on
/// the node ring
///
/// Used in: `slot::read()` before copying out
macro_rules! debug_assert_slot_size {
    ($size:expr, $max:expr) => {
        debug_assert!(
            $size <= $max,
            "INV-SLOT-01 violated: slot records {} bytes but capacity is {}",
            $size,
            $max
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_id_in_range;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_slot_size;
