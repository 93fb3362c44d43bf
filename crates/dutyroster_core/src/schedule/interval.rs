//! Interval relations used by every conflict check.
//!
//! Occurrence intervals are half-open (`[start, end)`): two commitments that
//! merely touch do not overlap. Availability windows are closed, because a
//! window's end is the latest permissible end time.

/// Returns whether `[a_start, a_end)` and `[b_start, b_end)` intersect.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

/// Returns whether `[start, end)` lies within `[window_start, window_end]`.
pub fn contains<T: PartialOrd>(window_start: T, window_end: T, start: T, end: T) -> bool {
    window_start <= start && end <= window_end
}
