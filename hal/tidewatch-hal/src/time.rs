//! Monotonic time source
//!
//! Timestamps are `u32` milliseconds since boot and wrap after ~49 days.
//! All comparisons go through the helpers here so wrap-around is handled
//! in one place.

/// Monotonic millisecond clock
pub trait Clock {
    /// Milliseconds since an arbitrary fixed epoch (usually boot)
    fn now_ms(&self) -> u32;
}

/// Milliseconds elapsed from `since` to `now`, tolerant of wrap-around
#[inline]
pub fn elapsed_ms(since: u32, now: u32) -> u32 {
    now.wrapping_sub(since)
}

/// True once `now` has reached or passed `deadline`
///
/// Valid as long as the two instants are less than ~24 days apart.
#[inline]
pub fn deadline_reached(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_across_wrap() {
        assert_eq!(elapsed_ms(u32::MAX - 9, 10), 20);
        assert_eq!(elapsed_ms(100, 250), 150);
    }

    #[test]
    fn test_deadline_reached() {
        assert!(!deadline_reached(99, 100));
        assert!(deadline_reached(100, 100));
        assert!(deadline_reached(101, 100));
        // Deadline just after wrap
        assert!(!deadline_reached(u32::MAX, 5));
        assert!(deadline_reached(6, 5));
    }
}
