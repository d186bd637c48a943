//! Process-wide configuration toggles.
//!
//! A handful of run-level flags are awkward to thread through every
//! backtracker and handler call, so (following the same pattern as other
//! tools in this family) they live in global atomics, set once from CLI
//! flags at startup and read everywhere else.

use std::sync::atomic::{AtomicBool, Ordering};

static DEDUP_ENABLED: AtomicBool = AtomicBool::new(false);
static NO_COMPARISON_SKIP: AtomicBool = AtomicBool::new(false);

/// Enables the range store's `isRangeKnown` dedup check. Off by default,
/// matching the source default of "skip check".
#[inline]
pub fn set_dedup_enabled(value: bool) {
    DEDUP_ENABLED.store(value, Ordering::Release);
}

#[inline]
pub fn is_dedup_enabled() -> bool {
    DEDUP_ENABLED.load(Ordering::Acquire)
}

/// When set, the backtracker skips the `isRangeKnown` dedup check even if
/// [`is_dedup_enabled`] is true. Resolves the open question in the design
/// notes: this flag always wins over dedup being enabled.
#[inline]
pub fn set_no_comparison_skip(value: bool) {
    NO_COMPARISON_SKIP.store(value, Ordering::Release);
}

#[inline]
pub fn no_comparison_skip() -> bool {
    NO_COMPARISON_SKIP.load(Ordering::Acquire)
}

/// Whether the backtracker should perform the `isRangeKnown` dedup check
/// for this run, combining both flags per the resolved open question.
#[inline]
pub fn should_check_known_range() -> bool {
    is_dedup_enabled() && !no_comparison_skip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn no_comparison_skip_overrides_dedup() {
        set_dedup_enabled(true);
        set_no_comparison_skip(true);
        assert!(!should_check_known_range());
        set_no_comparison_skip(false);
        assert!(should_check_known_range());
        set_dedup_enabled(false);
        set_no_comparison_skip(false);
    }
}
