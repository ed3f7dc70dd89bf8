//! Optimistic-concurrency check
//!
//! Pure decision: a write is stale iff the client supplied a base
//! timestamp and that base predates the currently stored `updated_at`.
//! A stale write still commits (last-writer-wins); the flag plus the
//! pre-write snapshot travel back to the client, which owns detection
//! and recovery. Data is never silently lost server-side.

/// Decide whether an incoming write conflicts with the stored state
///
/// An absent `client_base` means the caller has no opinion on recency,
/// so no conflict is possible.
#[must_use]
pub const fn is_stale(stored_updated_at: i64, client_base: Option<i64>) -> bool {
    matches!(client_base, Some(base) if base < stored_updated_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_when_base_predates_stored() {
        assert!(is_stale(1005, Some(1000)));
    }

    #[test]
    fn not_stale_when_base_matches_stored() {
        assert!(!is_stale(1005, Some(1005)));
    }

    #[test]
    fn not_stale_when_base_is_newer() {
        assert!(!is_stale(1005, Some(1010)));
    }

    #[test]
    fn absent_base_never_conflicts() {
        assert!(!is_stale(i64::MAX, None));
    }
}
