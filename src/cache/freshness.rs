//! Freshness policy: a cached row is served only while its age is within
//! the window for its kind. The check is boundary-inclusive, an entry
//! exactly at the window edge is still fresh.

use chrono::{DateTime, Duration, Utc};

/// Is an entry written at `last_updated` still fresh under `max_age`?
#[inline]
pub fn is_fresh(last_updated: DateTime<Utc>, max_age: Duration) -> bool {
    is_fresh_at(last_updated, max_age, Utc::now())
}

/// Clock-injectable form of [`is_fresh`].
#[inline]
pub fn is_fresh_at(last_updated: DateTime<Utc>, max_age: Duration, now: DateTime<Utc>) -> bool {
    now - last_updated <= max_age
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_entry_is_fresh() {
        let now = Utc::now();
        assert!(is_fresh_at(now - Duration::hours(1), Duration::hours(24), now));
    }

    #[test]
    fn boundary_is_inclusive() {
        let now = Utc::now();
        let window = Duration::hours(24);

        assert!(is_fresh_at(now - window, window, now));
        assert!(!is_fresh_at(now - window - Duration::seconds(1), window, now));
    }

    #[test]
    fn future_timestamp_is_fresh() {
        // Clock skew between writer and reader must not expire entries.
        let now = Utc::now();
        assert!(is_fresh_at(now + Duration::minutes(5), Duration::hours(1), now));
    }

    #[test]
    fn zero_age_entry_is_fresh() {
        let now = Utc::now();
        assert!(is_fresh_at(now, Duration::hours(24), now));
    }
}
