//! Per-agent record of recently viewed profiles.
//!
//! A profile stays "fresh" for [`VIEW_TTL`] after it was last viewed. Only
//! fresh profiles are eligible like targets, so an agent always looks at a
//! profile before liking it.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;

/// How long a recorded view keeps a profile eligible for a like.
pub const VIEW_TTL: Duration = Duration::from_secs(5 * 60);

/// Time-bounded set of recently viewed profile ids.
///
/// Touched from the action loop (recording visits) and consulted by the
/// like action, so the map sits behind an `RwLock`.
#[derive(Debug)]
pub struct ViewCache {
    entries: RwLock<HashMap<i64, Instant>>,
    ttl: Duration,
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewCache {
    /// Create an empty cache with the standard TTL
    pub fn new() -> Self {
        Self::with_ttl(VIEW_TTL)
    }

    /// Create an empty cache with a custom TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Record a view of `profile_id` now
    pub fn record(&self, profile_id: i64) {
        self.record_at(profile_id, Instant::now());
    }

    /// Record a view at `now`, sweeping every entry older than the TTL
    pub fn record_at(&self, profile_id: i64, now: Instant) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(profile_id, now);
        let ttl = self.ttl;
        entries.retain(|_, viewed| now.saturating_duration_since(*viewed) <= ttl);
    }

    /// Whether `profile_id` was viewed within the TTL
    pub fn is_fresh(&self, profile_id: i64) -> bool {
        self.is_fresh_at(profile_id, Instant::now())
    }

    /// Whether `profile_id` was viewed within the TTL as of `now`
    pub fn is_fresh_at(&self, profile_id: i64, now: Instant) -> bool {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries
            .get(&profile_id)
            .is_some_and(|viewed| now.saturating_duration_since(*viewed) <= self.ttl)
    }

    /// Number of entries currently held, fresh or not
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_boundary() {
        let cache = ViewCache::new();
        let t = Instant::now();
        cache.record_at(42, t);

        assert!(cache.is_fresh_at(42, t + Duration::from_secs(4 * 60 + 59)));
        assert!(!cache.is_fresh_at(42, t + Duration::from_secs(5 * 60 + 1)));
    }

    #[test]
    fn test_unknown_profile_not_fresh() {
        let cache = ViewCache::new();
        assert!(!cache.is_fresh(7));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_sweeps_expired_entries() {
        let cache = ViewCache::new();
        let t = Instant::now();
        cache.record_at(1, t);
        cache.record_at(2, t + Duration::from_secs(60));
        assert_eq!(cache.len(), 2);

        // Six minutes later: entry 1 is past the TTL, entry 2 is not
        let later = t + Duration::from_secs(6 * 60);
        for id in 10..13 {
            cache.record_at(id, later);
        }

        assert_eq!(cache.len(), 4);
        assert!(!cache.is_fresh_at(1, later));
        assert!(cache.is_fresh_at(2, later));
    }

    #[test]
    fn test_record_refreshes_timestamp() {
        let cache = ViewCache::new();
        let t = Instant::now();
        cache.record_at(5, t);
        cache.record_at(5, t + Duration::from_secs(4 * 60));

        assert!(cache.is_fresh_at(5, t + Duration::from_secs(8 * 60)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = std::sync::Arc::new(ViewCache::new());
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for id in 0..100 {
                        cache.record(n * 100 + id);
                        let _ = cache.is_fresh(id);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 400);
    }
}
