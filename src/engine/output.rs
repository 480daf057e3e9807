//! Output store: resolved cache key -> rendered payload with an expiry.
//!
//! Consulted before a document is run and populated after, with the duration
//! the run declared for itself. Expired entries are treated as absent and
//! evicted opportunistically on the lookup that notices them; there is no
//! background sweep.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;

use crate::domain::RenderedPayload;

use super::lock::rw_write;

const SOURCE: &str = "engine::output";

const METRIC_OUTPUT_HIT: &str = "scrivano_output_hit_total";
const METRIC_OUTPUT_MISS: &str = "scrivano_output_miss_total";
const METRIC_OUTPUT_EXPIRED: &str = "scrivano_output_expired_total";
const METRIC_OUTPUT_STORE: &str = "scrivano_output_store_total";

/// One cached rendering.
#[derive(Clone)]
pub struct CachedOutput {
    pub payload: RenderedPayload,
    created_at: Instant,
    valid_for: Duration,
}

impl CachedOutput {
    // A duration too large to represent as an expiry instant never expires.
    fn expiry(&self) -> Option<Instant> {
        self.created_at.checked_add(self.valid_for)
    }

    fn expired_at(&self, now: Instant) -> bool {
        self.expiry().is_some_and(|expiry| now >= expiry)
    }

    fn remaining_at(&self, now: Instant) -> Duration {
        match self.expiry() {
            Some(expiry) => expiry.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }
}

pub struct OutputStore {
    entries: RwLock<LruCache<String, CachedOutput>>,
}

impl OutputStore {
    /// Create a store bounded to `limit` entries (clamped to at least one).
    pub fn new(limit: usize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(
                NonZeroUsize::new(limit).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Return the payload for `key` and its remaining validity, if a live
    /// entry exists.
    ///
    /// An expired entry counts as absent and is popped on the spot.
    pub fn lookup(&self, key: &str) -> Option<(RenderedPayload, Duration)> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "lookup");
        match entries.get(key) {
            Some(entry) if entry.expired_at(now) => {
                entries.pop(key);
                counter!(METRIC_OUTPUT_EXPIRED).increment(1);
                counter!(METRIC_OUTPUT_MISS).increment(1);
                None
            }
            Some(entry) => {
                counter!(METRIC_OUTPUT_HIT).increment(1);
                Some((entry.payload.clone(), entry.remaining_at(now)))
            }
            None => {
                counter!(METRIC_OUTPUT_MISS).increment(1);
                None
            }
        }
    }

    /// Cache `payload` under `key` for `valid_for`.
    ///
    /// A zero duration means "not cacheable" and stores nothing. A positive
    /// duration overwrites any existing entry unconditionally; the most
    /// recent write wins.
    pub fn store(&self, key: String, payload: RenderedPayload, valid_for: Duration) {
        if valid_for.is_zero() {
            return;
        }
        counter!(METRIC_OUTPUT_STORE).increment(1);
        rw_write(&self.entries, SOURCE, "store").put(
            key,
            CachedOutput {
                payload,
                created_at: Instant::now(),
                valid_for,
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        rw_write(&self.entries, SOURCE, "invalidate").pop(key);
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_write(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn payload(body: &str) -> RenderedPayload {
        RenderedPayload::new(Bytes::from(body.to_string()), "text/html", "utf-8")
    }

    #[test]
    fn store_then_lookup_round_trip() {
        let store = OutputStore::new(16);
        store.store("k".to_string(), payload("hello"), Duration::from_secs(60));

        let (hit, remaining) = store.lookup("k").expect("live entry");
        assert_eq!(hit.body, Bytes::from("hello"));
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(59));
    }

    #[test]
    fn zero_duration_stores_nothing() {
        let store = OutputStore::new(16);
        store.store("k".to_string(), payload("hello"), Duration::ZERO);
        assert!(store.lookup("k").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn expired_entry_is_absent_and_evicted() {
        let store = OutputStore::new(16);
        store.store("k".to_string(), payload("hello"), Duration::from_millis(20));

        std::thread::sleep(Duration::from_millis(40));

        assert!(store.lookup("k").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn most_recent_write_wins() {
        let store = OutputStore::new(16);
        store.store("k".to_string(), payload("old"), Duration::from_secs(60));
        store.store("k".to_string(), payload("new"), Duration::from_secs(60));

        let (hit, _) = store.lookup("k").expect("live entry");
        assert_eq!(hit.body, Bytes::from("new"));
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let store = OutputStore::new(2);
        store.store("a".to_string(), payload("a"), Duration::from_secs(60));
        store.store("b".to_string(), payload("b"), Duration::from_secs(60));
        store.store("c".to_string(), payload("c"), Duration::from_secs(60));

        assert!(store.lookup("a").is_none());
        assert!(store.lookup("b").is_some());
        assert!(store.lookup("c").is_some());
    }

    #[test]
    fn invalidate_removes_entry() {
        let store = OutputStore::new(16);
        store.store("k".to_string(), payload("hello"), Duration::from_secs(60));
        store.invalidate("k");
        assert!(store.lookup("k").is_none());
    }
}
