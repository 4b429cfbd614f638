// emberbot-core/src/eventsub/dedup.rs

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Bounded record of recently handled EventSub message ids.
///
/// The platform may deliver the same message id more than once (retries, and
/// parallel deliveries for the same logical event). The first test-and-set
/// wins; every later call within the retention window reports the id as
/// already handled.
pub struct SeenMessageCache {
    retention: Duration,
    max_entries: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    seen: HashMap<String, DateTime<Utc>>,
    /// Insertion order, oldest first. Entries removed via `forget` linger
    /// here until eviction walks past them.
    order: VecDeque<String>,
}

impl SeenMessageCache {
    pub fn new(retention_secs: i64, max_entries: usize) -> Self {
        Self {
            retention: Duration::seconds(retention_secs),
            max_entries,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Atomic check-and-insert. `true` means the caller owns processing of
    /// this message id; `false` means it was already handled recently.
    pub fn should_process(&self, message_id: &str) -> bool {
        self.should_process_at(message_id, Utc::now())
    }

    /// Clock-injectable variant of [`should_process`](Self::should_process).
    pub fn should_process_at(&self, message_id: &str, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().unwrap();

        // Evict everything past the retention window.
        loop {
            let expired = match inner.order.front() {
                Some(front) => match inner.seen.get(front) {
                    Some(seen_at) => now.signed_duration_since(*seen_at) >= self.retention,
                    // Forgotten earlier; drop the stale order entry.
                    None => true,
                },
                None => break,
            };
            if !expired {
                break;
            }
            if let Some(id) = inner.order.pop_front() {
                inner.seen.remove(&id);
            }
        }

        if inner.seen.contains_key(message_id) {
            return false;
        }

        // Capacity cap: oldest out first.
        while inner.seen.len() >= self.max_entries {
            match inner.order.pop_front() {
                Some(id) => {
                    inner.seen.remove(&id);
                }
                None => break,
            }
        }

        inner.seen.insert(message_id.to_string(), now);
        inner.order.push_back(message_id.to_string());
        true
    }

    /// Releases a reservation taken by `should_process`, so that a platform
    /// retry of a failed delivery is processed instead of being swallowed as
    /// a duplicate.
    pub fn forget(&self, message_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.seen.remove(message_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_within_window_is_rejected() {
        let cache = SeenMessageCache::new(600, 100);
        let now = Utc::now();
        assert!(cache.should_process_at("msg-1", now));
        assert!(!cache.should_process_at("msg-1", now));
        assert!(!cache.should_process_at("msg-1", now + Duration::seconds(599)));
        assert!(cache.should_process_at("msg-2", now));
    }

    #[test]
    fn id_is_processable_again_after_retention() {
        let cache = SeenMessageCache::new(600, 100);
        let now = Utc::now();
        assert!(cache.should_process_at("msg-1", now));
        assert!(!cache.should_process_at("msg-1", now + Duration::seconds(300)));
        assert!(cache.should_process_at("msg-1", now + Duration::seconds(600)));
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let cache = SeenMessageCache::new(600, 2);
        let now = Utc::now();
        assert!(cache.should_process_at("a", now));
        assert!(cache.should_process_at("b", now + Duration::seconds(1)));
        assert!(cache.should_process_at("c", now + Duration::seconds(2)));
        assert_eq!(cache.len(), 2);
        // "a" fell out; "b" and "c" are still tracked.
        assert!(cache.should_process_at("a", now + Duration::seconds(3)));
        assert!(!cache.should_process_at("c", now + Duration::seconds(3)));
    }

    #[test]
    fn forget_releases_a_reservation() {
        let cache = SeenMessageCache::new(600, 100);
        let now = Utc::now();
        assert!(cache.should_process_at("msg-1", now));
        cache.forget("msg-1");
        assert!(cache.should_process_at("msg-1", now + Duration::seconds(1)));
    }
}
