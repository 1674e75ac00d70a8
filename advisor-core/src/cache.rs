//! Response cache for the general (non-chart) path
//!
//! Keyed by the SHA-256 of `lowercase(trim(text))`. Entries expire after the
//! TTL and are evicted lazily on the `get` that finds them stale. Capacity
//! overflow evicts the oldest-inserted entry (FIFO), not the least recently
//! read one. Updating an existing key refreshes its value and timestamp but
//! not its queue position. All state sits behind one mutex so each call is
//! atomic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Keys in insertion order, oldest first.
    order: VecDeque<String>,
}

pub struct ResponseCache<V> {
    state: Mutex<CacheState<V>>,
    capacity: usize,
    ttl: Duration,
}

/// Deterministic fingerprint of normalized request text.
pub fn fingerprint(text: &str) -> String {
    let normalized = text.trim().to_lowercase();
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, text: &str) -> Option<V> {
        let key = fingerprint(text);
        let mut state = self.lock();

        let expired = match state.entries.get(&key) {
            None => return None,
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
        };

        if expired {
            state.entries.remove(&key);
            state.order.retain(|k| k != &key);
            tracing::debug!(key = %key, "Cache entry expired");
            return None;
        }

        state.entries.get(&key).map(|e| e.value.clone())
    }

    pub fn set(&self, text: &str, value: V) {
        if self.capacity == 0 {
            return;
        }

        let key = fingerprint(text);
        let mut state = self.lock();

        // An update keeps the key's original place in the insertion order.
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.value = value;
            entry.inserted_at = Instant::now();
            return;
        }

        // Drop stale entries before counting.
        let ttl = self.ttl;
        let CacheState { entries, order } = &mut *state;
        entries.retain(|_, e| e.inserted_at.elapsed() <= ttl);
        order.retain(|k| entries.contains_key(k));

        while entries.len() >= self.capacity {
            match order.pop_front() {
                Some(oldest) => {
                    entries.remove(&oldest);
                    tracing::debug!(key = %oldest, "Cache full, evicted oldest entry");
                }
                None => break,
            }
        }

        entries.insert(
            key.clone(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        order.push_back(key);
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }

    /// Number of stored entries, including ones not yet lazily expired.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cache(capacity: usize) -> ResponseCache<String> {
        ResponseCache::new(capacity, Duration::from_secs(3600))
    }

    #[test]
    fn test_fingerprint_normalizes_case_and_whitespace() {
        let a = fingerprint("What is a good marketing channel?");
        let b = fingerprint("  WHAT IS A GOOD MARKETING CHANNEL?\n");
        assert_eq!(a, b);
        assert_ne!(a, fingerprint("different question"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_set_then_get() {
        let c = cache(10);
        assert!(c.get("What is Python?").is_none());
        c.set("What is Python?", "A language".to_string());
        assert_eq!(c.get("what is python?").as_deref(), Some("A language"));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let c: ResponseCache<String> = ResponseCache::new(10, Duration::from_millis(50));
        c.set("q", "a".to_string());
        assert_eq!(c.get("q").as_deref(), Some("a"));

        std::thread::sleep(Duration::from_millis(120));
        assert!(c.get("q").is_none());
        // lazily evicted on the miss
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn test_fifo_eviction_ignores_reads() {
        let c = cache(3);
        c.set("one", "1".to_string());
        c.set("two", "2".to_string());
        c.set("three", "3".to_string());

        // reading "one" must not protect it
        assert!(c.get("one").is_some());

        c.set("four", "4".to_string());
        assert!(c.get("one").is_none(), "earliest-inserted entry evicted first");
        assert!(c.get("two").is_some());
        assert!(c.get("three").is_some());
        assert!(c.get("four").is_some());
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_update_keeps_original_queue_position() {
        let c = cache(2);
        c.set("a", "1".to_string());
        c.set("b", "2".to_string());
        c.set("A", "updated".to_string());
        assert_eq!(c.len(), 2);
        assert_eq!(c.get("a").as_deref(), Some("updated"));

        // "a" was inserted first; the update does not move it back
        c.set("c", "3".to_string());
        assert!(c.get("a").is_none());
        assert_eq!(c.get("b").as_deref(), Some("2"));
        assert_eq!(c.get("c").as_deref(), Some("3"));
    }

    #[test]
    fn test_update_refreshes_ttl_without_hiding_stale_entries() {
        let c: ResponseCache<String> = ResponseCache::new(2, Duration::from_millis(80));
        c.set("a", "1".to_string());
        c.set("b", "2".to_string());
        std::thread::sleep(Duration::from_millis(120));

        // "a" is fresh again but stays at the front, "b" behind it is stale
        c.set("a", "updated".to_string());
        c.set("c", "3".to_string());

        assert_eq!(c.get("a").as_deref(), Some("updated"));
        assert_eq!(c.get("c").as_deref(), Some("3"));
        assert!(c.get("b").is_none());
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let c = cache(0);
        c.set("q", "a".to_string());
        assert!(c.get("q").is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn test_clear() {
        let c = cache(5);
        c.set("q", "a".to_string());
        c.clear();
        assert!(c.is_empty());
        assert!(c.get("q").is_none());
    }

    #[test]
    fn test_concurrent_sets_respect_capacity() {
        let c = Arc::new(cache(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        c.set(&format!("t{t}-q{i}"), format!("{i}"));
                        let _ = c.get(&format!("t{t}-q{i}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.len(), 50);
    }
}
