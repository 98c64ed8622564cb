// nonce.rs — Bounded replay cache.
//
// Nonces are scoped per identity: two identities may legitimately pick the
// same nonce. An entry lives for `ttl` after first sight; beyond `capacity`
// entries the oldest is evicted. Check-and-insert is a single critical
// section so two concurrent requests carrying the same nonce cannot both pass.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_NONCE_CAPACITY: usize = 10_000;

pub fn default_nonce_ttl() -> Duration {
    Duration::minutes(10)
}

type NonceKey = (String, String);

#[derive(Debug, Default)]
struct Inner {
    seen: HashMap<NonceKey, DateTime<Utc>>,
    // Insertion order; may hold stale keys that were refreshed later.
    order: VecDeque<(NonceKey, DateTime<Utc>)>,
}

/// Recently seen `(identity, nonce)` pairs.
#[derive(Debug)]
pub struct NonceCache {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl Default for NonceCache {
    fn default() -> Self {
        Self::new(DEFAULT_NONCE_CAPACITY, default_nonce_ttl())
    }
}

impl NonceCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record the nonce. Returns `false` if it was already seen within the
    /// TTL (a replay), `true` if it is fresh.
    pub fn check_and_insert(&self, identity_id: &str, nonce: &str, now: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        self.prune_expired(&mut inner, now);

        let key = (identity_id.to_string(), nonce.to_string());
        if let Some(first_seen) = inner.seen.get(&key) {
            if now - *first_seen < self.ttl {
                return false;
            }
        }

        inner.seen.insert(key.clone(), now);
        inner.order.push_back((key, now));

        while inner.seen.len() > self.capacity {
            let Some((old_key, at)) = inner.order.pop_front() else {
                break;
            };
            if inner.seen.get(&old_key) == Some(&at) {
                inner.seen.remove(&old_key);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().seen.is_empty()
    }

    fn prune_expired(&self, inner: &mut Inner, now: DateTime<Utc>) {
        while let Some((key, at)) = inner.order.front() {
            if now - *at < self.ttl {
                break;
            }
            if inner.seen.get(key) == Some(at) {
                let key = key.clone();
                inner.seen.remove(&key);
            }
            inner.order.pop_front();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_sighting_is_a_replay() {
        let cache = NonceCache::default();
        let now = Utc::now();
        assert!(cache.check_and_insert("u1", "n-1", now));
        assert!(!cache.check_and_insert("u1", "n-1", now + Duration::seconds(1)));
    }

    #[test]
    fn nonces_are_scoped_per_identity() {
        let cache = NonceCache::default();
        let now = Utc::now();
        assert!(cache.check_and_insert("u1", "shared", now));
        assert!(cache.check_and_insert("u2", "shared", now));
    }

    #[test]
    fn nonce_is_accepted_again_after_ttl() {
        let cache = NonceCache::default();
        let now = Utc::now();
        assert!(cache.check_and_insert("u1", "n", now));
        assert!(!cache.check_and_insert("u1", "n", now + Duration::minutes(9)));
        assert!(cache.check_and_insert("u1", "n", now + Duration::minutes(10)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = NonceCache::new(3, default_nonce_ttl());
        let now = Utc::now();
        for i in 0..4 {
            assert!(cache.check_and_insert("u", &format!("n{}", i), now));
        }
        assert_eq!(cache.len(), 3);
        // n0 was evicted, so it reads as fresh; n3 is still remembered.
        assert!(!cache.check_and_insert("u", "n3", now));
        assert!(cache.check_and_insert("u", "n0", now));
    }

    #[test]
    fn flood_stays_bounded() {
        let cache = NonceCache::new(100, default_nonce_ttl());
        let now = Utc::now();
        for i in 0..10_000 {
            cache.check_and_insert("flood", &i.to_string(), now);
        }
        assert_eq!(cache.len(), 100);
    }
}
