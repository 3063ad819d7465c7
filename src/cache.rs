//! Response cache.
//!
//! Process-wide map from (prompt, session) to a previously generated
//! response with a fixed TTL. Expiration is lazy: an entry older than the
//! TTL is treated as absent on read and removed then, never by a background
//! sweep. Growth is otherwise unbounded (accepted limitation, see
//! DESIGN.md).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheSettings;

/// A cached completion.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Generated response text.
    pub response: String,
    /// Model that produced the response.
    pub model: String,
    /// Token-count estimate recorded at generation time.
    pub tokens: u32,
    /// Selection reason recorded at generation time.
    pub reason: String,
    /// Insertion time; entries are never mutated after creation.
    created: Instant,
}

/// TTL cache keyed by a deterministic hash of session id and prompt.
pub struct ResponseCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    inner: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: Duration::from_secs(settings.ttl_secs),
            clock,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Deterministic cache key: sha256 of `"{session_id}:{prompt}"`.
    ///
    /// The key deliberately ignores intervening turns, so a repeated prompt
    /// within a session hits the cache even after the conversation moved on.
    pub fn key(prompt: &str, session_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_bytes());
        hasher.update(b":");
        hasher.update(prompt.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up a fresh entry; a TTL-expired entry is removed and reported
    /// as absent.
    pub fn get(&self, prompt: &str, session_id: &str) -> Option<CacheEntry> {
        let key = Self::key(prompt, session_id);
        let now = self.clock.now();

        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match map.get(&key) {
            Some(entry) if now.duration_since(entry.created) < self.ttl => Some(entry.clone()),
            Some(_) => {
                map.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Insert (or overwrite) the entry for this prompt and session.
    pub fn set(&self, prompt: &str, session_id: &str, response: &str, model: &str, tokens: u32, reason: &str) {
        let key = Self::key(prompt, session_id);
        let entry = CacheEntry {
            response: response.to_string(),
            model: model.to_string(),
            tokens,
            reason: reason.to_string(),
            created: self.clock.now(),
        };

        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
    }

    /// Number of entries, including any not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache_with_clock(ttl_secs: u64) -> (ResponseCache, ManualClock) {
        let clock = ManualClock::new();
        let cache = ResponseCache::with_clock(
            CacheSettings { ttl_secs },
            Arc::new(clock.clone()),
        );
        (cache, clock)
    }

    #[test]
    fn round_trip_within_ttl() {
        let (cache, _clock) = cache_with_clock(300);
        cache.set("prompt", "s1", "answer", "deepseek-chat", 42, "Standard query");

        let entry = cache.get("prompt", "s1").expect("entry should be fresh");
        assert_eq!(entry.response, "answer");
        assert_eq!(entry.model, "deepseek-chat");
        assert_eq!(entry.tokens, 42);
        assert_eq!(entry.reason, "Standard query");
    }

    #[test]
    fn expired_entry_is_absent() {
        let (cache, clock) = cache_with_clock(300);
        cache.set("prompt", "s1", "answer", "deepseek-chat", 42, "Standard query");

        clock.advance(Duration::from_secs(301));
        assert!(cache.get("prompt", "s1").is_none());
        // Lazy expiration removed the dead entry.
        assert!(cache.is_empty());
    }

    #[test]
    fn entry_fresh_just_under_ttl() {
        let (cache, clock) = cache_with_clock(300);
        cache.set("prompt", "s1", "answer", "m", 1, "r");

        clock.advance(Duration::from_secs(299));
        assert!(cache.get("prompt", "s1").is_some());
    }

    #[test]
    fn sessions_do_not_collide() {
        let (cache, _clock) = cache_with_clock(300);
        cache.set("prompt", "s1", "first", "m", 1, "r");

        assert!(cache.get("prompt", "s2").is_none());
        assert_eq!(cache.get("prompt", "s1").unwrap().response, "first");
    }

    #[test]
    fn set_overwrites_existing_entry() {
        let (cache, _clock) = cache_with_clock(300);
        cache.set("prompt", "s1", "old", "m", 1, "r");
        cache.set("prompt", "s1", "new", "m", 2, "r");

        assert_eq!(cache.get("prompt", "s1").unwrap().response, "new");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn key_is_deterministic_and_session_scoped() {
        assert_eq!(
            ResponseCache::key("p", "s"),
            ResponseCache::key("p", "s")
        );
        assert_ne!(
            ResponseCache::key("p", "s1"),
            ResponseCache::key("p", "s2")
        );
        assert_ne!(
            ResponseCache::key("p1", "s"),
            ResponseCache::key("p2", "s")
        );
    }
}
