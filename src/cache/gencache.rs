//! Generic in-process TTL key/value store. Entries expire on read; a
//! write sweeps any entries that are already past their deadline.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires: Instant,
}

/// Process-wide string cache with per-entry expiry.
#[derive(Default)]
pub struct GenCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl GenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a value. Expired entries are removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().expect("gencache lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value with a time to live. A zero TTL removes the key.
    pub fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut entries = self.entries.lock().expect("gencache lock poisoned");
        if ttl.is_zero() {
            entries.remove(key);
            return;
        }
        let now = Instant::now();
        entries.retain(|_, e| e.expires > now);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires: now + ttl,
            },
        );
    }

    /// Remove a key. Returns true when the key existed and had not expired.
    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().expect("gencache lock poisoned");
        match entries.remove(key) {
            Some(entry) => entry.expires > Instant::now(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let cache = GenCache::new();
        cache.set("key", "value", Duration::from_secs(60));
        assert_eq!(cache.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_missing_key() {
        let cache = GenCache::new();
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn test_zero_ttl_removes() {
        let cache = GenCache::new();
        cache.set("key", "value", Duration::from_secs(60));
        cache.set("key", "value", Duration::ZERO);
        assert_eq!(cache.get("key"), None);
    }

    #[test]
    fn test_delete() {
        let cache = GenCache::new();
        cache.set("key", "value", Duration::from_secs(60));
        assert!(cache.delete("key"));
        assert!(!cache.delete("key"));
        assert_eq!(cache.get("key"), None);
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let cache = GenCache::new();
        cache.set("key", "value", Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get("key"), None);
    }
}
