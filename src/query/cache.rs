//! Cache of serialized success envelopes
//!
//! Uses moka for thread-safe concurrent caching with TTL-based expiration.
//! Only meant for routes whose handlers are read-only.

use moka::sync::Cache;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::parser::QueryDocument;

/// Cache key: route plus canonical (key-sorted) data
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    route: String,
    data: String,
}

impl CacheKey {
    pub fn new(doc: &QueryDocument) -> Self {
        Self {
            route: doc.route.clone(),
            data: canonical_json(&JsonValue::Object(doc.data.clone())),
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }
}

pub struct QueryCache {
    cache: Cache<CacheKey, String>,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Bumped by every invalidation
    generation: AtomicU64,
    ttl: Duration,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_config(1000, Duration::from_secs(30))
    }

    pub fn with_config(max_entries: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            ttl,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<String> {
        if let Some(envelope) = self.cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(envelope)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn put(&self, key: CacheKey, envelope: String) {
        self.cache.insert(key, envelope);
    }

    /// Current invalidation generation. Read it before computing an envelope
    /// and hand it to [`QueryCache::put_if_current`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store `envelope` only if no invalidation happened since `generation`
    /// was read. Returns whether the entry was kept.
    pub fn put_if_current(&self, key: CacheKey, envelope: String, generation: u64) -> bool {
        if self.generation() != generation {
            return false;
        }
        self.cache.insert(key.clone(), envelope);

        // An invalidation may have landed between the check and the insert
        if self.generation() != generation {
            self.cache.invalidate(&key);
            return false;
        }
        true
    }

    /// Drop every cached envelope for `route`
    pub fn invalidate_route(&self, route: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let keys: Vec<CacheKey> = self
            .cache
            .iter()
            .filter(|(key, _)| key.route() == route)
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys {
            self.cache.invalidate(&key);
        }
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.cache.entry_count(),
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// 0.0 - 1.0
    pub hit_rate: f64,
    pub entry_count: u64,
    pub ttl_secs: u64,
}

/// Serialize with object keys sorted at every level
fn canonical_json(value: &JsonValue) -> String {
    fn sort(value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::Object(obj) => {
                let mut keys: Vec<&String> = obj.keys().collect();
                keys.sort();
                let sorted = keys
                    .into_iter()
                    .map(|k| (k.clone(), sort(&obj[k])))
                    .collect::<serde_json::Map<_, _>>();
                JsonValue::Object(sorted)
            }
            JsonValue::Array(items) => JsonValue::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }

    sort(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> CacheKey {
        CacheKey::new(&QueryDocument::from_json(raw).unwrap())
    }

    #[test]
    fn test_key_ignores_field_order() {
        assert_eq!(
            key(r#"{"route":"a","data":{"limit":1,"offset":2}}"#),
            key(r#"{"data":{"offset":2,"limit":1},"route":"a"}"#)
        );
        assert_ne!(
            key(r#"{"route":"a","data":{"limit":1}}"#),
            key(r#"{"route":"b","data":{"limit":1}}"#)
        );
    }

    #[test]
    fn test_hits_and_misses() {
        let cache = QueryCache::new();
        let k = key(r#"{"route":"a"}"#);

        assert!(cache.get(&k).is_none());
        cache.put(k.clone(), r#"{"data":[]}"#.to_string());
        assert_eq!(cache.get(&k).as_deref(), Some(r#"{"data":[]}"#));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalidate_route() {
        let cache = QueryCache::new();
        let a = key(r#"{"route":"a"}"#);
        let b = key(r#"{"route":"b"}"#);
        cache.put(a.clone(), "A".into());
        cache.put(b.clone(), "B".into());

        cache.invalidate_route("a");
        assert!(cache.get(&a).is_none());
        assert_eq!(cache.get(&b).as_deref(), Some("B"));

        cache.invalidate_all();
        assert!(cache.get(&b).is_none());
    }

    #[test]
    fn test_put_after_invalidation_is_dropped() {
        let cache = QueryCache::new();
        let k = key(r#"{"route":"a"}"#);

        let before = cache.generation();
        cache.invalidate_route("a");
        assert!(!cache.put_if_current(k.clone(), "stale".into(), before));
        assert!(cache.get(&k).is_none());

        assert!(cache.put_if_current(k.clone(), "fresh".into(), cache.generation()));
        assert_eq!(cache.get(&k).as_deref(), Some("fresh"));
    }
}
