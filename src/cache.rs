use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::decode::Payload;

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, Payload>,
    /// Keys whose last response failed schema validation; they never serve
    /// cache hits until a validated success or an invalidation clears them.
    rejected: HashSet<String>,
}

/// Shared response cache keyed by canonical request key (joined URL plus
/// serialized query).
///
/// Reads hand out deep copies, so callers can never mutate the cached
/// original through their own copy. Every operation is a single-step map
/// mutation behind a mutex, safe for interleaved concurrent calls.
#[derive(Clone, Debug, Default)]
pub struct QueryCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide default instance, used by clients that are not handed an
    /// explicit cache.
    pub fn global() -> &'static QueryCache {
        static GLOBAL: OnceLock<QueryCache> = OnceLock::new();
        GLOBAL.get_or_init(QueryCache::new)
    }

    fn locked(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deep copy of the cached payload for `key`, unless the key is marked
    /// schema-rejected.
    pub fn lookup(&self, key: &str) -> Option<Payload> {
        let inner = self.locked();
        if inner.rejected.contains(key) {
            return None;
        }
        inner.entries.get(key).cloned()
    }

    /// Stores a validated payload, overwriting any previous entry and
    /// clearing a stale rejection mark.
    pub fn store(&self, key: impl Into<String>, payload: Payload) {
        let key = key.into();
        let mut inner = self.locked();
        inner.rejected.remove(&key);
        inner.entries.insert(key, payload);
    }

    pub(crate) fn mark_rejected(&self, key: impl Into<String>) {
        self.locked().rejected.insert(key.into());
    }

    /// Removes exactly one entry.
    pub fn invalidate(&self, key: &str) {
        let mut inner = self.locked();
        inner.entries.remove(key);
        inner.rejected.remove(key);
    }

    /// Removes every entry whose key contains `pattern`, or everything when
    /// no pattern is given.
    pub fn invalidate_matching(&self, pattern: Option<&str>) {
        let mut inner = self.locked();
        match pattern {
            Some(pattern) => {
                inner.entries.retain(|key, _| !key.contains(pattern));
                inner.rejected.retain(|key| !key.contains(pattern));
            }
            None => {
                inner.entries.clear();
                inner.rejected.clear();
            }
        }
    }

    /// Read-only copy of the cached entries, for inspection and tests.
    pub fn snapshot(&self) -> HashMap<String, Payload> {
        self.locked().entries.clone()
    }
}

// Conveniences over the process-wide instance, mirroring the cache control
// surface the stores import.

pub fn set_query(key: impl Into<String>, payload: Payload) {
    QueryCache::global().store(key, payload);
}

pub fn invalidate_query(key: &str) {
    QueryCache::global().invalidate(key);
}

pub fn invalidate_all(pattern: Option<&str>) {
    QueryCache::global().invalidate_matching(pattern);
}

pub fn cached_queries() -> HashMap<String, Payload> {
    QueryCache::global().snapshot()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::QueryCache;
    use crate::decode::Payload;

    #[test]
    fn substring_invalidation_leaves_other_keys() {
        let cache = QueryCache::new();
        cache.store("tracks?page=1", Payload::Json(json!([1])));
        cache.store("tracks?page=2", Payload::Json(json!([2])));
        cache.store("genres", Payload::Json(json!(["rock"])));

        cache.invalidate_matching(Some("tracks"));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("genres"));
    }

    #[test]
    fn invalidate_without_pattern_clears_everything() {
        let cache = QueryCache::new();
        cache.store("tracks", Payload::Json(json!([])));
        cache.store("genres", Payload::Json(json!([])));

        cache.invalidate_matching(None);
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn point_invalidation_removes_one_entry() {
        let cache = QueryCache::new();
        cache.store("tracks?page=1", Payload::Json(json!([1])));
        cache.store("tracks?page=2", Payload::Json(json!([2])));

        cache.invalidate("tracks?page=1");

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("tracks?page=2"));
    }

    #[test]
    fn lookup_returns_a_deep_copy() {
        let cache = QueryCache::new();
        cache.store("tracks", Payload::Json(json!({"items": [1, 2]})));

        let first = cache.lookup("tracks").expect("cached entry");
        if let Payload::Json(mut value) = first {
            value["items"] = json!([]);
        }

        let second = cache.lookup("tracks").expect("cached entry");
        assert_eq!(second, Payload::Json(json!({"items": [1, 2]})));
    }

    #[test]
    fn rejected_keys_do_not_serve_hits() {
        let cache = QueryCache::new();
        cache.store("tracks", Payload::Json(json!([1])));
        cache.mark_rejected("tracks");
        assert!(cache.lookup("tracks").is_none());

        // A later validated success clears the mark.
        cache.store("tracks", Payload::Json(json!([2])));
        assert_eq!(cache.lookup("tracks"), Some(Payload::Json(json!([2]))));
    }

    #[test]
    fn overwrite_replaces_previous_entry() {
        let cache = QueryCache::new();
        cache.store("genres", Payload::Json(json!(["rock"])));
        cache.store("genres", Payload::Json(json!(["rock", "jazz"])));
        assert_eq!(
            cache.lookup("genres"),
            Some(Payload::Json(json!(["rock", "jazz"])))
        );
    }
}
