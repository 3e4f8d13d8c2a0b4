//! Latest parsed configuration per profile.
//!
//! Entries are keyed by the fully qualified profile name. Lookups through
//! [`ConfigCache::get`] prepend the key prefix, so with prefix `dev4_` a
//! caller asks for `feature_flags` and receives `dev4_feature_flags`.
//!
//! The digest of the payload behind each entry lives under the same lock
//! as the entry itself; both are replaced in one write so a reader never
//! sees an entry that disagrees with its recorded digest.

use crate::types::CacheEntry;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    digests: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct ConfigCache {
    state: RwLock<CacheState>,
    prefix: RwLock<String>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            state: RwLock::default(),
            prefix: RwLock::new(prefix.into()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn prefix(&self) -> String {
        self.prefix
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_prefix(&self, prefix: impl Into<String>) {
        *self.prefix.write().unwrap_or_else(|e| e.into_inner()) = prefix.into();
    }

    /// Fully qualified cache key for a short profile name.
    pub fn resolve(&self, name: &str) -> String {
        format!("{}{}", self.prefix(), name)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let key = self.resolve(name);
        self.read().entries.get(&key).map(|e| e.parsed.clone())
    }

    pub fn get_or(&self, name: &str, default: Value) -> Value {
        self.get(name).unwrap_or(default)
    }

    /// Entry with metadata, looked up by fully qualified name.
    pub fn entry(&self, qualified_name: &str) -> Option<CacheEntry> {
        self.read().entries.get(qualified_name).cloned()
    }

    /// Copy of every entry keyed by fully qualified name.
    pub fn get_all(&self) -> HashMap<String, CacheEntry> {
        self.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn digest_matches(&self, qualified_name: &str, digest: &str) -> bool {
        self.read()
            .digests
            .get(qualified_name)
            .is_some_and(|d| d == digest)
    }

    /// Store a new entry together with the digest of the payload it came from.
    pub(crate) fn apply(&self, qualified_name: &str, digest: String, entry: CacheEntry) {
        let mut state = self.write();
        state.digests.insert(qualified_name.to_string(), digest);
        state.entries.insert(qualified_name.to_string(), entry);
    }

    pub(crate) fn forget_digest(&self, qualified_name: &str) {
        self.write().digests.remove(qualified_name);
    }

    pub(crate) fn clear_digests(&self) {
        self.write().digests.clear();
    }

    /// Drop an entry and its digest.
    pub(crate) fn purge(&self, qualified_name: &str) -> Option<CacheEntry> {
        let mut state = self.write();
        state.digests.remove(qualified_name);
        state.entries.remove(qualified_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn entry(value: Value) -> CacheEntry {
        CacheEntry {
            parsed: value,
            content_type: Some("application/json".to_string()),
            version: Some(1),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_cache_creation() {
        let cache = ConfigCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.prefix(), "");
    }

    #[test]
    fn test_prefix_resolution() {
        let cache = ConfigCache::with_prefix("dev4_");
        cache.apply(
            "dev4_feature_flags",
            "d1".to_string(),
            entry(json!({"beta": true})),
        );

        assert_eq!(cache.get("feature_flags"), Some(json!({"beta": true})));
        assert_eq!(cache.get("dev4_feature_flags"), None);
        assert_eq!(cache.get_or("missing", Value::Null), Value::Null);

        let all = cache.get_all();
        assert!(all.contains_key("dev4_feature_flags"));
        assert_eq!(all.len(), 1);

        // Metadata lookups take the qualified name
        assert_eq!(cache.entry("dev4_feature_flags").unwrap().version, Some(1));
        assert!(cache.entry("feature_flags").is_none());
    }

    #[test]
    fn test_no_prefix_is_identity() {
        let cache = ConfigCache::new();
        cache.apply("limits", "d1".to_string(), entry(json!({"max": 5})));
        assert_eq!(cache.get("limits"), Some(json!({"max": 5})));
        assert_eq!(cache.resolve("limits"), "limits");
    }

    #[test]
    fn test_get_all_is_a_copy() {
        let cache = ConfigCache::new();
        cache.apply("limits", "d1".to_string(), entry(json!({"max": 5})));

        let mut snapshot = cache.get_all();
        snapshot.get_mut("limits").unwrap().parsed = json!({"max": 99});
        snapshot.remove("limits");

        assert_eq!(cache.get("limits"), Some(json!({"max": 5})));
    }

    #[test]
    fn test_digest_tracking() {
        let cache = ConfigCache::new();
        assert!(!cache.digest_matches("limits", "d1"));

        cache.apply("limits", "d1".to_string(), entry(json!(1)));
        assert!(cache.digest_matches("limits", "d1"));
        assert!(!cache.digest_matches("limits", "d2"));

        cache.forget_digest("limits");
        assert!(!cache.digest_matches("limits", "d1"));
        // The entry itself stays servable
        assert_eq!(cache.get("limits"), Some(json!(1)));
    }

    #[test]
    fn test_purge_removes_entry_and_digest() {
        let cache = ConfigCache::new();
        cache.apply("limits", "d1".to_string(), entry(json!(1)));

        assert!(cache.purge("limits").is_some());
        assert!(cache.is_empty());
        assert!(!cache.digest_matches("limits", "d1"));
    }
}
