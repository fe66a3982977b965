// ── Typed value cache ──
//
// One sub-cache per `ValueKind`, dispatched by a single match on the tag.
// `set` and `clear` fan out to every sub-cache so that typed and `Any`
// entries for the same path stay synchronized on every write.

pub mod path_info;
mod typed;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::value::ValueKind;
use path_info::{PathInfo, PathRegistry};
use typed::TypedCache;

pub use typed::{ValueEntry, ValueHandle, ValueState};

/// The local mirror of remote values: seven typed sub-caches plus the
/// shared per-path metadata registry.
///
/// Lock granularity is one mutex per typed sub-cache -- operations on
/// unrelated kinds never serialize, and there is no global lock.
pub struct ValueCache {
    registry: PathRegistry,
    bools: TypedCache,
    ints: TypedCache,
    floats: TypedCache,
    texts: TypedCache,
    anys: TypedCache,
    text_lists: TypedCache,
    float_maps: TypedCache,
}

impl Default for ValueCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueCache {
    pub fn new() -> Self {
        Self {
            registry: PathRegistry::default(),
            bools: TypedCache::new(ValueKind::Bool),
            ints: TypedCache::new(ValueKind::Int),
            floats: TypedCache::new(ValueKind::Float),
            texts: TypedCache::new(ValueKind::Text),
            anys: TypedCache::new(ValueKind::Any),
            text_lists: TypedCache::new(ValueKind::TextList),
            float_maps: TypedCache::new(ValueKind::FloatMap),
        }
    }

    /// Route to the sub-cache for a kind. The single dispatch point.
    fn cache_for(&self, kind: ValueKind) -> &TypedCache {
        match kind {
            ValueKind::Bool => &self.bools,
            ValueKind::Int => &self.ints,
            ValueKind::Float => &self.floats,
            ValueKind::Text => &self.texts,
            ValueKind::Any => &self.anys,
            ValueKind::TextList => &self.text_lists,
            ValueKind::FloatMap => &self.float_maps,
        }
    }

    fn all_caches(&self) -> [&TypedCache; 7] {
        [
            &self.bools,
            &self.ints,
            &self.floats,
            &self.texts,
            &self.anys,
            &self.text_lists,
            &self.float_maps,
        ]
    }

    // ── Lookup ───────────────────────────────────────────────────────

    /// Existing entry for (path, source, kind), if any.
    pub fn get(&self, kind: ValueKind, path: &str, source: Option<&str>) -> Option<ValueHandle> {
        self.cache_for(kind).get(path, source, false, &self.registry)
    }

    /// Existing entry, or a freshly registered zero-value one.
    pub fn get_or_create(&self, kind: ValueKind, path: &str, source: Option<&str>) -> ValueHandle {
        self.cache_for(kind)
            .get(path, source, true, &self.registry)
            .unwrap_or_else(|| unreachable!("create=true always yields an entry"))
    }

    /// The shared metadata record for a path (created on first use).
    pub fn path_info(&self, path: &str) -> Arc<PathInfo> {
        self.registry.get_or_create(path)
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Apply a raw server value to every existing entry for
    /// (path, source), across all sub-caches. Entries are not created;
    /// each sub-cache decodes the raw value for its own kind.
    pub fn set(
        &self,
        raw: &serde_json::Value,
        path: &str,
        source: Option<&str>,
        timestamp: Option<DateTime<Utc>>,
        meta: Option<&serde_json::Map<String, serde_json::Value>>,
    ) {
        for cache in self.all_caches() {
            cache.set(raw, path, source, timestamp, meta);
        }
    }

    /// Mark every entry for (path, source) due for re-fetch, keeping the
    /// last known value visible.
    pub fn clear(&self, path: &str, source: Option<&str>) {
        for cache in self.all_caches() {
            cache.clear(path, source);
        }
    }

    /// Every cached entry, deduplicated by path (an entry already seen
    /// under one key is not returned twice).
    pub fn unique_cached_values(&self) -> HashMap<String, ValueHandle> {
        let mut paths = HashMap::new();
        for cache in self.all_caches() {
            cache.unique_paths(&mut paths);
        }
        paths
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::value::Value;
    use serde_json::json;

    #[test]
    fn typed_and_any_entries_stay_synchronized() {
        let cache = ValueCache::new();
        let typed = cache.get_or_create(ValueKind::Float, "a.b", None);
        let any = cache.get_or_create(ValueKind::Any, "a.b", None);

        cache.set(&json!(3.5), "a.b", None, None, None);

        assert_eq!(typed.value(), Some(Value::Float(3.5)));
        assert_eq!(any.value(), Some(Value::Any(json!(3.5))));
    }

    #[test]
    fn set_round_trips_bool_coercion() {
        let cache = ValueCache::new();
        let entry = cache.get_or_create(ValueKind::Bool, "a.b", None);

        for raw in [json!("on"), json!(1), json!(true)] {
            cache.set(&raw, "a.b", None, Some(Utc::now()), None);
            assert_eq!(entry.as_bool(), Some(true), "raw {raw}");
        }
    }

    #[test]
    fn unique_cached_values_spans_kinds() {
        let cache = ValueCache::new();
        cache.get_or_create(ValueKind::Float, "a.b", None);
        cache.get_or_create(ValueKind::Any, "a.b", None);
        cache.get_or_create(ValueKind::Bool, "c.d", Some("s1"));

        let unique = cache.unique_cached_values();
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn clear_fans_out_to_all_kinds() {
        let cache = ValueCache::new();
        let typed = cache.get_or_create(ValueKind::Float, "a.b", None);
        let any = cache.get_or_create(ValueKind::Any, "a.b", None);
        cache.set(&json!(1.0), "a.b", None, None, None);

        cache.clear("a.b", None);

        assert!(typed.state().cached.is_none());
        assert!(any.state().cached.is_none());
        assert!(typed.value().is_some());
    }

    #[test]
    fn meta_reaches_shared_path_info() {
        let cache = ValueCache::new();
        let entry = cache.get_or_create(ValueKind::Float, "a.b", None);
        let serde_json::Value::Object(meta) = json!({"units": "K"}) else {
            unreachable!()
        };

        cache.set(&json!(290.5), "a.b", None, None, Some(&meta));

        assert_eq!(entry.info().units().as_deref(), Some("K"));
        assert_eq!(cache.path_info("a.b").units().as_deref(), Some("K"));
    }
}
