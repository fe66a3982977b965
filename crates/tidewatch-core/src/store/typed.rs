// ── Typed sub-cache ──
//
// One `TypedCache` per `ValueKind`. Two maps: unsourced path -> entry, and
// source -> path -> entry. Lock discipline: the cache's single mutex guards
// map membership; each entry guards its own state. The cache lock is always
// taken before an entry lock, never the reverse.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::path_info::{PathInfo, PathRegistry};
use crate::value::{Value, ValueKind};

/// Shared handle to a cache entry. Updates made by the synchronization
/// machinery are visible to every holder.
pub type ValueHandle = Arc<ValueEntry>;

/// Mutable state of one cache entry.
#[derive(Debug, Clone, Default)]
pub struct ValueState {
    /// Decoded value; `None` until the first fetch (or after a null update).
    pub value: Option<Value>,
    /// Server-reported sample time.
    pub timestamp: Option<DateTime<Utc>>,
    /// Local time of the last payload mutation.
    pub updated: Option<Instant>,
    /// Local time of the last fetch attempt. Drives staleness; cleared by
    /// `clear()` to force a re-fetch without discarding the value.
    pub cached: Option<Instant>,
}

/// One cached value, identified by (path, source, kind).
///
/// Owned by its `TypedCache`; never removed on staleness, only marked
/// re-fetchable. A `watch` channel broadcasts state snapshots so observers
/// (widgets, tests) can await changes instead of polling.
#[derive(Debug)]
pub struct ValueEntry {
    path: String,
    source: Option<String>,
    kind: ValueKind,
    info: Arc<PathInfo>,
    state: Mutex<ValueState>,
    changed: watch::Sender<ValueState>,
}

impl ValueEntry {
    fn new(path: &str, source: Option<&str>, kind: ValueKind, info: Arc<PathInfo>) -> Self {
        let (changed, _) = watch::channel(ValueState::default());
        Self {
            path: path.to_owned(),
            source: source.map(String::from),
            kind,
            info,
            state: Mutex::new(ValueState::default()),
            changed,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Shared per-path metadata (display name, units).
    pub fn info(&self) -> &Arc<PathInfo> {
        &self.info
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ValueState {
        self.lock().clone()
    }

    /// The current decoded value, if any.
    pub fn value(&self) -> Option<Value> {
        self.lock().value.clone()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.lock().timestamp
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ValueState> {
        self.changed.subscribe()
    }

    // ── Typed accessors ──────────────────────────────────────────────

    /// Boolean view with the {true, 1, "on"} coercion.
    pub fn as_bool(&self) -> Option<bool> {
        self.value().and_then(|v| v.as_bool())
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.value().and_then(|v| v.as_f64())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.value().and_then(|v| v.as_i64())
    }

    pub fn as_text(&self) -> Option<String> {
        self.value().and_then(|v| v.as_str().map(String::from))
    }

    /// Whether this entry is due for a re-fetch: never fetched, cleared,
    /// or last fetched longer than `threshold` ago.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.lock()
            .cached
            .is_none_or(|cached| cached.elapsed() >= threshold)
    }

    // ── Mutation (crate-internal) ────────────────────────────────────

    /// Apply a decoded value + sample timestamp; bumps `updated` and
    /// `cached`, and broadcasts the new state.
    pub(crate) fn apply(&self, value: Option<Value>, timestamp: Option<DateTime<Utc>>) {
        let snapshot = {
            let mut state = self.lock();
            let now = Instant::now();
            state.value = value;
            if timestamp.is_some() {
                state.timestamp = timestamp;
            }
            state.updated = Some(now);
            state.cached = Some(now);
            state.clone()
        };
        self.changed.send_replace(snapshot);
    }

    /// Reset the staleness marker; the last known value stays visible.
    pub(crate) fn invalidate(&self) {
        self.lock().cached = None;
    }

    /// Stamp the entry as just fetched (used at dispatch time and when
    /// rehydrating resumed sessions, to suppress a redundant re-fetch).
    pub(crate) fn mark_fetched(&self) {
        self.lock().cached = Some(Instant::now());
    }

    /// Test hook: backdate the fetch stamp to simulate age.
    #[cfg(test)]
    pub(crate) fn backdate_fetch(&self, age: Duration) {
        self.lock().cached = Instant::now().checked_sub(age);
    }

    fn lock(&self) -> MutexGuard<'_, ValueState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// ── TypedCache ──────────────────────────────────────────────────────

pub(crate) struct TypedCache {
    kind: ValueKind,
    inner: Mutex<TypedCacheInner>,
}

#[derive(Default)]
struct TypedCacheInner {
    /// Unsourced entries: path -> entry. Exactly one per path.
    unsourced: HashMap<String, ValueHandle>,
    /// Per-source entries: source -> path -> entry. At most one per
    /// (path, source).
    sources: HashMap<String, HashMap<String, ValueHandle>>,
}

impl TypedCache {
    pub(crate) fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            inner: Mutex::new(TypedCacheInner::default()),
        }
    }

    /// Look up an entry, optionally allocating a zero-value one.
    ///
    /// Identity-stable: repeated calls for the same (path, source) return
    /// the same handle.
    pub(crate) fn get(
        &self,
        path: &str,
        source: Option<&str>,
        create: bool,
        registry: &PathRegistry,
    ) -> Option<ValueHandle> {
        let mut inner = self.lock();
        let map = match source {
            Some(src) => {
                if !create && !inner.sources.contains_key(src) {
                    return None;
                }
                inner.sources.entry(src.to_owned()).or_default()
            }
            None => &mut inner.unsourced,
        };

        if let Some(entry) = map.get(path) {
            return Some(Arc::clone(entry));
        }
        if !create {
            return None;
        }
        let info = registry.get_or_create(path);
        let entry = Arc::new(ValueEntry::new(path, source, self.kind, info));
        map.insert(path.to_owned(), Arc::clone(&entry));
        Some(entry)
    }

    /// Decode `raw` for this cache's kind and apply it to an *existing*
    /// entry; entries are never created here. Metadata is merged into the
    /// shared `PathInfo`.
    pub(crate) fn set(
        &self,
        raw: &serde_json::Value,
        path: &str,
        source: Option<&str>,
        timestamp: Option<DateTime<Utc>>,
        meta: Option<&serde_json::Map<String, serde_json::Value>>,
    ) {
        let entry = {
            let inner = self.lock();
            let map = match source {
                Some(src) => match inner.sources.get(src) {
                    Some(map) => map,
                    None => return,
                },
                None => &inner.unsourced,
            };
            match map.get(path) {
                Some(entry) => Arc::clone(entry),
                None => return,
            }
        };

        entry.info().update_meta(meta);
        entry.apply(Value::decode(self.kind, raw), timestamp);
    }

    /// Reset the staleness marker for the path. With a source, only that
    /// entry; without, the unsourced entry and every per-source entry.
    pub(crate) fn clear(&self, path: &str, source: Option<&str>) {
        let inner = self.lock();
        match source {
            Some(src) => {
                if let Some(entry) = inner.sources.get(src).and_then(|m| m.get(path)) {
                    entry.invalidate();
                }
            }
            None => {
                for map in inner.sources.values() {
                    if let Some(entry) = map.get(path) {
                        entry.invalidate();
                    }
                }
                if let Some(entry) = inner.unsourced.get(path) {
                    entry.invalidate();
                }
            }
        }
    }

    /// Merge every entry into `paths`, deduplicated by path: an entry
    /// already present under a path is not replaced.
    pub(crate) fn unique_paths(&self, paths: &mut HashMap<String, ValueHandle>) {
        let inner = self.lock();
        for (path, entry) in &inner.unsourced {
            paths
                .entry(path.clone())
                .or_insert_with(|| Arc::clone(entry));
        }
        for map in inner.sources.values() {
            for (path, entry) in map {
                paths
                    .entry(path.clone())
                    .or_insert_with(|| Arc::clone(entry));
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, TypedCacheInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(kind: ValueKind) -> (TypedCache, PathRegistry) {
        (TypedCache::new(kind), PathRegistry::default())
    }

    #[test]
    fn get_with_create_is_identity_stable() {
        let (cache, registry) = cache(ValueKind::Float);

        let a = cache.get("a.b", None, true, &registry).unwrap();
        let b = cache.get("a.b", None, true, &registry).unwrap();
        let c = cache.get("a.b", None, false, &registry).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn get_without_create_returns_none_for_unknown() {
        let (cache, registry) = cache(ValueKind::Float);
        assert!(cache.get("a.b", None, false, &registry).is_none());
        assert!(cache.get("a.b", Some("s1"), false, &registry).is_none());
    }

    #[test]
    fn sourced_and_unsourced_entries_are_distinct() {
        let (cache, registry) = cache(ValueKind::Float);

        let plain = cache.get("a.b", None, true, &registry).unwrap();
        let sourced = cache.get("a.b", Some("s1"), true, &registry).unwrap();
        assert!(!Arc::ptr_eq(&plain, &sourced));
        assert!(Arc::ptr_eq(plain.info(), sourced.info()));
    }

    #[test]
    fn set_does_not_create_entries() {
        let (cache, registry) = cache(ValueKind::Float);

        cache.set(&json!(1.0), "a.b", None, None, None);
        assert!(cache.get("a.b", None, false, &registry).is_none());
    }

    #[test]
    fn set_updates_value_and_stamps() {
        let (cache, registry) = cache(ValueKind::Float);
        let entry = cache.get("a.b", None, true, &registry).unwrap();
        assert!(entry.value().is_none());

        cache.set(&json!(6.1), "a.b", None, Some(Utc::now()), None);

        assert_eq!(entry.value(), Some(Value::Float(6.1)));
        let state = entry.state();
        assert!(state.updated.is_some());
        assert!(state.cached.is_some());
        assert!(state.timestamp.is_some());
    }

    #[test]
    fn clear_keeps_last_known_value() {
        let (cache, registry) = cache(ValueKind::Float);
        let entry = cache.get("a.b", None, true, &registry).unwrap();
        cache.set(&json!(6.1), "a.b", None, None, None);

        cache.clear("a.b", None);

        assert_eq!(entry.value(), Some(Value::Float(6.1)));
        assert!(entry.is_stale(Duration::from_secs(30)));
    }

    #[test]
    fn clear_without_source_clears_all_source_entries() {
        let (cache, registry) = cache(ValueKind::Float);
        let plain = cache.get("a.b", None, true, &registry).unwrap();
        let sourced = cache.get("a.b", Some("s1"), true, &registry).unwrap();
        cache.set(&json!(1.0), "a.b", None, None, None);
        cache.set(&json!(2.0), "a.b", Some("s1"), None, None);

        cache.clear("a.b", None);

        assert!(plain.state().cached.is_none());
        assert!(sourced.state().cached.is_none());
    }

    #[test]
    fn staleness_threshold() {
        let (cache, registry) = cache(ValueKind::Float);
        let entry = cache.get("a.b", None, true, &registry).unwrap();
        let threshold = Duration::from_secs(1);

        assert!(entry.is_stale(threshold), "never-fetched entry is stale");

        entry.backdate_fetch(Duration::from_millis(200));
        assert!(!entry.is_stale(threshold));

        entry.backdate_fetch(Duration::from_millis(1500));
        assert!(entry.is_stale(threshold));
    }

    #[test]
    fn unique_paths_dedups_across_maps() {
        let (cache, registry) = cache(ValueKind::Float);
        cache.get("a.b", None, true, &registry).unwrap();
        cache.get("a.b", Some("s1"), true, &registry).unwrap();
        cache.get("c.d", Some("s2"), true, &registry).unwrap();

        let mut paths = HashMap::new();
        cache.unique_paths(&mut paths);

        assert_eq!(paths.len(), 2);
        assert!(paths.contains_key("a.b"));
        assert!(paths.contains_key("c.d"));
    }

    #[test]
    fn watch_broadcasts_updates() {
        let (cache, registry) = cache(ValueKind::Bool);
        let entry = cache.get("a.b", None, true, &registry).unwrap();
        let mut rx = entry.subscribe();

        cache.set(&json!("on"), "a.b", None, None, None);

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().value, Some(Value::Bool(true)));
    }
}
