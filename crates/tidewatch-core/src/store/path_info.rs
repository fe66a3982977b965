// ── Per-path descriptive metadata ──
//
// One `PathInfo` per path, shared (`Arc`) by every value entry for that
// path regardless of source or kind. Metadata is merged in place whenever
// a fresher `meta` block arrives, so all holders see it.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;

/// Descriptive metadata for one path: display name and unit, derived from
/// the server's `meta` block. Value-type independent.
#[derive(Debug)]
pub struct PathInfo {
    path: String,
    inner: RwLock<PathMeta>,
}

#[derive(Debug, Default)]
struct PathMeta {
    meta: Option<serde_json::Map<String, serde_json::Value>>,
    display_name: Option<String>,
    units: Option<String>,
}

impl PathInfo {
    fn new(path: String) -> Self {
        Self {
            path,
            inner: RwLock::new(PathMeta::default()),
        }
    }

    /// The hierarchical dot-separated path this metadata describes.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn display_name(&self) -> Option<String> {
        self.read().display_name.clone()
    }

    /// Unit descriptor from `meta["units"]` (e.g. `"m/s"`, `"K"`, `"ratio"`).
    pub fn units(&self) -> Option<String> {
        self.read().units.clone()
    }

    pub fn meta(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        self.read().meta.clone()
    }

    /// Apply a fresher `meta` block, re-deriving display name and units.
    ///
    /// `None` is a no-op: an envelope without metadata never wipes what an
    /// earlier response provided.
    pub fn update_meta(&self, meta: Option<&serde_json::Map<String, serde_json::Value>>) {
        let Some(meta) = meta else { return };
        let mut inner = self.write();
        inner.units = meta
            .get("units")
            .and_then(|v| v.as_str())
            .map(String::from);
        inner.display_name = meta
            .get("displayName")
            .and_then(|v| v.as_str())
            .map(String::from);
        inner.meta = Some(meta.clone());
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PathMeta> {
        self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PathMeta> {
        self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Registry handing out the shared `Arc<PathInfo>` for each path.
///
/// Infos are never removed while any value entry exists; the registry keeps
/// them for the life of the cache.
#[derive(Debug, Default)]
pub(crate) struct PathRegistry {
    infos: DashMap<String, Arc<PathInfo>>,
}

impl PathRegistry {
    pub(crate) fn get_or_create(&self, path: &str) -> Arc<PathInfo> {
        if let Some(info) = self.infos.get(path) {
            return Arc::clone(&info);
        }
        self.infos
            .entry(path.to_owned())
            .or_insert_with(|| Arc::new(PathInfo::new(path.to_owned())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta_block(units: &str, name: &str) -> serde_json::Map<String, serde_json::Value> {
        let serde_json::Value::Object(map) = json!({"units": units, "displayName": name}) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn registry_shares_one_info_per_path() {
        let registry = PathRegistry::default();
        let a = registry.get_or_create("navigation.speedOverGround");
        let b = registry.get_or_create("navigation.speedOverGround");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn update_meta_derives_units_and_display_name() {
        let registry = PathRegistry::default();
        let info = registry.get_or_create("environment.wind.speedApparent");

        info.update_meta(Some(&meta_block("m/s", "Apparent Wind")));
        assert_eq!(info.units().as_deref(), Some("m/s"));
        assert_eq!(info.display_name().as_deref(), Some("Apparent Wind"));
    }

    #[test]
    fn missing_meta_does_not_wipe_existing() {
        let registry = PathRegistry::default();
        let info = registry.get_or_create("tanks.freshWater.0.currentLevel");

        info.update_meta(Some(&meta_block("ratio", "Fresh Water")));
        info.update_meta(None);
        assert_eq!(info.units().as_deref(), Some("ratio"));
    }
}
