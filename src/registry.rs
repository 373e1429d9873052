//! Per-object export properties.
//!
//! Area ids, ambient colors and similar per-object settings are looked up by
//! short name. The registry is an explicit read-through cache handed to the
//! encoders by reference; nothing here is global.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::util::{Bgra, Result};

/// Overrides applied to one object while encoding.
///
/// Every field is optional. An unset field falls back to the value carried
/// by the model itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectProperties {
    /// Static object id written into the root header.
    pub wmo_id: Option<u32>,
    /// Area id written into every terrain chunk.
    pub area_id: Option<u32>,
    /// Ambient color of a static object.
    pub ambient: Option<Bgra>,
    /// Skybox model path of a static object.
    pub skybox: Option<String>,
    /// Global flags of an animated model.
    pub model_flags: Option<u32>,
    /// Forces every group of a static object indoor or outdoor.
    pub indoor: Option<bool>,
}

/// Thread-safe cache of [`ObjectProperties`] keyed by object name.
///
/// Uses `parking_lot::RwLock`, so lookups from parallel encoders only take
/// the read lock.
#[derive(Default)]
pub struct PropertyRegistry {
    entries: RwLock<HashMap<String, Arc<ObjectProperties>>>,
}

impl PropertyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a JSON object mapping names to properties.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let registry = Self::new();
        registry.extend(serde_json::from_str::<HashMap<String, ObjectProperties>>(text)?);
        Ok(registry)
    }

    /// Load a JSON file mapping names to properties.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let registry = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), entries = registry.len(), "loaded property registry");
        Ok(registry)
    }

    /// Insert or replace the properties of `name`.
    pub fn insert(&self, name: impl Into<String>, props: ObjectProperties) {
        self.entries.write().insert(name.into(), Arc::new(props));
    }

    /// Insert every entry of `items`.
    pub fn extend(&self, items: impl IntoIterator<Item = (String, ObjectProperties)>) {
        let mut entries = self.entries.write();
        for (name, props) in items {
            entries.insert(name, Arc::new(props));
        }
    }

    /// Get the properties of `name`, if registered.
    #[inline]
    pub fn get(&self, name: &str) -> Option<Arc<ObjectProperties>> {
        self.entries.read().get(name).map(Arc::clone)
    }

    /// Get the properties of `name`, calling `loader` on first use.
    ///
    /// The write lock is only taken when `name` is missing. A loader error
    /// leaves the registry unchanged.
    pub fn get_or_populate<F>(&self, name: &str, loader: F) -> Result<Arc<ObjectProperties>>
    where
        F: FnOnce(&str) -> Result<ObjectProperties>,
    {
        if let Some(found) = self.get(name) {
            return Ok(found);
        }
        let mut entries = self.entries.write();
        // Another thread may have populated it between the two locks.
        if let Some(found) = entries.get(name) {
            return Ok(Arc::clone(found));
        }
        let props = Arc::new(loader(name)?);
        entries.insert(name.to_string(), Arc::clone(&props));
        Ok(props)
    }

    /// Get the number of registered objects.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyRegistry").field("entries", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_json_load() {
        let registry = PropertyRegistry::from_json_str(
            r#"{"qeynos":{"area_id":12,"skybox":"sky.m2"},"wolf":{"model_flags":32}}"#,
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        let q = registry.get("qeynos").unwrap();
        assert_eq!(q.area_id, Some(12));
        assert_eq!(q.skybox.as_deref(), Some("sky.m2"));
        assert_eq!(q.wmo_id, None);
        assert_eq!(registry.get("wolf").unwrap().model_flags, Some(32));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_get_or_populate_once() {
        let registry = PropertyRegistry::new();
        let calls = AtomicUsize::new(0);
        let load = |_: &str| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(ObjectProperties {
                wmo_id: Some(5),
                ..Default::default()
            })
        };
        let a = registry.get_or_populate("hut", load).unwrap();
        let b = registry.get_or_populate("hut", load).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(a.wmo_id, Some(5));
    }

    #[test]
    fn test_failed_populate_leaves_registry_empty() {
        let registry = PropertyRegistry::new();
        let result = registry.get_or_populate("hut", |_| Err(Error::other("no data")));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_parallel_readers() {
        use rayon::prelude::*;

        let registry = PropertyRegistry::new();
        registry.insert("hut", ObjectProperties::default());
        let hits: usize = (0..64)
            .into_par_iter()
            .map(|i| {
                let name = if i % 2 == 0 { "hut" } else { "cave" };
                registry
                    .get_or_populate(name, |_| Ok(ObjectProperties::default()))
                    .map(|_| 1)
                    .unwrap_or(0)
            })
            .sum();
        assert_eq!(hits, 64);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(PropertyRegistry::from_json_str("[1,2]"), Err(Error::Json(_))));
    }
}
