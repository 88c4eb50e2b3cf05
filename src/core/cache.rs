//! Cache registry
//!
//! Named, persistent cache volumes keyed by a stable identifier. Identical
//! keys resolve to the same underlying storage across orchestration runs;
//! this is how dependency-download and build-object caches survive without
//! re-fetching. No eviction policy lives here; growth is managed by the
//! substrate.

use std::collections::HashMap;
use std::sync::Mutex;

/// Handle to a persistent, key-addressed cache volume.
///
/// Only obtainable through [`CacheRegistry::volume`]; there is no public
/// constructor. Two handles with the same key refer to the same storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheVolume {
    key: String,
    id: String,
}

impl CacheVolume {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            id: sanitize_key(key),
        }
    }

    /// Logical cache key as requested
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Substrate-safe identifier derived from the key
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Registry of cache volumes for one orchestration run.
///
/// `volume` is idempotent: repeated calls with the same key return handles
/// to the same storage. Distinct logical purposes must use distinct keys so
/// incompatible content never shares a volume.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    volumes: Mutex<HashMap<String, CacheVolume>>,
}

impl CacheRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a key to its cache volume, creating the handle on first use.
    pub fn volume(&self, key: &str) -> CacheVolume {
        let mut volumes = self.volumes.lock().unwrap_or_else(|e| e.into_inner());
        volumes
            .entry(key.to_string())
            .or_insert_with(|| CacheVolume::new(key))
            .clone()
    }

    /// Keys resolved so far in this run
    pub fn known_keys(&self) -> Vec<String> {
        let volumes = self.volumes.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = volumes.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Reduce a key to lowercase alphanumerics, '-', '_' and '.'.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_volume_is_idempotent() {
        let registry = CacheRegistry::new();
        let first = registry.volume("go-mod-cache");
        let second = registry.volume("go-mod-cache");
        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_keys_get_distinct_volumes() {
        let registry = CacheRegistry::new();
        let store = registry.volume("pnpm-store");
        let modules = registry.volume("pnpm-modules-web-app");
        assert_ne!(store, modules);
        assert_ne!(store.id(), modules.id());
    }

    #[test]
    fn test_known_keys_sorted() {
        let registry = CacheRegistry::new();
        registry.volume("go-build-cache");
        registry.volume("go-mod-cache");
        registry.volume("go-build-cache");
        assert_eq!(
            registry.known_keys(),
            vec!["go-build-cache".to_string(), "go-mod-cache".to_string()]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Sanitized ids only contain substrate-safe characters.
        #[test]
        fn prop_sanitized_id_is_safe(key in ".{1,40}") {
            let registry = CacheRegistry::new();
            let volume = registry.volume(&key);
            prop_assert!(volume
                .id()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' || c == '.'));
        }

        /// Same key always resolves to the same volume.
        #[test]
        fn prop_volume_identity_stable(key in "[a-z][a-z0-9-]{0,20}") {
            let registry = CacheRegistry::new();
            let a = registry.volume(&key);
            let b = registry.volume(&key);
            prop_assert_eq!(a, b);
        }
    }
}
