//! Content-hash keyed resource cache.

use crate::config::ResourceConfig;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Persisted copies of resources, keyed by path plus content hash.
#[async_trait]
pub trait ResourceCache: Send + Sync {
    /// Cached bytes for `path`, if any entry matches.
    async fn lookup(&self, path: &str) -> Result<Option<Bytes>>;
}

/// Cache key for `path` holding `bytes`: `<path>.sha256-<hex digest>`.
pub fn cache_key(path: &str, bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{}{}{}", path, ResourceConfig::CACHE_HASH_MARKER, hex::encode(digest))
}

/// In-memory cache.
///
/// Lookups match keys that start with the path and the hash marker; when
/// several versions are stored the one inserted last wins.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<Vec<(String, Bytes)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` for `path` and return the key used.
    pub fn insert(&self, path: &str, bytes: impl Into<Bytes>) -> String {
        let bytes = bytes.into();
        let key = cache_key(path, &bytes);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|(existing, _)| existing != &key);
        entries.push((key.clone(), bytes));
        key
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    fn find(&self, path: &str) -> Option<Bytes> {
        let prefix = format!("{}{}", path, ResourceConfig::CACHE_HASH_MARKER);
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|(key, _)| key.starts_with(&prefix))
            .map(|(_, bytes)| bytes.clone())
    }
}

#[async_trait]
impl ResourceCache for MemoryCache {
    async fn lookup(&self, path: &str) -> Result<Option<Bytes>> {
        Ok(self.find(path))
    }
}

/// Named caches a worker can open by the `CacheName` setting.
#[derive(Default)]
pub struct CacheStorage {
    caches: RwLock<HashMap<String, Arc<dyn ResourceCache>>>,
}

impl std::fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStorage")
            .field("names", &self.names())
            .finish()
    }
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, cache: Arc<dyn ResourceCache>) {
        self.caches
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.into(), cache);
    }

    /// The cache registered as `name`, if it exists. Never creates one.
    pub fn open(&self, name: &str) -> Option<Arc<dyn ResourceCache>> {
        self.caches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .caches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
