//! In-process cache, mostly for tests and short-lived pipelines

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use super::{CacheEntry, CachePayload, SchemaCache};
use crate::error::CacheError;

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> CacheError {
    CacheError::Unavailable("memory cache lock poisoned".to_string())
}

impl SchemaCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, payload: CachePayload) -> Result<(), CacheError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), CacheEntry::new(key, payload));
        debug!(key, "stored cache entry in memory");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.remove(key).is_some())
    }
}
