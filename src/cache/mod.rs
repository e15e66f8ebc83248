//! Key -> definition store for generated schemas and pattern sets
//!
//! The store is injected into callers; extractors never touch it. There is
//! no expiry: a stale entry is replaced by writing a new key or removing it.
//! Concurrent writers to one key race and the last write wins.

mod file_cache;
mod memory_cache;

pub use file_cache::FileCache;
pub use memory_cache::MemoryCache;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::patterns::PatternSetDefinition;
use crate::schema::SchemaDefinition;

/// What a cache entry holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "definition", rename_all = "snake_case")]
pub enum CachePayload {
    Schema(SchemaDefinition),
    Patterns(PatternSetDefinition),
}

impl CachePayload {
    pub fn into_schema(self, key: &str) -> Result<SchemaDefinition, CacheError> {
        match self {
            CachePayload::Schema(schema) => Ok(schema),
            CachePayload::Patterns(_) => Err(CacheError::PayloadMismatch {
                key: key.to_string(),
                expected: "schema",
            }),
        }
    }

    pub fn into_patterns(self, key: &str) -> Result<PatternSetDefinition, CacheError> {
        match self {
            CachePayload::Patterns(patterns) => Ok(patterns),
            CachePayload::Schema(_) => Err(CacheError::PayloadMismatch {
                key: key.to_string(),
                expected: "pattern set",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: CachePayload,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, payload: CachePayload) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Blob store seam; implementations must be safe to share across threads
pub trait SchemaCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    fn put(&self, key: &str, payload: CachePayload) -> Result<(), CacheError>;

    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns whether an entry was removed
    fn remove(&self, key: &str) -> Result<bool, CacheError>;
}
