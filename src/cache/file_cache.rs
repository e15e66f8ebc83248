//! Filesystem cache: one JSON document per key
//!
//! Writes go to a temporary file in the cache directory and are renamed
//! into place, so readers see either the old entry or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{CacheEntry, CachePayload, SchemaCache};
use crate::error::CacheError;
use crate::settings::CacheSettings;

const MAX_STEM_LEN: usize = 48;

#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open (creating if needed) a cache rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CacheError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn from_settings(settings: &CacheSettings) -> Result<Self, CacheError> {
        Self::open(&settings.directory)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Readable, collision-free file name for a key
    fn path_for(&self, key: &str) -> PathBuf {
        let stem: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(MAX_STEM_LEN)
            .collect();
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root.join(format!("{}-{}.json", stem, &digest[..16]))
    }

    fn io_error(key: &str) -> impl FnOnce(io::Error) -> CacheError + '_ {
        move |source| CacheError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl SchemaCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(key, "cache miss");
                return Ok(None);
            }
            Err(e) => return Err(Self::io_error(key)(e)),
        };

        let entry: CacheEntry = serde_json::from_str(&raw).map_err(|e| {
            warn!(key, path = %path.display(), error = %e, "corrupt cache entry");
            CacheError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;

        if entry.key != key {
            return Err(CacheError::Corrupt {
                key: key.to_string(),
                reason: format!("entry belongs to key `{}`", entry.key),
            });
        }

        debug!(key, "cache hit");
        Ok(Some(entry))
    }

    fn put(&self, key: &str, payload: CachePayload) -> Result<(), CacheError> {
        let entry = CacheEntry::new(key, payload);
        let json = serde_json::to_vec_pretty(&entry).map_err(|e| CacheError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let mut tmp = NamedTempFile::new_in(&self.root).map_err(Self::io_error(key))?;
        tmp.write_all(&json).map_err(Self::io_error(key))?;
        tmp.as_file().sync_all().map_err(Self::io_error(key))?;
        tmp.persist(self.path_for(key))
            .map_err(|e| Self::io_error(key)(e.error))?;

        debug!(key, bytes = json.len(), "stored cache entry");
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.path_for(key).is_file())
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(key)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaDefinition, SelectorSpec};

    fn schema() -> SchemaDefinition {
        SchemaDefinition::new(
            "Articles",
            "article",
            vec![
                SelectorSpec::text("title", "h2").into(),
                SelectorSpec::attribute("link", "a", "href").into(),
            ],
        )
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();

        assert!(cache.get("news.example/v1").unwrap().is_none());
        assert!(!cache.exists("news.example/v1").unwrap());

        cache.put("news.example/v1", CachePayload::Schema(schema())).unwrap();
        assert!(cache.exists("news.example/v1").unwrap());

        // a fresh handle over the same directory sees the entry
        let reopened = FileCache::open(dir.path()).unwrap();
        let entry = reopened.get("news.example/v1").unwrap().unwrap();
        assert_eq!(entry.key, "news.example/v1");
        assert_eq!(entry.payload.into_schema("news.example/v1").unwrap(), schema());
    }

    #[test]
    fn test_similar_keys_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        cache.put("a/b", CachePayload::Schema(schema())).unwrap();
        assert!(cache.get("a_b").unwrap().is_none());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();

        cache.put("k", CachePayload::Schema(schema())).unwrap();
        let renamed = SchemaDefinition { name: "Renamed".into(), ..schema() };
        cache.put("k", CachePayload::Schema(renamed.clone())).unwrap();
        let entry = cache.get("k").unwrap().unwrap();
        assert_eq!(entry.payload, CachePayload::Schema(renamed));

        assert!(cache.remove("k").unwrap());
        assert!(!cache.remove("k").unwrap());
        assert!(cache.get("k").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_entry_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        fs::write(cache.path_for("bad"), "{ not json").unwrap();
        assert!(matches!(cache.get("bad"), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_payload_kind_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        cache.put("k", CachePayload::Schema(schema())).unwrap();
        let entry = cache.get("k").unwrap().unwrap();
        assert!(matches!(
            entry.payload.into_patterns("k"),
            Err(CacheError::PayloadMismatch { .. })
        ));
    }
}
