//! Local cache of whole-file SHA-1 digests, keyed by absolute path.
//!
//! Folder uploads consult it to skip re-hashing files whose size and mtime
//! are unchanged. The cache is disposable: a missing or corrupt file just
//! means hashing again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::debug;

use skep_types::{Result, Sha1Hash};

/// Source mtime in nanoseconds since the Unix epoch. Pre-epoch mtimes
/// clamp to 0; they only occur on clocks set before 1970.
pub fn mtime_ns(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos().min(i64::MAX as u128) as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashCacheEntry {
    pub mtime_ns: i64,
    pub size: u64,
    pub sha1: Sha1Hash,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashCache {
    entries: HashMap<String, HashCacheEntry>,
}

impl HashCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Cached digest for `path`, only if both mtime and size still match.
    pub fn lookup(&self, path: &str, mtime_ns: i64, size: u64) -> Option<Sha1Hash> {
        let entry = self.entries.get(path)?;
        if entry.mtime_ns == mtime_ns && entry.size == size {
            Some(entry.sha1)
        } else {
            None
        }
    }

    pub fn insert(&mut self, path: String, mtime_ns: i64, size: u64, sha1: Sha1Hash) {
        self.entries.insert(
            path,
            HashCacheEntry {
                mtime_ns,
                size,
                sha1,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Platform cache dir + `skep/hashcache`
    /// (macOS: `~/Library/Caches/skep/…`, Linux: `~/.cache/skep/…`).
    /// One cache serves every vault: digests describe local files only.
    fn cache_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|base| base.join("skep").join("hashcache"))
    }

    /// Load from the default location; missing or unreadable means empty.
    pub fn load() -> Self {
        match Self::cache_path() {
            Some(path) => Self::load_from(&path),
            None => Self::new(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let data = match std::fs::read(path) {
            Ok(d) => d,
            Err(_) => return Self::new(),
        };
        match rmp_serde::from_slice(&data) {
            Ok(cache) => cache,
            Err(e) => {
                debug!("hash cache: failed to deserialize: {e}, starting fresh");
                Self::new()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::cache_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = rmp_serde::to_vec(self)
            .map_err(|e| skep_types::SkepError::Other(format!("hash cache encode: {e}")))?;
        std::fs::write(path, data)?;
        debug!(entries = self.entries.len(), "hash cache saved");
        Ok(())
    }
}
