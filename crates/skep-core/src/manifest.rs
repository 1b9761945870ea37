//! The file manifest: one record per backed-up file, keyed by file name.
//!
//! The manifest is the single source of truth for what the store holds.
//! It is encoded as JSON, compressed, encrypted, and published under a
//! reserved object name; shards the manifest does not reference are
//! garbage by definition.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use skep_types::{Result, Sha1Hash, ShardId, SkepError};

use crate::compress::{self, Compression};
use crate::crypto::{BlobKind, CryptoEngine};

/// Reserved object name under which the encoded manifest is published.
/// Shard object names are UUIDs, so this can never collide with one and
/// prune always leaves it alone.
pub const MANIFEST_OBJECT_NAME: &str = ".skep-manifest";

pub const MANIFEST_VERSION: u32 = 1;

/// Everything needed to locate and verify one backed-up file.
///
/// `shard_ids[i]` and `shard_hashes[i]` describe piece `i`; both vectors
/// always have the same length and follow piece order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_name: String,
    pub file_length: i64,
    /// Source mtime, nanoseconds since the Unix epoch.
    pub last_modified: i64,
    /// SHA-1 of the whole plaintext file.
    pub sha1: Sha1Hash,
    pub shard_ids: Vec<ShardId>,
    pub shard_hashes: Vec<Sha1Hash>,
}

impl FileRecord {
    pub fn shard_count(&self) -> usize {
        self.shard_ids.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileManifest {
    pub version: u32,
    /// Keyed by file name. A BTreeMap keeps listings and encodings stable.
    files: BTreeMap<String, FileRecord>,
}

impl Default for FileManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl FileManifest {
    pub fn new() -> Self {
        FileManifest {
            version: MANIFEST_VERSION,
            files: BTreeMap::new(),
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.files.contains_key(file_name)
    }

    pub fn get(&self, file_name: &str) -> Option<&FileRecord> {
        self.files.get(file_name)
    }

    /// Insert a record, replacing any previous record with the same name.
    /// Returns the replaced record, if any.
    pub fn add_file(&mut self, record: FileRecord) -> Option<FileRecord> {
        self.files.insert(record.file_name.clone(), record)
    }

    pub fn remove_file(&mut self, file_name: &str) -> Option<FileRecord> {
        self.files.remove(file_name)
    }

    /// Records in file-name order.
    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    /// Mutable access for in-place rewrites (compaction). Callers must not
    /// change `file_name`; use [`FileManifest::remove_file`] plus
    /// [`FileManifest::add_file`] for renames.
    pub fn get_mut(&mut self, file_name: &str) -> Option<&mut FileRecord> {
        self.files.get_mut(file_name)
    }

    /// The first record (in name order) whose `shard_ids` contains `id`.
    pub fn get_by_shard_id(&self, id: ShardId) -> Option<&FileRecord> {
        self.files.values().find(|r| r.shard_ids.contains(&id))
    }

    /// Every shard id some record references. Prune keeps exactly these.
    pub fn referenced_shard_ids(&self) -> HashSet<ShardId> {
        self.files
            .values()
            .flat_map(|r| r.shard_ids.iter().copied())
            .collect()
    }

    pub fn total_file_bytes(&self) -> i64 {
        self.files.values().map(|r| r.file_length).sum()
    }

    /// Serialize for publication: JSON, then compress, then encrypt.
    pub fn encode(&self, compression: Compression, crypto: &dyn CryptoEngine) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let packed = compress::compress(compression, &json)?;
        crypto.encrypt(&packed, BlobKind::Manifest.aad())
    }

    /// Inverse of [`FileManifest::encode`].
    pub fn decode(data: &[u8], crypto: &dyn CryptoEngine) -> Result<Self> {
        let packed = crypto.decrypt(data, BlobKind::Manifest.aad())?;
        let json = compress::decompress(&packed)?;
        let manifest: FileManifest = serde_json::from_slice(&json)?;
        if manifest.version > MANIFEST_VERSION {
            return Err(SkepError::Corrupt(format!(
                "manifest version {} is newer than this build supports ({})",
                manifest.version, MANIFEST_VERSION
            )));
        }
        Ok(manifest)
    }
}
