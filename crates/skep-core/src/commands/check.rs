use std::collections::HashSet;

use skep_types::{CancelFlag, Result, ShardId};

use crate::vault::Vault;

/// A file whose reconstruction would fail: at least one referenced shard
/// has no object in the store.
#[derive(Debug)]
pub struct CorruptFile {
    pub file_name: String,
    pub missing_shards: Vec<ShardId>,
}

#[derive(Debug, Default)]
pub struct CheckStats {
    pub files_checked: usize,
    pub shards_referenced: usize,
    /// Distinct referenced shard ids with no stored object.
    pub shards_missing: usize,
    pub corrupt_files: Vec<CorruptFile>,
}

impl CheckStats {
    pub fn is_clean(&self) -> bool {
        self.corrupt_files.is_empty()
    }
}

/// Compare manifest references against the store listing. Read-only: never
/// mutates the manifest or deletes anything.
pub fn run(vault: &Vault, cancel: &CancelFlag) -> Result<CheckStats> {
    let present: HashSet<String> = vault
        .newest_objects()?
        .into_iter()
        .map(|o| o.name)
        .collect();

    let mut stats = CheckStats::default();
    let mut missing_ids: HashSet<ShardId> = HashSet::new();
    for record in vault.manifest.files() {
        cancel.check()?;
        stats.files_checked += 1;
        let missing: Vec<ShardId> = record
            .shard_ids
            .iter()
            .filter(|id| !present.contains(&id.as_object_name()))
            .copied()
            .collect();
        if !missing.is_empty() {
            missing_ids.extend(missing.iter().copied());
            stats.corrupt_files.push(CorruptFile {
                file_name: record.file_name.clone(),
                missing_shards: missing,
            });
        }
    }
    stats.shards_referenced = vault.manifest.referenced_shard_ids().len();
    stats.shards_missing = missing_ids.len();
    Ok(stats)
}
