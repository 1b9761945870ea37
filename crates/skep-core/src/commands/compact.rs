use std::collections::HashMap;

use tracing::{debug, info};

use skep_types::{CancelFlag, Result, Sha1Hash};

use crate::vault::Vault;

#[derive(Debug, Default)]
pub struct CompactStats {
    pub files_total: usize,
    /// Content classes holding more than one file.
    pub duplicate_classes: usize,
    pub files_rewritten: usize,
    pub shard_refs_rewritten: usize,
    /// Shard ids left with no referencing file; prune reclaims them.
    pub orphaned_shards: usize,
    pub dry_run: bool,
}

/// Deduplicate manifest entries by content.
///
/// Files agree in content only when length, whole-file hash, and the
/// *ordered* shard hash sequence all match; identical shards in a
/// different order reconstruct a different file and stay separate.
/// Duplicates are rewired to the prototype's shards purely in the
/// manifest; the store is never touched here.
pub fn run(vault: &mut Vault, dry_run: bool, cancel: &CancelFlag) -> Result<CompactStats> {
    let mut stats = CompactStats {
        files_total: vault.manifest.file_count(),
        dry_run,
        ..Default::default()
    };

    // files() iterates in name order, so each class lists its members
    // lexicographically and the first member is the prototype.
    let mut classes: HashMap<(i64, Sha1Hash, Vec<Sha1Hash>), Vec<String>> = HashMap::new();
    for record in vault.manifest.files() {
        classes
            .entry((record.file_length, record.sha1, record.shard_hashes.clone()))
            .or_default()
            .push(record.file_name.clone());
    }

    let mut working = vault.manifest.clone();
    let before = working.referenced_shard_ids();
    for members in classes.into_values().filter(|m| m.len() > 1) {
        cancel.check()?;
        stats.duplicate_classes += 1;
        let prototype_ids = match working.get(&members[0]) {
            Some(record) => record.shard_ids.clone(),
            None => continue,
        };
        for name in &members[1..] {
            let Some(record) = working.get_mut(name) else {
                continue;
            };
            if record.shard_ids == prototype_ids {
                continue; // already rewired by an earlier compact
            }
            debug!(file = %name, prototype = %members[0], "rewiring duplicate to prototype shards");
            stats.shard_refs_rewritten += record.shard_ids.len();
            record.shard_ids = prototype_ids.clone();
            stats.files_rewritten += 1;
        }
    }
    let after = working.referenced_shard_ids();
    stats.orphaned_shards = before.difference(&after).count();

    if dry_run {
        return Ok(stats);
    }
    if stats.files_rewritten > 0 {
        vault.manifest = working;
        vault.publish_manifest_with_retry(cancel)?;
        info!(
            files = stats.files_rewritten,
            orphaned_shards = stats.orphaned_shards,
            "compaction published"
        );
    }
    Ok(stats)
}
