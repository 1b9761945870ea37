use std::collections::HashSet;

use tracing::warn;

use skep_types::{CancelFlag, Result, ShardId};

use crate::manifest::MANIFEST_OBJECT_NAME;
use crate::vault::Vault;

#[derive(Debug, Default)]
pub struct DeleteStats {
    pub files_deleted: usize,
    pub files_missing: Vec<String>,
    /// Object versions removed from the store.
    pub objects_deleted: usize,
    /// Shards of deleted files kept because another file still references
    /// them (possible after compaction).
    pub shards_still_referenced: usize,
    pub delete_failures: usize,
    pub bytes_freed: u64,
}

/// Remove files from the manifest, publish, then clean up their shards.
///
/// The manifest lands first: a crash after publish leaves orphaned shard
/// objects, never dangling references. Shard deletion is best-effort; a
/// failed delete is reported and the object stays until the next prune.
pub fn run(vault: &mut Vault, names: &[String], cancel: &CancelFlag) -> Result<DeleteStats> {
    let mut stats = DeleteStats::default();
    let mut removed_ids: HashSet<ShardId> = HashSet::new();

    for name in names {
        cancel.check()?;
        match vault.manifest.remove_file(name) {
            Some(record) => {
                removed_ids.extend(record.shard_ids.iter().copied());
                stats.files_deleted += 1;
            }
            None => {
                warn!(file = %name, "not in manifest; skipping");
                stats.files_missing.push(name.clone());
            }
        }
    }
    if stats.files_deleted == 0 {
        return Ok(stats);
    }

    vault.publish_manifest_with_retry(cancel)?;

    let candidates: HashSet<String> = removed_ids
        .iter()
        .filter(|id| vault.manifest.get_by_shard_id(**id).is_none())
        .map(|id| id.as_object_name())
        .collect();
    stats.shards_still_referenced = removed_ids.len() - candidates.len();
    if candidates.is_empty() {
        return Ok(stats);
    }

    // Every version of each candidate name goes.
    let objects = vault.store.list_objects(true)?;
    for object in objects {
        if object.name == MANIFEST_OBJECT_NAME || !candidates.contains(&object.name) {
            continue;
        }
        cancel.check()?;
        match vault.store.delete(&object.id, &object.name) {
            Ok(()) => {
                stats.objects_deleted += 1;
                stats.bytes_freed += object.length;
            }
            Err(err) => {
                warn!(object = %object.name, error = %err, "failed to delete shard object");
                stats.delete_failures += 1;
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, FlakyStore};
    use skep_store::MemoryStore;
    use skep_types::SkepError;
    use std::sync::Arc;

    #[test]
    fn deletes_file_and_its_shards() {
        let mut vault = testutil::test_vault();
        testutil::put_file(&mut vault, "a.txt", b"0123456789", 4);
        testutil::put_file(&mut vault, "b.txt", b"other", 4);

        let stats = run(&mut vault, &["a.txt".into()], &CancelFlag::new()).unwrap();
        assert_eq!(stats.files_deleted, 1);
        assert_eq!(stats.objects_deleted, 3);
        assert_eq!(stats.delete_failures, 0);
        assert!(!vault.manifest.contains("a.txt"));
        assert!(vault.manifest.contains("b.txt"));

        // Reopening sees the published removal.
        let reopened = testutil::test_vault_with_store(vault.store.clone());
        assert!(!reopened.manifest.contains("a.txt"));
    }

    #[test]
    fn missing_files_are_reported_not_fatal() {
        let mut vault = testutil::test_vault();
        testutil::put_file(&mut vault, "a.txt", b"data", 16);

        let stats = run(
            &mut vault,
            &["nope".into(), "a.txt".into()],
            &CancelFlag::new(),
        )
        .unwrap();
        assert_eq!(stats.files_deleted, 1);
        assert_eq!(stats.files_missing, ["nope"]);
    }

    #[test]
    fn shards_shared_after_compaction_survive() {
        let mut vault = testutil::test_vault();
        let kept = testutil::put_file(&mut vault, "a.txt", b"same body", 4);
        // Duplicate content that shares a.txt's shards, as compaction leaves it.
        let mut dup = kept.clone();
        dup.file_name = "copy.txt".into();
        vault.manifest.add_file(dup);

        let stats = run(&mut vault, &["copy.txt".into()], &CancelFlag::new()).unwrap();
        assert_eq!(stats.files_deleted, 1);
        assert_eq!(stats.objects_deleted, 0);
        assert_eq!(stats.shards_still_referenced, kept.shard_ids.len());
        // a.txt still downloadable: its shard objects remain.
        let objects = vault.store.list_objects(false).unwrap();
        for id in &kept.shard_ids {
            assert!(objects.iter().any(|o| o.name == id.as_object_name()));
        }
    }

    #[test]
    fn failed_shard_deletes_are_counted_not_fatal() {
        let store = Arc::new(FlakyStore::new(MemoryStore::new()));
        let mut vault = testutil::test_vault_with_store(store.clone());
        testutil::put_file(&mut vault, "a.txt", b"0123456789", 4);
        store.fail_next_deletes(1);

        let stats = run(&mut vault, &["a.txt".into()], &CancelFlag::new()).unwrap();
        assert_eq!(stats.files_deleted, 1);
        assert_eq!(stats.delete_failures, 1);
        assert_eq!(stats.objects_deleted, 2);
        // The leftover object is now unreferenced; prune's problem.
        assert!(!vault.manifest.contains("a.txt"));
    }

    #[test]
    fn cancellation_aborts_before_removal() {
        let mut vault = testutil::test_vault();
        testutil::put_file(&mut vault, "a.txt", b"data", 16);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = run(&mut vault, &["a.txt".into()], &cancel).unwrap_err();
        assert!(matches!(err, SkepError::Cancelled));
        assert!(vault.manifest.contains("a.txt"));
    }
}
