use std::collections::HashSet;

use tracing::{info, warn};

use skep_store::ObjectMeta;
use skep_types::{CancelFlag, Result, SkepError};

use crate::manifest::MANIFEST_OBJECT_NAME;
use crate::vault::Vault;

#[derive(Debug, Default)]
pub struct PruneStats {
    /// Object versions in the store, manifest object included.
    pub objects_listed: usize,
    pub orphans_found: usize,
    pub objects_pruned: usize,
    pub failures: usize,
    pub bytes_freed: u64,
    pub dry_run: bool,
    /// Populated on dry runs only; a real run consumes the list.
    pub orphans: Vec<ObjectMeta>,
}

/// Delete every object version the manifest does not reference.
///
/// The manifest object itself is always kept, old versions included.
/// Deletions run on a small worker pool; each failure is reported and the
/// object is retried by some future prune.
pub fn run(vault: &Vault, dry_run: bool, cancel: &CancelFlag) -> Result<PruneStats> {
    let referenced: HashSet<String> = vault
        .manifest
        .referenced_shard_ids()
        .iter()
        .map(|id| id.as_object_name())
        .collect();

    let objects = vault.store.list_objects(true)?;
    let mut stats = PruneStats {
        objects_listed: objects.len(),
        dry_run,
        ..Default::default()
    };
    let orphans: Vec<ObjectMeta> = objects
        .into_iter()
        .filter(|o| o.name != MANIFEST_OBJECT_NAME && !referenced.contains(&o.name))
        .collect();
    stats.orphans_found = orphans.len();

    if dry_run {
        stats.orphans = orphans;
        return Ok(stats);
    }
    if orphans.is_empty() {
        return Ok(stats);
    }

    let workers = vault.config.prune.delete_workers.max(1);
    std::thread::scope(|s| {
        let (work_tx, work_rx) = crossbeam_channel::bounded::<ObjectMeta>(workers * 2);
        let (result_tx, result_rx) =
            crossbeam_channel::bounded::<(ObjectMeta, Result<()>)>(workers * 2);

        let producer_cancel = cancel.clone();
        s.spawn(move || {
            for object in orphans {
                if producer_cancel.is_cancelled() {
                    break;
                }
                if work_tx.send(object).is_err() {
                    break;
                }
            }
        });

        for _ in 0..workers {
            let rx = work_rx.clone();
            let tx = result_tx.clone();
            let store = vault.store.clone();
            let worker_cancel = cancel.clone();
            s.spawn(move || {
                for object in rx {
                    let result = if worker_cancel.is_cancelled() {
                        Err(SkepError::Cancelled)
                    } else {
                        store.delete(&object.id, &object.name)
                    };
                    if tx.send((object, result)).is_err() {
                        return;
                    }
                }
            });
        }
        drop(work_rx);
        drop(result_tx);

        for (object, result) in result_rx {
            match result {
                Ok(()) => {
                    stats.objects_pruned += 1;
                    stats.bytes_freed += object.length;
                }
                Err(SkepError::Cancelled) => {}
                Err(err) => {
                    warn!(object = %object.name, error = %err, "failed to prune object");
                    stats.failures += 1;
                }
            }
        }
    });

    cancel.check()?;
    info!(
        pruned = stats.objects_pruned,
        failures = stats.failures,
        bytes_freed = stats.bytes_freed,
        "prune finished"
    );
    Ok(stats)
}
