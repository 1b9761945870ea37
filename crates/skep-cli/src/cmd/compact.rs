use skep_core::commands;
use skep_core::vault::Vault;
use skep_types::{CancelFlag, Result};

pub(crate) fn run_compact(vault: &mut Vault, dry_run: bool, cancel: &CancelFlag) -> Result<()> {
    let stats = commands::compact::run(vault, dry_run, cancel)?;

    if stats.dry_run {
        println!(
            "Dry run: {} duplicate groups among {} files; would rewrite {} files ({} shard refs) and orphan {} shards",
            stats.duplicate_classes,
            stats.files_total,
            stats.files_rewritten,
            stats.shard_refs_rewritten,
            stats.orphaned_shards,
        );
        return Ok(());
    }

    if stats.files_rewritten == 0 {
        println!("Nothing to compact: no two files share content.");
        return Ok(());
    }

    println!(
        "Compacted: {} of {} files now share shards ({} refs rewritten), {} shards orphaned",
        stats.files_rewritten, stats.files_total, stats.shard_refs_rewritten, stats.orphaned_shards,
    );
    println!("Run prune-shards to reclaim the orphaned objects.");
    Ok(())
}
