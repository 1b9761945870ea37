use skep_core::commands;
use skep_core::vault::Vault;
use skep_types::{CancelFlag, Result};

use crate::format::format_bytes;

pub(crate) fn run_prune(vault: &Vault, dry_run: bool, cancel: &CancelFlag) -> Result<bool> {
    let stats = commands::prune::run(vault, dry_run, cancel)?;

    if stats.dry_run {
        for meta in &stats.orphans {
            println!("would delete  {}  ({})", meta.name, format_bytes(meta.length));
        }
        let total: u64 = stats.orphans.iter().map(|o| o.length).sum();
        println!(
            "Dry run: {} of {} object versions are unreferenced ({})",
            stats.orphans_found,
            stats.objects_listed,
            format_bytes(total),
        );
        return Ok(false);
    }

    println!(
        "Pruned {} of {} orphaned objects, freed {}",
        stats.objects_pruned,
        stats.orphans_found,
        format_bytes(stats.bytes_freed),
    );
    if stats.failures > 0 {
        println!(
            "  {} deletions failed; a later prune will retry them",
            stats.failures,
        );
    }

    Ok(stats.failures > 0)
}
