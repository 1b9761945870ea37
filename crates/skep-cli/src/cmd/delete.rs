use std::io::IsTerminal;

use skep_core::commands;
use skep_core::vault::Vault;
use skep_types::{CancelFlag, Result, SkepError};

use crate::format::format_bytes;

pub(crate) fn run_delete(
    vault: &mut Vault,
    names: &[String],
    yes: bool,
    cancel: &CancelFlag,
) -> Result<bool> {
    if !yes && !confirm(names)? {
        eprintln!("Aborted.");
        return Ok(false);
    }

    let stats = commands::delete::run(vault, names, cancel)?;

    println!(
        "Deleted {} files; removed {} shard objects ({})",
        stats.files_deleted,
        stats.objects_deleted,
        format_bytes(stats.bytes_freed),
    );
    if stats.shards_still_referenced > 0 {
        println!(
            "  Kept {} shards still referenced by other files",
            stats.shards_still_referenced,
        );
    }
    if stats.delete_failures > 0 {
        println!(
            "  {} shard deletions failed; prune-shards will retry them",
            stats.delete_failures,
        );
    }
    if !stats.files_missing.is_empty() {
        println!("Not found:");
        for name in &stats.files_missing {
            println!("  {name}");
        }
    }

    Ok(stats.delete_failures > 0 || !stats.files_missing.is_empty())
}

fn confirm(names: &[String]) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Err(SkepError::Config(
            "refusing to delete without confirmation in non-interactive mode; \
             use --yes to skip the prompt"
                .into(),
        ));
    }

    eprintln!("This will delete {} files and their shards:", names.len());
    for name in names {
        eprintln!("  {name}");
    }
    eprint!("Proceed? [y/N]: ");
    std::io::Write::flush(&mut std::io::stderr())?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim(), "y" | "Y" | "yes"))
}
