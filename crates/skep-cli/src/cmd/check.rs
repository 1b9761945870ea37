use skep_core::commands;
use skep_core::vault::Vault;
use skep_types::{CancelFlag, Result};

pub(crate) fn run_check(vault: &Vault, cancel: &CancelFlag) -> Result<bool> {
    let stats = commands::check::run(vault, cancel)?;

    if !stats.is_clean() {
        println!("Files with missing shards:");
        for file in &stats.corrupt_files {
            let shards: Vec<String> = file
                .missing_shards
                .iter()
                .map(|id| id.as_object_name())
                .collect();
            println!("  {}  [{}]", file.file_name, shards.join(", "));
        }
        println!();
    }

    println!(
        "Check complete: {} files, {} shard references, {} missing shards, {} unrestorable files",
        stats.files_checked,
        stats.shards_referenced,
        stats.shards_missing,
        stats.corrupt_files.len(),
    );

    Ok(!stats.is_clean())
}
