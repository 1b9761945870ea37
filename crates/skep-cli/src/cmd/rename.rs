use skep_core::commands;
use skep_core::vault::Vault;
use skep_types::{CancelFlag, Result};

pub(crate) fn run_rename(vault: &mut Vault, from: &str, to: &str, cancel: &CancelFlag) -> Result<()> {
    let stats = commands::rename::run(vault, from, to, cancel)?;

    println!("Renamed '{}' to '{}'", stats.from, stats.to);
    if stats.replaced {
        println!("  Replaced an existing entry; its shards are orphans until the next prune.");
    }
    Ok(())
}
