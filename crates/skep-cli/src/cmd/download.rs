use std::path::Path;

use skep_core::commands;
use skep_core::vault::Vault;
use skep_types::{CancelFlag, Result};

use crate::format::format_bytes;

pub(crate) fn run_download(
    vault: &Vault,
    names: &[String],
    dest: &str,
    cancel: &CancelFlag,
) -> Result<bool> {
    let stats = commands::download::run(vault, names, Path::new(dest), cancel)?;

    println!(
        "Downloaded {} of {} files ({})",
        stats.files_downloaded,
        stats.files_requested,
        format_bytes(stats.bytes_written),
    );
    if !stats.failures.is_empty() {
        println!("Failed:");
        for (name, err) in &stats.failures {
            println!("  {name}: {err}");
        }
    }

    Ok(!stats.failures.is_empty())
}
