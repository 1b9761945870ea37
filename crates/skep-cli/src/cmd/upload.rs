use std::io::IsTerminal;
use std::path::Path;

use skep_core::commands::upload::{self, UploadOptions, UploadStats};
use skep_core::upload::UploadEvent;
use skep_core::vault::Vault;
use skep_types::{CancelFlag, Result};

use crate::format::format_bytes;
use crate::progress::UploadProgressRenderer;

pub(crate) fn run_upload_file(
    vault: &mut Vault,
    source: &str,
    dest: Option<&str>,
    cancel: &CancelFlag,
) -> Result<bool> {
    let stats = if !std::io::stderr().is_terminal() {
        upload::upload_file(vault, Path::new(source), dest, cancel, None)?
    } else {
        let mut renderer = UploadProgressRenderer::new();
        let mut on_event = |event: &UploadEvent| renderer.on_event(event);
        let result = upload::upload_file(vault, Path::new(source), dest, cancel, Some(&mut on_event));
        renderer.finish();
        result?
    };

    print_stats(&stats);
    Ok(had_failures(&stats))
}

pub(crate) fn run_upload_folder(
    vault: &mut Vault,
    dir: &str,
    dry_run: bool,
    override_unchanged: bool,
    cancel: &CancelFlag,
) -> Result<bool> {
    let options = UploadOptions {
        dry_run,
        override_unchanged,
    };

    let stats = if dry_run || !std::io::stderr().is_terminal() {
        upload::upload_folder(vault, Path::new(dir), options, cancel, None)?
    } else {
        let mut renderer = UploadProgressRenderer::new();
        let mut on_event = |event: &UploadEvent| renderer.on_event(event);
        let result = upload::upload_folder(vault, Path::new(dir), options, cancel, Some(&mut on_event));
        renderer.finish();
        result?
    };

    print_stats(&stats);
    Ok(had_failures(&stats))
}

fn had_failures(stats: &UploadStats) -> bool {
    stats.files_failed > 0 || stats.walk_errors > 0
}

fn print_stats(stats: &UploadStats) {
    if stats.dry_run {
        println!(
            "Dry run: would upload {} files ({} unchanged, {} unreadable)",
            stats.files_planned, stats.files_unchanged, stats.walk_errors,
        );
        return;
    }

    println!(
        "Uploaded {} files: {} in {} shards ({} stored)",
        stats.files_uploaded,
        format_bytes(stats.plaintext_bytes),
        stats.shards_uploaded,
        format_bytes(stats.stored_bytes),
    );
    if stats.files_unchanged > 0 {
        println!("  Unchanged: {}", stats.files_unchanged);
    }
    if stats.files_failed > 0 {
        println!(
            "  Failed: {} files ({} shards); their stored records were left untouched",
            stats.files_failed, stats.shards_failed,
        );
    }
    if stats.walk_errors > 0 {
        println!("  Unreadable: {} entries skipped", stats.walk_errors);
    }
}
