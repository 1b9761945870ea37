//! Upload commands: a single file under a chosen name, or a folder tree
//! walked recursively with unchanged files skipped.
//!
//! Files are planned up front (length, digest, piece layout) without
//! reading their bodies, then every piece of every planned file goes
//! through one shared [`UploadManager`] run. A file enters the manifest
//! only when all of its pieces landed; a partial file keeps its previous
//! record, and any shards it did store wait for the next prune.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use skep_types::{CancelFlag, Result, Sha1Hash, ShardId, SkepError};

use crate::hash_cache::{self, HashCache};
use crate::manifest::FileRecord;
use crate::sharder::{self, ShardPlan};
use crate::upload::{UploadEvent, UploadManager};
use crate::vault::Vault;

#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
    /// Plan and report, but upload nothing and leave the manifest alone.
    pub dry_run: bool,
    /// Re-upload files whose length and digest match their manifest record.
    pub override_unchanged: bool,
}

#[derive(Debug, Default)]
pub struct UploadStats {
    pub files_planned: usize,
    pub files_uploaded: usize,
    /// Files with at least one failed shard; their manifest records are
    /// untouched.
    pub files_failed: usize,
    pub files_unchanged: usize,
    /// Directory entries that could not be walked, statted, or hashed.
    pub walk_errors: usize,
    pub shards_uploaded: usize,
    pub shards_failed: usize,
    pub plaintext_bytes: u64,
    pub stored_bytes: u64,
    pub dry_run: bool,
}

/// One file scheduled for upload: identity resolved and pieces laid out,
/// but nothing read yet beyond the whole-file digest.
struct PlannedFile {
    file_name: String,
    file_length: u64,
    mtime_ns: i64,
    sha1: Sha1Hash,
    plans: Vec<ShardPlan>,
}

/// Upload one file as `dest_name` (default: its own file name). Always
/// uploads; an existing record under that name is replaced once every
/// shard has landed.
pub fn upload_file(
    vault: &mut Vault,
    source: &Path,
    dest_name: Option<&str>,
    cancel: &CancelFlag,
    progress: Option<&mut dyn FnMut(&UploadEvent)>,
) -> Result<UploadStats> {
    let meta = std::fs::metadata(source)
        .map_err(|e| SkepError::Config(format!("cannot read '{}': {e}", source.display())))?;
    if !meta.is_file() {
        return Err(SkepError::Config(format!(
            "'{}' is not a regular file",
            source.display()
        )));
    }
    let file_name = match dest_name {
        Some(name) if !name.is_empty() => name.to_string(),
        Some(_) => return Err(SkepError::Config("destination name is empty".into())),
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SkepError::Config(format!("'{}' has no file name", source.display()))
            })?,
    };
    let shard_size = vault.config.shard.effective_size_bytes();
    sharder::validate_shard_size(shard_size)?;
    cancel.check()?;

    let planned = PlannedFile {
        file_name,
        file_length: meta.len(),
        mtime_ns: hash_cache::mtime_ns(&meta),
        sha1: sharder::hash_file(source)?,
        plans: sharder::plan_for_length(source, meta.len(), shard_size),
    };

    let mut stats = UploadStats {
        files_planned: 1,
        ..Default::default()
    };
    run_upload(vault, vec![planned], cancel, progress, &mut stats)?;
    Ok(stats)
}

/// Upload a directory tree. Manifest names are paths relative to `dir`
/// with `/` separators; files whose length and digest already match their
/// record are skipped unless `override_unchanged` is set. Unreadable
/// entries are reported and skipped, never fatal.
pub fn upload_folder(
    vault: &mut Vault,
    dir: &Path,
    options: UploadOptions,
    cancel: &CancelFlag,
    progress: Option<&mut dyn FnMut(&UploadEvent)>,
) -> Result<UploadStats> {
    let root = dir
        .canonicalize()
        .map_err(|e| SkepError::Config(format!("cannot open '{}': {e}", dir.display())))?;
    if !root.is_dir() {
        return Err(SkepError::Config(format!(
            "'{}' is not a directory",
            dir.display()
        )));
    }
    let shard_size = vault.config.shard.effective_size_bytes();
    sharder::validate_shard_size(shard_size)?;

    let cache_enabled = vault.config.cache.hash_cache;
    let mut cache = if cache_enabled {
        HashCache::load()
    } else {
        HashCache::new()
    };

    let mut stats = UploadStats {
        dry_run: options.dry_run,
        ..Default::default()
    };
    let mut planned = Vec::new();

    // Symlinks are not followed and not uploaded.
    for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
        cancel.check()?;
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "cannot walk directory entry");
                stats.walk_errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "cannot stat file");
                stats.walk_errors += 1;
                continue;
            }
        };
        let Some(file_name) = relative_name(entry.path(), &root) else {
            warn!(path = %entry.path().display(), "cannot derive a manifest name; skipping");
            stats.walk_errors += 1;
            continue;
        };

        let mtime = hash_cache::mtime_ns(&meta);
        let length = meta.len();
        let cache_key = entry.path().to_string_lossy().into_owned();
        let sha1 = match cache.lookup(&cache_key, mtime, length) {
            Some(sha1) => sha1,
            None => match sharder::hash_file(entry.path()) {
                Ok(sha1) => {
                    cache.insert(cache_key, mtime, length, sha1);
                    sha1
                }
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "cannot hash file");
                    stats.walk_errors += 1;
                    continue;
                }
            },
        };

        if !options.override_unchanged {
            if let Some(existing) = vault.manifest.get(&file_name) {
                if existing.file_length == length as i64 && existing.sha1 == sha1 {
                    debug!(file = %file_name, "unchanged; skipping");
                    stats.files_unchanged += 1;
                    continue;
                }
            }
        }

        planned.push(PlannedFile {
            file_name,
            file_length: length,
            mtime_ns: mtime,
            sha1,
            plans: sharder::plan_for_length(entry.path(), length, shard_size),
        });
        stats.files_planned += 1;
    }

    // Digests are valid regardless of what happens to the upload, so the
    // cache lands even on dry runs.
    if cache_enabled {
        if let Err(err) = cache.save() {
            warn!(error = %err, "failed to save hash cache");
        }
    }

    if options.dry_run {
        info!(
            files = stats.files_planned,
            unchanged = stats.files_unchanged,
            "dry run; nothing uploaded"
        );
        return Ok(stats);
    }
    if planned.is_empty() {
        return Ok(stats);
    }

    run_upload(vault, planned, cancel, progress, &mut stats)?;
    Ok(stats)
}

/// Manifest name for `path` below `root`: components joined with `/`.
fn relative_name(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

struct FileAssembly {
    pieces: Vec<Option<(ShardId, Sha1Hash)>>,
    failed: usize,
}

/// Push every planned piece through one upload run, then record the files
/// whose pieces all landed and publish the manifest once.
fn run_upload(
    vault: &mut Vault,
    mut planned: Vec<PlannedFile>,
    cancel: &CancelFlag,
    mut progress: Option<&mut dyn FnMut(&UploadEvent)>,
    stats: &mut UploadStats,
) -> Result<()> {
    let mut manager = UploadManager::new(
        vault.store.clone(),
        vault.crypto.clone(),
        vault.compression,
        vault.config.upload.clone(),
        cancel.clone(),
    );
    manager.execute();

    let mut assemblies: HashMap<String, FileAssembly> = planned
        .iter()
        .map(|file| {
            (
                file.file_name.clone(),
                FileAssembly {
                    pieces: vec![None; file.plans.len()],
                    failed: 0,
                },
            )
        })
        .collect();

    for file in &mut planned {
        for plan in file.plans.drain(..) {
            manager.add_lazy_shard(&file.file_name, plan)?;
        }
    }
    manager.seal();

    let run = manager.wait(|event| {
        match event {
            UploadEvent::Finished {
                file_name,
                piece_number,
                shard_id,
                sha1,
                ..
            } => {
                if let Some(assembly) = assemblies.get_mut(file_name) {
                    if let Some(slot) = assembly.pieces.get_mut(*piece_number as usize) {
                        *slot = Some((*shard_id, *sha1));
                    }
                }
            }
            UploadEvent::Failed {
                file_name,
                piece_number,
                error,
                ..
            } => {
                if let Some(assembly) = assemblies.get_mut(file_name) {
                    assembly.failed += 1;
                }
                if !error.is_cancelled() {
                    warn!(file = %file_name, piece = piece_number, error = %error, "shard upload failed");
                }
            }
            UploadEvent::Begin { .. } | UploadEvent::TierChanged { .. } => {}
        }
        if let Some(cb) = progress.as_mut() {
            cb(event);
        }
    })?;

    stats.shards_uploaded = run.succeeded;
    stats.shards_failed = run.failed;
    stats.plaintext_bytes = run.plaintext_bytes;
    stats.stored_bytes = run.stored_bytes;

    // A cancelled run publishes nothing; whatever shards landed are
    // orphans for the next prune.
    cancel.check()?;

    for file in planned {
        let Some(assembly) = assemblies.remove(&file.file_name) else {
            continue;
        };
        if assembly.failed > 0 || assembly.pieces.iter().any(|p| p.is_none()) {
            warn!(
                file = %file.file_name,
                failed_shards = assembly.failed,
                "upload incomplete; manifest entry unchanged"
            );
            stats.files_failed += 1;
            continue;
        }
        let (shard_ids, shard_hashes) = assembly.pieces.into_iter().flatten().unzip();
        vault.manifest.add_file(FileRecord {
            file_name: file.file_name,
            file_length: file.file_length as i64,
            last_modified: file.mtime_ns,
            sha1: file.sha1,
            shard_ids,
            shard_hashes,
        });
        stats.files_uploaded += 1;
    }

    if stats.files_uploaded > 0 {
        vault.publish_manifest_with_retry(cancel)?;
    }
    info!(
        files = stats.files_uploaded,
        shards = stats.shards_uploaded,
        plaintext_bytes = stats.plaintext_bytes,
        "upload complete"
    );
    Ok(())
}
