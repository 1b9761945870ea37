use std::collections::HashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use skep_store::retry::retry_transient;
use skep_store::ObjectMeta;
use skep_types::{CancelFlag, Result, Sha1Hash, SkepError};

use crate::manifest::FileRecord;
use crate::vault::{decode_shard_payload, Vault};

#[derive(Debug, Default)]
pub struct DownloadStats {
    pub files_requested: usize,
    pub files_downloaded: usize,
    pub bytes_written: u64,
    pub failures: Vec<(String, SkepError)>,
}

/// Reconstruct files under `dest_dir`, one at a time. Each file's shards
/// download in piece order with transient store errors retried, are
/// verified against the manifest hashes, and land via an atomic rename; a
/// failed file leaves no partial output and does not abort its siblings.
pub fn run(
    vault: &Vault,
    names: &[String],
    dest_dir: &Path,
    cancel: &CancelFlag,
) -> Result<DownloadStats> {
    std::fs::create_dir_all(dest_dir)?;
    let objects = vault.newest_objects()?;
    let by_name: HashMap<&str, &ObjectMeta> =
        objects.iter().map(|o| (o.name.as_str(), o)).collect();

    let mut stats = DownloadStats {
        files_requested: names.len(),
        ..Default::default()
    };
    for name in names {
        cancel.check()?;
        match download_one(vault, &by_name, name, dest_dir, cancel) {
            Ok(written) => {
                stats.files_downloaded += 1;
                stats.bytes_written += written;
            }
            Err(SkepError::Cancelled) => return Err(SkepError::Cancelled),
            Err(err) => {
                warn!(file = %name, error = %err, "download failed");
                stats.failures.push((name.clone(), err));
            }
        }
    }
    Ok(stats)
}

/// Manifest names may contain `/` separators; map them under `dest_dir`
/// and refuse anything that would escape it.
fn sanitized_dest(dest_dir: &Path, file_name: &str) -> Result<PathBuf> {
    let relative = Path::new(file_name);
    for component in relative.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(SkepError::Other(format!(
                    "refusing unsafe file name {file_name:?}"
                )));
            }
        }
    }
    Ok(dest_dir.join(relative))
}

fn download_one(
    vault: &Vault,
    by_name: &HashMap<&str, &ObjectMeta>,
    name: &str,
    dest_dir: &Path,
    cancel: &CancelFlag,
) -> Result<u64> {
    let record = vault
        .manifest
        .get(name)
        .ok_or_else(|| SkepError::FileNotFound(name.to_string()))?;
    if record.shard_ids.len() != record.shard_hashes.len() {
        return Err(SkepError::Corrupt(format!(
            "manifest entry {name} has {} shard ids but {} hashes",
            record.shard_ids.len(),
            record.shard_hashes.len()
        )));
    }

    let dest = sanitized_dest(dest_dir, name)?;
    let parent = dest.parent().unwrap_or(dest_dir);
    std::fs::create_dir_all(parent)?;

    // Assemble in a temp file next to the destination so the final rename
    // stays on one filesystem.
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    let written = write_file_body(vault, by_name, record, tmp.as_file_mut(), cancel)?;
    tmp.persist(&dest).map_err(|e| SkepError::Io(e.error))?;
    debug!(file = %name, bytes = written, "downloaded");
    Ok(written)
}

fn write_file_body(
    vault: &Vault,
    by_name: &HashMap<&str, &ObjectMeta>,
    record: &FileRecord,
    out: &mut std::fs::File,
    cancel: &CancelFlag,
) -> Result<u64> {
    let name = &record.file_name;
    let retry = vault.config.upload.retry_policy();
    let mut hasher = Sha1::new();
    let mut written: u64 = 0;
    for (piece, (shard_id, expected)) in record
        .shard_ids
        .iter()
        .zip(&record.shard_hashes)
        .enumerate()
    {
        cancel.check()?;
        let object_name = shard_id.as_object_name();
        let object = by_name.get(object_name.as_str()).ok_or_else(|| {
            SkepError::Corrupt(format!("shard {piece} of {name} is missing from the store"))
        })?;
        let data = retry_transient(&retry, "shard download", cancel, || {
            vault.store.download(&object.id)
        })?;
        let plaintext = decode_shard_payload(vault.crypto.as_ref(), &data, None)?;
        if Sha1Hash::compute(&plaintext) != *expected {
            return Err(SkepError::Corrupt(format!(
                "shard {piece} of {name} does not match its recorded hash"
            )));
        }
        hasher.update(&plaintext);
        out.write_all(&plaintext)?;
        written += plaintext.len() as u64;
    }

    if Sha1Hash(hasher.finalize().into()) != record.sha1 {
        return Err(SkepError::Corrupt(format!(
            "reassembled {name} does not match its recorded whole-file hash"
        )));
    }
    if written != record.file_length as u64 {
        return Err(SkepError::Corrupt(format!(
            "reassembled {name} is {written} bytes, manifest says {}",
            record.file_length
        )));
    }
    Ok(written)
}
