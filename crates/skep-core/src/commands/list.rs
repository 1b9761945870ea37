use skep_types::Sha1Hash;

use crate::vault::Vault;

/// One row of `list-files` output.
#[derive(Debug, Clone)]
pub struct FileListEntry {
    pub file_name: String,
    pub file_length: i64,
    pub last_modified: i64,
    pub shard_count: usize,
    pub sha1: Sha1Hash,
}

#[derive(Debug, Default)]
pub struct ListStats {
    pub files: Vec<FileListEntry>,
    pub total_bytes: i64,
}

/// Reads only the already-loaded manifest; never talks to the store.
pub fn run(vault: &Vault) -> ListStats {
    let files = vault
        .manifest
        .files()
        .map(|record| FileListEntry {
            file_name: record.file_name.clone(),
            file_length: record.file_length,
            last_modified: record.last_modified,
            shard_count: record.shard_count(),
            sha1: record.sha1,
        })
        .collect();
    ListStats {
        files,
        total_bytes: vault.manifest.total_file_bytes(),
    }
}
