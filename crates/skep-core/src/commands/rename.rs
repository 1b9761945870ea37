use tracing::warn;

use skep_types::{CancelFlag, Result, SkepError};

use crate::vault::Vault;

#[derive(Debug)]
pub struct RenameStats {
    pub from: String,
    pub to: String,
    /// An existing entry under the destination name was replaced; its
    /// shards become orphans until the next prune.
    pub replaced: bool,
}

pub fn run(vault: &mut Vault, from: &str, to: &str, cancel: &CancelFlag) -> Result<RenameStats> {
    if from == to {
        return Err(SkepError::Config(
            "source and destination names are identical".into(),
        ));
    }
    let mut record = vault
        .manifest
        .remove_file(from)
        .ok_or_else(|| SkepError::FileNotFound(from.to_string()))?;
    record.file_name = to.to_string();
    let replaced = vault.manifest.add_file(record).is_some();
    if replaced {
        warn!(name = %to, "rename replaced an existing entry");
    }
    vault.publish_manifest_with_retry(cancel)?;
    Ok(RenameStats {
        from: from.to_string(),
        to: to.to_string(),
        replaced,
    })
}
