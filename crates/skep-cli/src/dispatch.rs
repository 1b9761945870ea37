use skep_core::config::SkepConfig;
use skep_core::vault::Vault;
use skep_types::{CancelFlag, Result, SkepError};

use crate::cli::Commands;
use crate::cmd;

/// Open the vault and run one command against it.
///
/// Returns `Ok(had_failures)`: `true` when the command finished but some
/// items failed (the caller turns that into exit code 1).
pub(crate) fn dispatch_command(
    command: &Commands,
    config: SkepConfig,
    cancel: &CancelFlag,
) -> Result<bool> {
    match command {
        Commands::UploadFile { source, dest } => {
            let mut vault = Vault::open(config)?;
            cmd::upload::run_upload_file(&mut vault, source, dest.as_deref(), cancel)
        }
        Commands::UploadFolder {
            dir,
            dry_run,
            override_unchanged,
        } => {
            let mut vault = Vault::open(config)?;
            cmd::upload::run_upload_folder(&mut vault, dir, *dry_run, *override_unchanged, cancel)
        }
        Commands::DownloadFile { names, dest } => {
            let vault = Vault::open(config)?;
            cmd::download::run_download(&vault, names, dest, cancel)
        }
        Commands::DeleteFile { names, yes } => {
            let mut vault = Vault::open(config)?;
            cmd::delete::run_delete(&mut vault, names, *yes, cancel)
        }
        Commands::ListFiles => {
            let vault = Vault::open(config)?;
            cmd::list::run_list(&vault);
            Ok(false)
        }
        Commands::CheckManifest => {
            let vault = Vault::open(config)?;
            cmd::check::run_check(&vault, cancel)
        }
        Commands::CompactShards { dry_run } => {
            let mut vault = Vault::open(config)?;
            cmd::compact::run_compact(&mut vault, *dry_run, cancel).map(|()| false)
        }
        Commands::PruneShards { dry_run } => {
            let vault = Vault::open(config)?;
            cmd::prune::run_prune(&vault, *dry_run, cancel)
        }
        Commands::RenameFile { from, to } => {
            let mut vault = Vault::open(config)?;
            cmd::rename::run_rename(&mut vault, from, to, cancel).map(|()| false)
        }
        Commands::Config { .. } => Err(SkepError::Config(
            "'config' is handled before config resolution".into(),
        )),
    }
}
