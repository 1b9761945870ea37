use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "skep",
    version,
    about = "Sharded, encrypted file storage on dumb object stores",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $SKEP_CONFIG                (environment variable)
  3. ./skep.yaml                 (project)
  4. User config dir + /skep/config.yaml (e.g. ~/.config/skep/config.yaml)
  5. /etc/skep/config.yaml       (system)

Environment variables:
  SKEP_CONFIG       Path to configuration file (overrides default search)
  SKEP_PASSPHRASE   Encryption passphrase (when encryption.passphrase_env names it)"
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides SKEP_CONFIG and default search)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Upload a single file
    UploadFile {
        /// Local file to upload
        source: String,

        /// Name to store it under (default: the source's own file name)
        dest: Option<String>,
    },

    /// Upload a directory tree, skipping files that are already current
    UploadFolder {
        /// Directory to walk
        dir: String,

        /// Only show what would be uploaded, don't store anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Re-upload files even when their stored record already matches
        #[arg(long = "override")]
        override_unchanged: bool,
    },

    /// Download stored files into a directory
    DownloadFile {
        /// Stored names to download
        #[arg(required = true)]
        names: Vec<String>,

        /// Directory to write the files into
        #[arg(long)]
        dest: String,
    },

    /// Delete stored files and reclaim their shards
    DeleteFile {
        /// Stored names to delete
        #[arg(required = true)]
        names: Vec<String>,

        /// Skip interactive confirmation (for scripting)
        #[arg(long)]
        yes: bool,
    },

    /// List all stored files
    ListFiles,

    /// Verify that every referenced shard exists in the store
    CheckManifest,

    /// Rewrite duplicate files to share one set of shards
    CompactShards {
        /// Only show what would change, don't rewrite anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Delete shard objects no stored file references
    PruneShards {
        /// Only list the orphans, don't delete anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Rename a stored file
    RenameFile {
        /// Current name
        from: String,

        /// New name
        to: String,
    },

    /// Show the active configuration file, or generate one
    Config {
        /// Write a starter config file instead of showing the active one
        #[arg(long)]
        init: bool,

        /// Destination for --init (default: interactive choice)
        dest: Option<String>,
    },
}

impl Commands {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::UploadFile { .. } => "upload-file",
            Self::UploadFolder { .. } => "upload-folder",
            Self::DownloadFile { .. } => "download-file",
            Self::DeleteFile { .. } => "delete-file",
            Self::ListFiles => "list-files",
            Self::CheckManifest => "check-manifest",
            Self::CompactShards { .. } => "compact-shards",
            Self::PruneShards { .. } => "prune-shards",
            Self::RenameFile { .. } => "rename-file",
            Self::Config { .. } => "config",
        }
    }
}
