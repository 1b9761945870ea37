use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use skep_store::RetryPolicy;
use skep_types::{Result, SkepError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkepConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub shard: ShardConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub prune: PruneConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend kind: "local" or "memory".
    #[serde(default = "default_store_kind")]
    pub kind: String,
    /// Root directory for the local backend.
    pub path: Option<String>,
    /// Refresh the authorization session this many seconds before expiry.
    #[serde(default = "default_session_margin_secs")]
    pub session_margin_secs: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: default_store_kind(),
            path: None,
            session_margin_secs: default_session_margin_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// "aes256gcm" or "none".
    #[serde(default = "default_encryption_mode")]
    pub mode: String,
    pub passphrase: Option<String>,
    /// Name of an environment variable holding the passphrase.
    pub passphrase_env: Option<String>,
    /// Hex-encoded KDF salt, at least 16 bytes. All clients of one store
    /// must share it, or they cannot read each other's manifest.
    pub salt: Option<String>,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            mode: default_encryption_mode(),
            passphrase: None,
            passphrase_env: None,
            salt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_zstd_level")]
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            zstd_level: default_zstd_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Fixed shard size in MiB. Files are split into pieces of exactly this
    /// size; only the final piece may be shorter.
    #[serde(default = "default_shard_size_mib")]
    pub size_mib: u32,
    /// Exact shard size in bytes. Overrides `size_mib` when set.
    pub size_bytes: Option<u64>,
}

impl ShardConfig {
    pub fn effective_size_bytes(&self) -> u64 {
        self.size_bytes
            .unwrap_or(self.size_mib as u64 * 1024 * 1024)
    }
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            size_mib: default_shard_size_mib(),
            size_bytes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Number of concurrent upload workers.
    #[serde(default = "default_upload_workers")]
    pub workers: usize,
    /// Bound of the pending-job queue. Unset means twice the worker count.
    pub queue_depth: Option<usize>,
    /// Total attempts per shard, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Shards at or above this plaintext size start on the multipart tier.
    #[serde(default = "default_multi_threshold_mib")]
    pub multi_threshold_mib: u32,
    #[serde(default = "default_multi_part_size_mib")]
    pub multi_part_size_mib: u32,
    #[serde(default = "default_multi_connections")]
    pub multi_connections: usize,
    /// Escalate a single-request shard to the multipart tier after this many
    /// failed attempts.
    #[serde(default = "default_escalate_after")]
    pub escalate_after: u32,
}

impl UploadConfig {
    pub fn effective_queue_depth(&self) -> usize {
        self.queue_depth.unwrap_or(self.workers * 2).max(1)
    }

    pub fn multi_threshold_bytes(&self) -> u64 {
        self.multi_threshold_mib as u64 * 1024 * 1024
    }

    pub fn multi_part_size_bytes(&self) -> u64 {
        self.multi_part_size_mib as u64 * 1024 * 1024
    }

    /// Retry tuning for individual store requests, shared by the upload
    /// workers and the shard download path.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay_ms: self.retry_base_delay_ms,
            max_delay_ms: self.retry_max_delay_ms,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            workers: default_upload_workers(),
            queue_depth: None,
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            multi_threshold_mib: default_multi_threshold_mib(),
            multi_part_size_mib: default_multi_part_size_mib(),
            multi_connections: default_multi_connections(),
            escalate_after: default_escalate_after(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Fixed delay between manifest publish attempts. The publish loop does
    /// not back off and does not give up on its own.
    #[serde(default = "default_publish_retry_delay_ms")]
    pub publish_retry_delay_ms: u64,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            publish_retry_delay_ms: default_publish_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneConfig {
    /// Concurrent deletions while pruning orphaned objects.
    #[serde(default = "default_delete_workers")]
    pub delete_workers: usize,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            delete_workers: default_delete_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache whole-file SHA-1 digests keyed by path and mtime, so unchanged
    /// files are not re-hashed between runs.
    #[serde(default = "default_hash_cache")]
    pub hash_cache: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hash_cache: default_hash_cache(),
        }
    }
}

fn default_store_kind() -> String {
    "local".to_string()
}

fn default_session_margin_secs() -> i64 {
    60
}

fn default_encryption_mode() -> String {
    "aes256gcm".to_string()
}

fn default_algorithm() -> String {
    "lz4".to_string()
}

fn default_zstd_level() -> i32 {
    3
}

fn default_shard_size_mib() -> u32 {
    16
}

fn default_upload_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

fn default_multi_threshold_mib() -> u32 {
    64
}

fn default_multi_part_size_mib() -> u32 {
    8
}

fn default_multi_connections() -> usize {
    4
}

fn default_escalate_after() -> u32 {
    2
}

fn default_publish_retry_delay_ms() -> u64 {
    5_000
}

fn default_delete_workers() -> usize {
    4
}

fn default_hash_cache() -> bool {
    true
}

// --- Config resolution ---

/// Tracks where the config file was found.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Explicitly passed via `--config`.
    CliArg(PathBuf),
    /// Set via the `SKEP_CONFIG` env var.
    EnvVar(PathBuf),
    /// Found by searching standard locations.
    SearchOrder { path: PathBuf, level: &'static str },
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::CliArg(p) => p,
            ConfigSource::EnvVar(p) => p,
            ConfigSource::SearchOrder { path, .. } => path,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::CliArg(p) => write!(f, "{} (--config)", p.display()),
            ConfigSource::EnvVar(p) => write!(f, "{} (SKEP_CONFIG)", p.display()),
            ConfigSource::SearchOrder { path, level } => {
                write!(f, "{} ({})", path.display(), level)
            }
        }
    }
}

/// Returns search locations in priority order: project, user, system.
pub fn default_config_search_paths() -> Vec<(PathBuf, &'static str)> {
    let mut paths = vec![(PathBuf::from("skep.yaml"), "project")];

    // User config: $XDG_CONFIG_HOME/skep/config.yaml or ~/.config/skep/config.yaml
    let user_config = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|base| base.join("skep").join("config.yaml"));

    if let Some(p) = user_config {
        paths.push((p, "user"));
    }

    paths.push((PathBuf::from("/etc/skep/config.yaml"), "system"));

    paths
}

/// Resolve which config file to use.
///
/// Priority: CLI arg > `SKEP_CONFIG` env var > first existing file from the
/// search paths. Returns `None` if nothing is found.
pub fn resolve_config_path(cli_config: Option<&str>) -> Option<ConfigSource> {
    if let Some(path) = cli_config {
        return Some(ConfigSource::CliArg(PathBuf::from(path)));
    }

    if let Ok(val) = std::env::var("SKEP_CONFIG") {
        if !val.is_empty() {
            return Some(ConfigSource::EnvVar(PathBuf::from(val)));
        }
    }

    for (path, level) in default_config_search_paths() {
        if path.exists() {
            return Some(ConfigSource::SearchOrder { path, level });
        }
    }

    None
}

/// Load and parse a config file.
pub fn load_config(path: &Path) -> Result<SkepConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SkepError::Config(format!("cannot read '{}': {e}", path.display())))?;
    let config: SkepConfig = serde_yaml::from_str(&contents)
        .map_err(|e| SkepError::Config(format!("invalid config '{}': {e}", path.display())))?;
    Ok(config)
}

/// Returns a minimal YAML config suitable for bootstrapping. The caller
/// supplies a freshly generated hex salt.
pub fn minimal_config_template(salt_hex: &str) -> String {
    format!(
        r#"# skep configuration file

store:
  kind: local
  path: /path/to/store

encryption:
  mode: aes256gcm
  # passphrase: secret
  passphrase_env: SKEP_PASSPHRASE
  salt: "{salt_hex}"

# shard:
#   size_mib: 16

# upload:
#   workers: 4
#   max_attempts: 5

# compression:
#   algorithm: lz4
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    // Tests that mutate process-global state (env vars, CWD) must be serialized.
    static GLOBAL_STATE: Mutex<()> = Mutex::new(());

    #[test]
    fn search_paths_order() {
        let paths = default_config_search_paths();
        assert!(paths.len() >= 2);
        assert_eq!(paths[0].1, "project");
        assert_eq!(paths.last().unwrap().1, "system");
        if paths.len() == 3 {
            assert_eq!(paths[1].1, "user");
        }
    }

    #[test]
    fn resolve_cli_arg_wins() {
        let result = resolve_config_path(Some("/tmp/override.yaml"));
        let source = result.unwrap();
        assert!(matches!(source, ConfigSource::CliArg(_)));
        assert_eq!(source.path(), Path::new("/tmp/override.yaml"));
    }

    #[test]
    fn resolve_env_var() {
        let _lock = GLOBAL_STATE.lock().unwrap();
        let _guard = EnvGuard::set("SKEP_CONFIG", "/tmp/env-config.yaml");
        let result = resolve_config_path(None);
        let source = result.unwrap();
        assert!(matches!(source, ConfigSource::EnvVar(_)));
        assert_eq!(source.path(), Path::new("/tmp/env-config.yaml"));
    }

    #[test]
    fn resolve_search_finds_project() {
        let _lock = GLOBAL_STATE.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("skep.yaml");
        fs::write(&config_path, "store:\n  path: /tmp/store\n").unwrap();

        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let _env_guard = EnvGuard::set("SKEP_CONFIG", "");

        let result = resolve_config_path(None);
        std::env::set_current_dir(original).unwrap();

        let source = result.unwrap();
        assert!(matches!(
            source,
            ConfigSource::SearchOrder { level: "project", .. }
        ));
    }

    #[test]
    fn minimal_template_is_valid_yaml() {
        let template = minimal_config_template("00112233445566778899aabbccddeeff");
        let parsed: std::result::Result<SkepConfig, _> = serde_yaml::from_str(&template);
        assert!(
            parsed.is_ok(),
            "template should parse as valid YAML: {:?}",
            parsed.err()
        );
        let config = parsed.unwrap();
        assert_eq!(config.store.kind, "local");
        assert_eq!(config.encryption.mode, "aes256gcm");
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config: SkepConfig = serde_yaml::from_str("store:\n  path: /tmp/x\n").unwrap();
        assert_eq!(config.shard.size_mib, 16);
        assert_eq!(config.upload.workers, 4);
        assert_eq!(config.upload.effective_queue_depth(), 8);
        assert_eq!(config.manifest.publish_retry_delay_ms, 5_000);
        assert!(config.cache.hash_cache);
    }

    #[test]
    fn queue_depth_override_is_respected() {
        let config: SkepConfig =
            serde_yaml::from_str("store:\n  path: /tmp/x\nupload:\n  queue_depth: 3\n").unwrap();
        assert_eq!(config.upload.effective_queue_depth(), 3);
    }

    #[test]
    fn load_config_missing_file() {
        let result = load_config(Path::new("/nonexistent/path/config.yaml"));
        assert!(matches!(result, Err(SkepError::Config(_))));
    }

    /// RAII guard to set an env var and restore its previous value on drop.
    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, val: &str) -> Self {
            let prev = std::env::var(key).ok();
            // Env mutation is process-global; GLOBAL_STATE serializes callers.
            unsafe {
                std::env::set_var(key, val);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            unsafe {
                match &self.prev {
                    Some(v) => std::env::set_var(self.key, v),
                    None => std::env::remove_var(self.key),
                }
            }
        }
    }
}
