//! An opened store plus the decoded manifest: the context every command
//! works against. Commands receive a `&mut Vault`; there is no global
//! state and no background machinery beyond what a command starts itself.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use skep_store::{LocalStore, MemoryStore, ObjectMeta, RemoteStore};
use skep_types::{CancelFlag, Result, SkepError};

use crate::compress::{self, Compression};
use crate::config::SkepConfig;
use crate::crypto::{engine_from_config, BlobKind, CryptoEngine};
use crate::manifest::{FileManifest, MANIFEST_OBJECT_NAME};

/// Compress, then encrypt one shard payload for transmission.
pub fn encode_shard_payload(
    compression: Compression,
    crypto: &dyn CryptoEngine,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let packed = compress::compress(compression, plaintext)?;
    crypto.encrypt(&packed, BlobKind::Shard.aad())
}

/// Inverse of [`encode_shard_payload`]. `plaintext_len`, when known from
/// the manifest, sizes the decompression buffer up front.
pub fn decode_shard_payload(
    crypto: &dyn CryptoEngine,
    data: &[u8],
    plaintext_len: Option<usize>,
) -> Result<Vec<u8>> {
    let packed = crypto.decrypt(data, BlobKind::Shard.aad())?;
    compress::decompress_with_hint(&packed, plaintext_len)
}

/// Build the store backend named by the config.
pub fn store_from_config(config: &SkepConfig) -> Result<Arc<dyn RemoteStore>> {
    match config.store.kind.as_str() {
        "local" => {
            let path = config.store.path.as_deref().ok_or_else(|| {
                SkepError::Config("store.path is required for the local store".into())
            })?;
            Ok(Arc::new(LocalStore::open(
                std::path::Path::new(path),
                config.store.session_margin_secs,
            )?))
        }
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(SkepError::Config(format!("unknown store kind: {other:?}"))),
    }
}

/// A handle to an opened vault.
pub struct Vault {
    pub store: Arc<dyn RemoteStore>,
    pub crypto: Arc<dyn CryptoEngine>,
    pub compression: Compression,
    pub config: SkepConfig,
    pub manifest: FileManifest,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("compression", &self.compression)
            .field("config", &self.config)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Open the vault described by `config`: build the store and crypto
    /// engine, then fetch and decode the newest published manifest. A store
    /// with no manifest yet opens empty.
    pub fn open(config: SkepConfig) -> Result<Self> {
        let store = store_from_config(&config)?;
        Self::open_with_store(config, store)
    }

    /// Like [`Vault::open`], but against a caller-supplied store. Lets tests
    /// and embedders inject their own backend.
    pub fn open_with_store(config: SkepConfig, store: Arc<dyn RemoteStore>) -> Result<Self> {
        let crypto: Arc<dyn CryptoEngine> = engine_from_config(&config.encryption)?;
        let compression =
            Compression::from_config(&config.compression.algorithm, config.compression.zstd_level)?;

        let objects = store.list_objects(false)?;
        let manifest = match objects.iter().find(|o| o.name == MANIFEST_OBJECT_NAME) {
            Some(meta) => {
                let data = store.download(&meta.id)?;
                let manifest = FileManifest::decode(&data, crypto.as_ref())?;
                debug!(
                    files = manifest.file_count(),
                    encoded_len = data.len(),
                    "loaded manifest"
                );
                manifest
            }
            None => {
                info!("no manifest in store; starting empty");
                FileManifest::new()
            }
        };

        Ok(Vault {
            store,
            crypto,
            compression,
            config,
            manifest,
        })
    }

    /// One publish attempt. `Ok(true)` means the manifest is durably stored;
    /// `Ok(false)` means a transient store failure worth retrying. Permanent
    /// failures (bad credentials, encoding bugs) surface as `Err`.
    pub fn try_publish_manifest(&self) -> Result<bool> {
        let encoded = self
            .manifest
            .encode(self.compression, self.crypto.as_ref())?;
        match self.store.upload_single(MANIFEST_OBJECT_NAME, &encoded) {
            Ok(meta) => {
                debug!(
                    files = self.manifest.file_count(),
                    encoded_len = encoded.len(),
                    version_id = %meta.id,
                    "published manifest"
                );
                Ok(true)
            }
            Err(err) if err.is_transient() => {
                warn!(error = %err, "manifest publish failed; will retry");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Publish, retrying transient failures at a fixed delay until the
    /// manifest lands or the run is cancelled. The manifest is the source
    /// of truth, so there is no attempt cap here.
    pub fn publish_manifest_with_retry(&self, cancel: &CancelFlag) -> Result<()> {
        let delay = Duration::from_millis(self.config.manifest.publish_retry_delay_ms);
        loop {
            cancel.check()?;
            if self.try_publish_manifest()? {
                return Ok(());
            }
            if !cancel.sleep(delay) {
                return Err(SkepError::Cancelled);
            }
        }
    }

    /// Newest version of every object in the store, including the manifest
    /// object. Shard object names parse as UUIDs; the manifest name does not.
    pub fn newest_objects(&self) -> Result<Vec<ObjectMeta>> {
        self.store.list_objects(false)
    }
}
