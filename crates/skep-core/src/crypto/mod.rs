pub mod aes_gcm;
pub mod key;

use std::sync::Arc;

use skep_types::{Result, SkepError};

use crate::config::EncryptionConfig;
use aes_gcm::Aes256GcmEngine;
use key::MasterKey;

/// Blob categories bound into the AEAD as associated data, so a shard
/// ciphertext can never be passed off as a manifest or vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Manifest,
    Shard,
}

impl BlobKind {
    pub fn aad(self) -> &'static [u8] {
        match self {
            BlobKind::Manifest => b"skep:manifest",
            BlobKind::Shard => b"skep:shard",
        }
    }
}

/// Trait for encrypting and decrypting stored blobs.
pub trait CryptoEngine: Send + Sync {
    /// Encrypt plaintext. Returns `[nonce][ciphertext+tag]`.
    /// `aad` is authenticated but not encrypted.
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt data produced by `encrypt`.
    /// `aad` must match what was passed during encryption.
    fn decrypt(&self, data: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// Whether this engine actually encrypts data.
    /// `PlaintextEngine` returns false; real ciphers return true.
    fn is_encrypting(&self) -> bool;
}

/// No-encryption engine for `encryption.mode: none`.
pub struct PlaintextEngine;

impl CryptoEngine for PlaintextEngine {
    fn encrypt(&self, plaintext: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, data: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn is_encrypting(&self) -> bool {
        false
    }
}

/// Build the crypto engine named by the config.
pub fn engine_from_config(cfg: &EncryptionConfig) -> Result<Arc<dyn CryptoEngine>> {
    match cfg.mode.as_str() {
        "none" => Ok(Arc::new(PlaintextEngine)),
        "aes256gcm" => {
            let passphrase = resolve_passphrase(cfg)?;
            let salt_hex = cfg.salt.as_deref().ok_or_else(|| {
                SkepError::Config("encryption.salt is required for aes256gcm mode".into())
            })?;
            let salt = hex::decode(salt_hex)
                .map_err(|e| SkepError::Config(format!("encryption.salt is not valid hex: {e}")))?;
            let master = MasterKey::derive(&passphrase, &salt)?;
            Ok(Arc::new(Aes256GcmEngine::new(&master)))
        }
        other => Err(SkepError::Config(format!(
            "unknown encryption mode: '{other}' (expected 'aes256gcm' or 'none')"
        ))),
    }
}

fn resolve_passphrase(cfg: &EncryptionConfig) -> Result<String> {
    if let Some(p) = &cfg.passphrase {
        return Ok(p.clone());
    }
    if let Some(var) = &cfg.passphrase_env {
        return match std::env::var(var) {
            Ok(v) if !v.is_empty() => Ok(v),
            _ => Err(SkepError::Config(format!(
                "encryption.passphrase_env names '{var}' but it is not set"
            ))),
        };
    }
    Err(SkepError::Config(
        "encryption.mode is aes256gcm but neither passphrase nor passphrase_env is configured"
            .into(),
    ))
}
