use argon2::Argon2;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use skep_types::{Result, SkepError};

// Argon2id parameters: 64 MiB memory, 3 passes, 4 lanes.
const KDF_MEMORY_COST: u32 = 65_536;
const KDF_TIME_COST: u32 = 3;
const KDF_PARALLELISM: u32 = 4;

pub const MIN_SALT_LEN: usize = 16;

/// 32-byte encryption key derived from the configured passphrase.
/// Zeroed on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; 32],
}

impl MasterKey {
    /// Derive the key from a passphrase with Argon2id. The salt comes from
    /// config and must be shared by every client of the same store, or they
    /// cannot read each other's manifest.
    pub fn derive(passphrase: &str, salt: &[u8]) -> Result<Self> {
        if salt.len() < MIN_SALT_LEN {
            return Err(SkepError::Config(format!(
                "encryption salt must be at least {MIN_SALT_LEN} bytes, got {}",
                salt.len()
            )));
        }
        let params = argon2::Params::new(KDF_MEMORY_COST, KDF_TIME_COST, KDF_PARALLELISM, Some(32))
            .map_err(|e| SkepError::KeyDerivation(format!("argon2 params: {e}")))?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut output = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, output.as_mut())
            .map_err(|e| SkepError::KeyDerivation(format!("argon2 hash: {e}")))?;
        Ok(Self { key: *output })
    }

    pub fn from_raw(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.key
    }
}
