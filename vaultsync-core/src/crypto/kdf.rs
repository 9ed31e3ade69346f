//! Argon2id key derivation for master password processing.

use crate::crypto::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

/// Minimum salt length in bytes.
pub const MIN_SALT_LEN: usize = 16;

/// Parameters for Argon2id key derivation.
///
/// The server stores whichever profile a client used and returns it
/// verbatim on retrieval; both the default and mobile profiles validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Time cost (iterations).
    pub time: u32,

    /// Memory cost in KiB.
    pub memory: u32,

    /// Parallelism (lanes).
    pub parallelism: u32,

    /// Output length in bytes.
    #[serde(rename = "keyLen")]
    pub key_len: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time: 3,
            memory: 64 * 1024, // 64 MiB
            parallelism: 2,
            key_len: 32,
        }
    }
}

impl KdfParams {
    /// Lighter profile for mobile devices.
    pub fn mobile() -> Self {
        Self {
            time: 2,
            memory: 32 * 1024, // 32 MiB
            parallelism: 2,
            key_len: 32,
        }
    }

    /// Check that parameters are within acceptable ranges.
    pub fn validate(&self) -> CryptoResult<()> {
        if self.time < 1 {
            return Err(CryptoError::InvalidKdfParams(
                "time must be at least 1".to_string(),
            ));
        }
        if self.memory < 8 * 1024 {
            return Err(CryptoError::InvalidKdfParams(
                "memory must be at least 8192 KiB".to_string(),
            ));
        }
        if self.parallelism < 1 {
            return Err(CryptoError::InvalidKdfParams(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if self.key_len < 16 {
            return Err(CryptoError::InvalidKdfParams(
                "key length must be at least 16 bytes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generate a random salt. Lengths below [`MIN_SALT_LEN`] are bumped to
/// the 32-byte default.
pub fn generate_salt(length: usize) -> Vec<u8> {
    let length = if length < MIN_SALT_LEN { 32 } else { length };
    crate::crypto::random::random_bytes(length)
}

/// Derive key material from a password using Argon2id.
///
/// Deterministic for a given `(password, salt, params)` triple; the raw
/// output is returned without any encoding.
pub fn derive_master_key(password: &str, salt: &[u8], params: &KdfParams) -> CryptoResult<Vec<u8>> {
    params.validate()?;
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::InvalidKdfParams(format!(
            "salt must be at least {} bytes",
            MIN_SALT_LEN
        )));
    }

    let argon_params = Params::new(
        params.memory,
        params.time,
        params.parallelism,
        Some(params.key_len as usize),
    )
    .map_err(|e| CryptoError::InvalidKdfParams(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = vec![0u8; params.key_len as usize];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut out)
        .map_err(|e| CryptoError::InvalidKdfParams(e.to_string()))?;

    Ok(out)
}
