//! AES-256-GCM authenticated encryption.
//!
//! Uses AES-256-GCM with:
//! - 256-bit key
//! - 96-bit (12 byte) nonce, freshly generated per call
//! - 128-bit authentication tag, stored separately from the ciphertext
//!
//! Additional authenticated data (AAD) binds context into the ciphertext
//! without encrypting it; any AAD mismatch fails decryption.

use crate::crypto::{CryptoError, CryptoResult};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use serde::{Deserialize, Serialize};

/// Symmetric key size in bytes (256 bits).
pub const KEY_SIZE: usize = 32;
/// GCM nonce size in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;
/// GCM authentication tag size in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

/// An AEAD-sealed payload with its nonce and tag as separable fields.
///
/// `|ciphertext| == |plaintext|`; the tag is split off the combined
/// output so each component can be stored and transported independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
}

impl EncryptedData {
    /// Reassemble from raw parts, validating the fixed-size fields.
    pub fn from_parts(ciphertext: Vec<u8>, iv: &[u8], tag: &[u8]) -> CryptoResult<Self> {
        let iv: [u8; NONCE_SIZE] = iv.try_into().map_err(|_| CryptoError::WrongIvLength {
            expected: NONCE_SIZE,
            got: iv.len(),
        })?;
        let tag: [u8; TAG_SIZE] = tag.try_into().map_err(|_| CryptoError::WrongTagLength {
            expected: TAG_SIZE,
            got: tag.len(),
        })?;
        Ok(Self { ciphertext, iv, tag })
    }
}

/// Encrypt plaintext under a 256-bit key with a fresh random nonce.
///
/// Never reuses a nonce under the same key: the nonce is drawn from the
/// OS CSPRNG on every call.
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8], aad: &[u8]) -> CryptoResult<EncryptedData> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let nonce_bytes: [u8; NONCE_SIZE] = nonce.into();

    let combined = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadFailure)?;

    // aes-gcm appends the tag to the ciphertext
    if combined.len() < TAG_SIZE {
        return Err(CryptoError::AeadFailure);
    }
    let tag_start = combined.len() - TAG_SIZE;
    let tag: [u8; TAG_SIZE] = combined[tag_start..]
        .try_into()
        .map_err(|_| CryptoError::AeadFailure)?;

    Ok(EncryptedData {
        ciphertext: combined[..tag_start].to_vec(),
        iv: nonce_bytes,
        tag,
    })
}

/// Decrypt and verify an [`EncryptedData`].
///
/// The AAD must be byte-equal to what was supplied at encryption time.
/// Every failure path reports the same opaque [`CryptoError::AeadFailure`].
pub fn decrypt(key: &[u8; KEY_SIZE], data: &EncryptedData, aad: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    let nonce = Nonce::from(data.iv);

    let mut combined = Vec::with_capacity(data.ciphertext.len() + TAG_SIZE);
    combined.extend_from_slice(&data.ciphertext);
    combined.extend_from_slice(&data.tag);

    cipher
        .decrypt(&nonce, Payload { msg: &combined, aad })
        .map_err(|_| CryptoError::AeadFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random::random_key;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = random_key();
        let plaintext = b"login: alice / hunter2";

        let encrypted = encrypt(&key, plaintext, b"").unwrap();
        assert_eq!(encrypted.ciphertext.len(), plaintext.len());

        let decrypted = decrypt(&key, &encrypted, b"").unwrap();
        assert_eq!(plaintext.to_vec(), decrypted);
    }

    #[test]
    fn roundtrip_with_aad() {
        let key = random_key();
        let encrypted = encrypt(&key, b"payload", b"vault:42").unwrap();
        let decrypted = decrypt(&key, &encrypted, b"vault:42").unwrap();
        assert_eq!(decrypted, b"payload");
    }

    #[test]
    fn aad_mismatch_fails() {
        let key = random_key();
        let encrypted = encrypt(&key, b"payload", b"vault:42").unwrap();
        assert_eq!(
            decrypt(&key, &encrypted, b"vault:43").unwrap_err(),
            CryptoError::AeadFailure
        );
    }

    #[test]
    fn wrong_key_fails() {
        let key1 = random_key();
        let key2 = random_key();
        let encrypted = encrypt(&key1, b"secret", b"").unwrap();
        assert_eq!(
            decrypt(&key2, &encrypted, b"").unwrap_err(),
            CryptoError::AeadFailure
        );
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = random_key();
        let mut encrypted = encrypt(&key, b"original data", b"").unwrap();
        encrypted.ciphertext[0] ^= 0xFF;
        assert_eq!(
            decrypt(&key, &encrypted, b"").unwrap_err(),
            CryptoError::AeadFailure
        );
    }

    #[test]
    fn tampered_tag_fails() {
        let key = random_key();
        let mut encrypted = encrypt(&key, b"original data", b"").unwrap();
        encrypted.tag[15] ^= 0x01;
        assert_eq!(
            decrypt(&key, &encrypted, b"").unwrap_err(),
            CryptoError::AeadFailure
        );
    }

    #[test]
    fn nonces_are_unique() {
        let key = random_key();
        let a = encrypt(&key, b"same data", b"").unwrap();
        let b = encrypt(&key, b"same data", b"").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn no_nonce_repeats_across_many_encryptions() {
        let key = random_key();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            let encrypted = encrypt(&key, b"x", b"").unwrap();
            assert!(seen.insert(encrypted.iv), "nonce reused under the same key");
        }
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = random_key();
        let encrypted = encrypt(&key, b"", b"ctx").unwrap();
        assert!(encrypted.ciphertext.is_empty());
        assert_eq!(decrypt(&key, &encrypted, b"ctx").unwrap(), b"");
    }

    #[test]
    fn from_parts_validates_lengths() {
        assert!(matches!(
            EncryptedData::from_parts(vec![1, 2, 3], &[0u8; 11], &[0u8; 16]),
            Err(CryptoError::WrongIvLength { expected: 12, got: 11 })
        ));
        assert!(matches!(
            EncryptedData::from_parts(vec![1, 2, 3], &[0u8; 12], &[0u8; 15]),
            Err(CryptoError::WrongTagLength { expected: 16, got: 15 })
        ));
        assert!(EncryptedData::from_parts(vec![1, 2, 3], &[0u8; 12], &[0u8; 16]).is_ok());
    }
}
