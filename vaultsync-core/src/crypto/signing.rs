//! Ed25519 signatures for device authentication.

use crate::crypto::{CryptoError, CryptoResult};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;

/// Ed25519 public key size in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Ed25519 signature size in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Generate a fresh Ed25519 signing key from the OS CSPRNG.
pub fn generate_signing_key() -> SigningKey {
    let mut secret = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    SigningKey::from_bytes(&secret)
}

/// Sign a message, returning the 64-byte signature.
pub fn sign(signing_key: &SigningKey, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    signing_key.sign(message).to_bytes()
}

/// Verify a signature over a message.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> CryptoResult<bool> {
    let verifying_key = parse_public_key(public_key)?;
    let sig_bytes: [u8; SIGNATURE_SIZE] =
        signature
            .try_into()
            .map_err(|_| CryptoError::WrongSignatureLength {
                expected: SIGNATURE_SIZE,
                got: signature.len(),
            })?;
    let signature = Signature::from_bytes(&sig_bytes);
    Ok(verifying_key.verify(message, &signature).is_ok())
}

/// Parse and validate a 32-byte Ed25519 public key.
pub fn parse_public_key(bytes: &[u8]) -> CryptoResult<VerifyingKey> {
    let key_bytes: [u8; PUBLIC_KEY_SIZE] =
        bytes.try_into().map_err(|_| CryptoError::WrongKeyLength {
            expected: PUBLIC_KEY_SIZE,
            got: bytes.len(),
        })?;
    VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::WrongKeyLength {
        expected: PUBLIC_KEY_SIZE,
        got: bytes.len(),
    })
}

/// Validate that a byte slice has Ed25519 public key length.
pub fn validate_public_key(bytes: &[u8]) -> CryptoResult<()> {
    parse_public_key(bytes).map(|_| ())
}

/// Validate that a byte slice has Ed25519 signature length.
pub fn validate_signature(bytes: &[u8]) -> CryptoResult<()> {
    if bytes.len() != SIGNATURE_SIZE {
        return Err(CryptoError::WrongSignatureLength {
            expected: SIGNATURE_SIZE,
            got: bytes.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let key = generate_signing_key();
        let public = key.verifying_key().to_bytes();
        let message = b"canonical message bytes";

        let signature = sign(&key, message);
        assert_eq!(signature.len(), SIGNATURE_SIZE);
        assert!(verify(&public, message, &signature).unwrap());
    }

    #[test]
    fn single_byte_mutation_fails_verification() {
        let key = generate_signing_key();
        let public = key.verifying_key().to_bytes();
        let message = b"POST|/vaults/5/items|1700000000000|abc=";
        let signature = sign(&key, message);

        for i in 0..message.len() {
            let mut mutated = message.to_vec();
            mutated[i] ^= 0x01;
            assert!(
                !verify(&public, &mutated, &signature).unwrap(),
                "mutation at byte {} should fail",
                i
            );
        }
    }

    #[test]
    fn wrong_key_fails_verification() {
        let key = generate_signing_key();
        let other = generate_signing_key();
        let message = b"message";
        let signature = sign(&key, message);
        assert!(!verify(&other.verifying_key().to_bytes(), message, &signature).unwrap());
    }

    #[test]
    fn length_validation() {
        assert!(validate_public_key(&[0u8; 31]).is_err());
        assert!(validate_signature(&[0u8; 63]).is_err());
        assert!(validate_signature(&[0u8; 64]).is_ok());
    }

    #[test]
    fn distinct_keys_generated() {
        let a = generate_signing_key();
        let b = generate_signing_key();
        assert_ne!(a.to_bytes(), b.to_bytes());
    }
}
