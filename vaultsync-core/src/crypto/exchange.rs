//! X25519 key exchange for pairwise sharing.

use crate::crypto::{hkdf, CryptoError, CryptoResult};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

/// X25519 key size in bytes (both public and private).
pub const X25519_KEY_SIZE: usize = 32;

/// Generate a fresh X25519 keypair.
pub fn generate_keypair() -> (StaticSecret, PublicKey) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    (secret, public)
}

/// Parse a 32-byte X25519 public key.
pub fn parse_public_key(bytes: &[u8]) -> CryptoResult<PublicKey> {
    let key_bytes: [u8; X25519_KEY_SIZE] =
        bytes.try_into().map_err(|_| CryptoError::WrongKeyLength {
            expected: X25519_KEY_SIZE,
            got: bytes.len(),
        })?;
    Ok(PublicKey::from(key_bytes))
}

/// Validate that a byte slice has X25519 public key length.
pub fn validate_public_key(bytes: &[u8]) -> CryptoResult<()> {
    parse_public_key(bytes).map(|_| ())
}

/// Compute the raw ECDH shared secret.
///
/// Rejects the all-zero output produced by low-order public keys; callers
/// see only the opaque [`CryptoError::KeyExchangeFailure`].
pub fn shared_secret(our_secret: &StaticSecret, their_public: &PublicKey) -> CryptoResult<[u8; 32]> {
    let shared = our_secret.diffie_hellman(their_public);
    let bytes = *shared.as_bytes();
    if bytes.iter().all(|&b| b == 0) {
        return Err(CryptoError::KeyExchangeFailure);
    }
    Ok(bytes)
}

/// Derive a 32-byte symmetric key from an ECDH exchange, bound to a
/// domain-separation info string.
///
/// Symmetric in the participants: `derive_shared_key(a, B, info) ==
/// derive_shared_key(b, A, info)`.
pub fn derive_shared_key(
    our_secret: &StaticSecret,
    their_public: &PublicKey,
    info: &[u8],
) -> CryptoResult<[u8; 32]> {
    let secret = shared_secret(our_secret, their_public)?;
    hkdf::derive_key(&secret, info).map_err(|_| CryptoError::KeyExchangeFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_is_symmetric() {
        let (alice_secret, alice_public) = generate_keypair();
        let (bob_secret, bob_public) = generate_keypair();

        let ab = shared_secret(&alice_secret, &bob_public).unwrap();
        let ba = shared_secret(&bob_secret, &alice_public).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn derived_keys_match_for_both_parties() {
        let (alice_secret, alice_public) = generate_keypair();
        let (bob_secret, bob_public) = generate_keypair();

        let a = derive_shared_key(&alice_secret, &bob_public, b"share-vek:7").unwrap();
        let b = derive_shared_key(&bob_secret, &alice_public, b"share-vek:7").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn info_separates_derived_keys() {
        let (alice_secret, _) = generate_keypair();
        let (_, bob_public) = generate_keypair();

        let a = derive_shared_key(&alice_secret, &bob_public, b"share-vek:7").unwrap();
        let b = derive_shared_key(&alice_secret, &bob_public, b"share-vek:8").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn third_party_derives_different_key() {
        let (alice_secret, alice_public) = generate_keypair();
        let (_, bob_public) = generate_keypair();
        let (eve_secret, _) = generate_keypair();

        let alice_bob = derive_shared_key(&alice_secret, &bob_public, b"share-vek:1").unwrap();
        let eve_alice = derive_shared_key(&eve_secret, &alice_public, b"share-vek:1").unwrap();
        let eve_bob = derive_shared_key(&eve_secret, &bob_public, b"share-vek:1").unwrap();
        assert_ne!(alice_bob, eve_alice);
        assert_ne!(alice_bob, eve_bob);
    }

    #[test]
    fn low_order_public_key_rejected() {
        let (secret, _) = generate_keypair();
        let identity = PublicKey::from([0u8; 32]);
        assert_eq!(
            shared_secret(&secret, &identity).unwrap_err(),
            CryptoError::KeyExchangeFailure
        );
    }

    #[test]
    fn public_key_length_validated() {
        assert!(parse_public_key(&[0u8; 31]).is_err());
        assert!(parse_public_key(&[1u8; 32]).is_ok());
    }
}
