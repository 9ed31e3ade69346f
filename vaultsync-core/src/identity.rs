//! Device identity: per-device signing and key-exchange keypairs.

use crate::crypto::encoding::encode_base64;
use crate::crypto::{exchange, signing};
use crate::protocol;
use ed25519_dalek::SigningKey;
use uuid::Uuid;
use x25519_dalek::{PublicKey, StaticSecret};

/// A device identity: Ed25519 signing keypair for request authentication
/// and X25519 keypair for share key exchange.
///
/// The public halves are submitted at enrollment and are immutable for
/// the life of the device; the private halves never leave the device.
pub struct DeviceIdentity {
    pub device_id: Uuid,
    pub label: String,
    signing_key: SigningKey,
    exchange_secret: StaticSecret,
}

impl DeviceIdentity {
    /// Generate a new identity with fresh keypairs.
    pub fn generate(label: &str) -> Self {
        let (exchange_secret, _) = exchange::generate_keypair();
        Self {
            device_id: Uuid::new_v4(),
            label: label.to_string(),
            signing_key: signing::generate_signing_key(),
            exchange_secret,
        }
    }

    /// Rebuild an identity from stored private key material.
    pub fn from_parts(
        device_id: Uuid,
        label: &str,
        signing_secret: [u8; 32],
        exchange_secret: [u8; 32],
    ) -> Self {
        Self {
            device_id,
            label: label.to_string(),
            signing_key: SigningKey::from_bytes(&signing_secret),
            exchange_secret: StaticSecret::from(exchange_secret),
        }
    }

    /// Ed25519 public key bytes (32 bytes).
    pub fn ed25519_public(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// X25519 public key bytes (32 bytes).
    pub fn x25519_public(&self) -> [u8; 32] {
        PublicKey::from(&self.exchange_secret).to_bytes()
    }

    /// The X25519 secret, for share wrapping.
    pub fn exchange_secret(&self) -> &StaticSecret {
        &self.exchange_secret
    }

    /// Sign an arbitrary message (e.g. an enrollment challenge).
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        signing::sign(&self.signing_key, message)
    }

    /// Produce the three signing-protocol header values for a request.
    ///
    /// Returns `(device_id, timestamp, signature)` rendered exactly as
    /// they go on the wire.
    pub fn signed_headers(
        &self,
        method: &str,
        path: &str,
        timestamp_ms: i64,
        body: &[u8],
    ) -> (String, String, String) {
        let signature = protocol::sign_request(&self.signing_key, method, path, timestamp_ms, body);
        (
            self.device_id.to_string(),
            timestamp_ms.to_string(),
            encode_base64(&signature),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::decode_base64;

    #[test]
    fn generated_identity_has_valid_keys() {
        let identity = DeviceIdentity::generate("Test Laptop");
        assert_eq!(identity.label, "Test Laptop");
        assert_eq!(identity.ed25519_public().len(), 32);
        assert_eq!(identity.x25519_public().len(), 32);
    }

    #[test]
    fn identities_are_distinct() {
        let a = DeviceIdentity::generate("A");
        let b = DeviceIdentity::generate("B");
        assert_ne!(a.device_id, b.device_id);
        assert_ne!(a.ed25519_public(), b.ed25519_public());
        assert_ne!(a.x25519_public(), b.x25519_public());
    }

    #[test]
    fn from_parts_roundtrip_preserves_publics() {
        let original = DeviceIdentity::generate("Phone");
        let restored = DeviceIdentity::from_parts(
            original.device_id,
            &original.label,
            original.signing_key.to_bytes(),
            original.exchange_secret.to_bytes(),
        );
        assert_eq!(original.ed25519_public(), restored.ed25519_public());
        assert_eq!(original.x25519_public(), restored.x25519_public());
    }

    #[test]
    fn signed_headers_verify() {
        let identity = DeviceIdentity::generate("Laptop");
        let body = b"request body";
        let (id, ts, sig) = identity.signed_headers("POST", "/vaults/5/items", 1700000000000, body);

        assert_eq!(id, identity.device_id.to_string());
        assert_eq!(ts, "1700000000000");

        let sig_bytes = decode_base64(&sig).unwrap();
        assert!(protocol::verify_request(
            &identity.ed25519_public(),
            "POST",
            "/vaults/5/items",
            1700000000000,
            body,
            &sig_bytes,
        )
        .unwrap());
    }

    #[test]
    fn challenge_signature_verifies() {
        let identity = DeviceIdentity::generate("Laptop");
        let challenge = crate::crypto::random::random_challenge();
        let signature = identity.sign(&challenge);
        assert!(
            crate::crypto::signing::verify(&identity.ed25519_public(), &challenge, &signature)
                .unwrap()
        );
    }
}
