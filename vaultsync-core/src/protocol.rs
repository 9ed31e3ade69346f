//! Canonical request-signing protocol.
//!
//! Every state-mutating request carries three headers:
//!
//! - `X-Device-Id`: UUID of the signing device
//! - `X-Device-Timestamp`: integer milliseconds since epoch
//! - `X-Device-Signature`: base64 of a 64-byte Ed25519 signature
//!
//! The signature covers the canonical message (pipe-delimited, no
//! trailing newline):
//!
//! ```text
//! METHOD|PATH|TIMESTAMP|BASE64(SHA-256(BODY))
//! ```
//!
//! Binding method and path defeats cross-endpoint replay; the body hash
//! defeats in-flight tampering; the timestamp window defeats long-delay
//! replay.

use crate::crypto::encoding::encode_base64;
use crate::crypto::signing;
use crate::crypto::CryptoResult;
use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};

/// Header carrying the signing device's UUID.
pub const DEVICE_ID_HEADER: &str = "x-device-id";
/// Header carrying the request timestamp in decimal milliseconds.
pub const TIMESTAMP_HEADER: &str = "x-device-timestamp";
/// Header carrying the base64 Ed25519 signature.
pub const SIGNATURE_HEADER: &str = "x-device-signature";

/// Acceptable clock skew between client and server, in milliseconds.
pub const SIGNATURE_WINDOW_MS: i64 = 300_000;

/// Build the canonical message for a request.
///
/// `path` is the request-URI path component only (no query string);
/// `body` is the raw request bytes as received, empty for empty bodies.
pub fn canonical_message(method: &str, path: &str, timestamp_ms: i64, body: &[u8]) -> String {
    let body_hash = encode_base64(&Sha256::digest(body));
    format!(
        "{}|{}|{}|{}",
        method.to_ascii_uppercase(),
        path,
        timestamp_ms,
        body_hash
    )
}

/// Sign a request with the device's Ed25519 key.
pub fn sign_request(
    signing_key: &SigningKey,
    method: &str,
    path: &str,
    timestamp_ms: i64,
    body: &[u8],
) -> [u8; 64] {
    let message = canonical_message(method, path, timestamp_ms, body);
    signing::sign(signing_key, message.as_bytes())
}

/// Recompute the canonical message and verify a signature against a
/// device public key.
pub fn verify_request(
    device_public: &[u8],
    method: &str,
    path: &str,
    timestamp_ms: i64,
    body: &[u8],
    signature: &[u8],
) -> CryptoResult<bool> {
    let message = canonical_message(method, path, timestamp_ms, body);
    signing::verify(device_public, message.as_bytes(), signature)
}

/// Whether a request timestamp is within the acceptance window of `now`.
pub fn timestamp_in_window(timestamp_ms: i64, now_ms: i64) -> bool {
    (now_ms - timestamp_ms).abs() <= SIGNATURE_WINDOW_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signing::generate_signing_key;

    #[test]
    fn canonical_message_format() {
        // SHA-256("") = e3b0c442..., base64 of the raw digest below.
        let msg = canonical_message("post", "/vaults/5/items", 1700000000000, b"");
        assert_eq!(
            msg,
            "POST|/vaults/5/items|1700000000000|47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn body_hash_changes_message() {
        let a = canonical_message("POST", "/p", 1, b"body-a");
        let b = canonical_message("POST", "/p", 1, b"body-b");
        assert_ne!(a, b);
    }

    #[test]
    fn sign_verify_roundtrip() {
        let key = generate_signing_key();
        let public = key.verifying_key().to_bytes();
        let body = br#"{"item_type":"login"}"#;

        let sig = sign_request(&key, "POST", "/vaults/5/items", 1700000000000, body);
        assert!(
            verify_request(&public, "POST", "/vaults/5/items", 1700000000000, body, &sig).unwrap()
        );
    }

    #[test]
    fn cross_endpoint_replay_fails() {
        let key = generate_signing_key();
        let public = key.verifying_key().to_bytes();
        let body = b"{}";

        let sig = sign_request(&key, "POST", "/vaults/5/items", 1700000000000, body);
        assert!(
            !verify_request(&public, "POST", "/vaults/6/items", 1700000000000, body, &sig).unwrap()
        );
        assert!(
            !verify_request(&public, "DELETE", "/vaults/5/items", 1700000000000, body, &sig)
                .unwrap()
        );
    }

    #[test]
    fn timestamp_mismatch_fails() {
        let key = generate_signing_key();
        let public = key.verifying_key().to_bytes();

        let sig = sign_request(&key, "POST", "/p", 1700000000000, b"");
        assert!(!verify_request(&public, "POST", "/p", 1700000000001, b"", &sig).unwrap());
    }

    #[test]
    fn window_check() {
        let now = 1_700_000_000_000;
        assert!(timestamp_in_window(now, now));
        assert!(timestamp_in_window(now - SIGNATURE_WINDOW_MS, now));
        assert!(timestamp_in_window(now + SIGNATURE_WINDOW_MS, now));
        assert!(!timestamp_in_window(now - SIGNATURE_WINDOW_MS - 1, now));
        assert!(!timestamp_in_window(now + SIGNATURE_WINDOW_MS + 1, now));
    }

    #[test]
    fn method_is_uppercased() {
        assert_eq!(
            canonical_message("delete", "/x", 5, b"abc"),
            canonical_message("DELETE", "/x", 5, b"abc")
        );
    }
}
