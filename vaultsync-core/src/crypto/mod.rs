//! Cryptographic primitives for the vault sync core.
//!
//! This module provides:
//! - AES-256-GCM authenticated encryption
//! - Argon2id key derivation
//! - HKDF-SHA256 key expansion
//! - Ed25519 signatures and X25519 key exchange
//! - CSPRNG helpers and base64 encoding

pub mod aead;
pub mod encoding;
pub mod exchange;
pub mod hkdf;
pub mod kdf;
pub mod random;
pub mod signing;

pub use aead::{decrypt, encrypt, EncryptedData};
pub use encoding::{decode_base64, encode_base64};
pub use kdf::{derive_master_key, generate_salt, KdfParams};

use thiserror::Error;

/// Errors that can occur in cryptographic operations.
///
/// `AeadFailure`, `UnwrapFailure`, and `KeyExchangeFailure` carry no detail:
/// wrong-key, tampered-ciphertext, and tampered-AAD cases are
/// indistinguishable to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("authenticated decryption failed")]
    AeadFailure,

    #[error("key unwrap failed")]
    UnwrapFailure,

    #[error("key exchange failed")]
    KeyExchangeFailure,

    #[error("invalid KDF parameters: {0}")]
    InvalidKdfParams(String),

    #[error("key must be {expected} bytes, got {got}")]
    WrongKeyLength { expected: usize, got: usize },

    #[error("IV must be {expected} bytes, got {got}")]
    WrongIvLength { expected: usize, got: usize },

    #[error("tag must be {expected} bytes, got {got}")]
    WrongTagLength { expected: usize, got: usize },

    #[error("signature must be {expected} bytes, got {got}")]
    WrongSignatureLength { expected: usize, got: usize },

    #[error("malformed base64")]
    MalformedBase64,

    #[error("invalid UUID")]
    InvalidUuid,
}

/// Result type for crypto operations.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
