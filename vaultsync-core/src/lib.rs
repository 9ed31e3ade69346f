//! VaultSync Core Library
//!
//! Client-side cryptographic core for the VaultSync zero-knowledge vault
//! synchronization system:
//!
//! - Cryptographic primitives (AES-256-GCM, Argon2id, HKDF-SHA256,
//!   Ed25519, X25519)
//! - The key hierarchy: password → master key → wrapping key → vault
//!   encryption key → item encryption key
//! - Key wrapping for storage and ECDH-based sharing
//! - Device identity and the canonical request-signing protocol
//!
//! The server never sees anything produced here except ciphertexts,
//! public keys, and signatures.

pub mod crypto;
pub mod identity;
pub mod keyring;
pub mod protocol;

pub use crypto::{CryptoError, CryptoResult};
pub use crypto::aead::EncryptedData;
pub use crypto::kdf::KdfParams;
pub use identity::DeviceIdentity;
pub use keyring::{MasterKey, VaultKey};
