//! VaultSync Server
//!
//! A zero-knowledge synchronization server for encrypted secret vaults.
//! The server stores only ciphertexts, public keys, and signatures; all
//! plaintext encryption and decryption happen on user devices.

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod storage;
pub mod sync;

pub use config::ServerConfig;
pub use error::ApiError;
pub use server::build_router;
pub use storage::Storage;
