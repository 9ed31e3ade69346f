//! Key hierarchy and wrapping.
//!
//! Implements the derivation chain
//!
//! ```text
//! MK  = Argon2id(password, kdf_salt, kdf_params)
//! WK  = HKDF-Expand(MK,  info = "wrap-vek")
//! VEK = random 32 bytes
//! IEK = HKDF-Expand(VEK, info = "item-key:<item_id>")
//! SSK = HKDF-Expand(X25519(our_priv, their_pub), info = "share-vek:<vault_id>")
//! ```
//!
//! and the three wrapping operations built on it: VEK wrapping for
//! storage, per-item sealing, and ECDH-based wrapping for sharing.
//! The info strings must stay bit-identical across implementations or
//! sharing between clients breaks.

use crate::crypto::aead::{self, EncryptedData, KEY_SIZE};
use crate::crypto::{exchange, hkdf, kdf, random, CryptoError, CryptoResult, KdfParams};
use uuid::Uuid;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

const WRAP_VEK_INFO: &[u8] = b"wrap-vek";
const ITEM_KEY_PREFIX: &str = "item-key:";
const SHARE_KEY_PREFIX: &str = "share-vek:";

/// The master key derived from the user's password.
///
/// Never persisted; zeroized on drop.
pub struct MasterKey {
    key: [u8; KEY_SIZE],
}

impl MasterKey {
    /// Derive from a password via Argon2id.
    pub fn derive(password: &str, salt: &[u8], params: &KdfParams) -> CryptoResult<Self> {
        let mut raw = Zeroizing::new(kdf::derive_master_key(password, salt, params)?);
        if raw.len() < KEY_SIZE {
            return Err(CryptoError::InvalidKdfParams(
                "key length below 32 bytes cannot back a master key".to_string(),
            ));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&raw[..KEY_SIZE]);
        raw.zeroize();
        Ok(Self { key })
    }

    pub fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Derive the wrapping key used to seal VEKs.
    fn wrapping_key(&self) -> CryptoResult<Zeroizing<[u8; KEY_SIZE]>> {
        Ok(Zeroizing::new(hkdf::derive_key(&self.key, WRAP_VEK_INFO)?))
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey").field("key", &"[REDACTED]").finish()
    }
}

/// A vault encryption key: random per vault, client-generated.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct VaultKey {
    key: [u8; KEY_SIZE],
}

impl VaultKey {
    /// Generate a fresh random VEK.
    pub fn generate() -> Self {
        Self {
            key: random::random_key(),
        }
    }

    pub fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Derive the item encryption key for one item.
    fn item_key(&self, item_id: &Uuid) -> CryptoResult<Zeroizing<[u8; KEY_SIZE]>> {
        // Lowercase hyphenated rendering; uuid's Display already is.
        let info = format!("{}{}", ITEM_KEY_PREFIX, item_id);
        Ok(Zeroizing::new(hkdf::derive_key(&self.key, info.as_bytes())?))
    }
}

impl Drop for VaultKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey").field("key", &"[REDACTED]").finish()
    }
}

/// Seal a VEK under the wrapping key derived from the master key.
pub fn wrap_vek(master: &MasterKey, vek: &VaultKey, aad: &[u8]) -> CryptoResult<EncryptedData> {
    let wk = master.wrapping_key()?;
    aead::encrypt(&wk, vek.as_bytes(), aad)
}

/// Unseal a wrapped VEK.
///
/// Any failure, including a wrong password upstream, reports the uniform
/// [`CryptoError::UnwrapFailure`].
pub fn unwrap_vek(master: &MasterKey, wrapped: &EncryptedData, aad: &[u8]) -> CryptoResult<VaultKey> {
    let wk = master.wrapping_key().map_err(|_| CryptoError::UnwrapFailure)?;
    let raw = Zeroizing::new(aead::decrypt(&wk, wrapped, aad).map_err(|_| CryptoError::UnwrapFailure)?);
    let key: [u8; KEY_SIZE] = raw
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::UnwrapFailure)?;
    Ok(VaultKey::from_bytes(key))
}

/// Seal an item's plaintext under its derived item key.
///
/// The item id is bound into the key rather than the AAD, so swapping two
/// items' ciphertexts fails decryption even when their AAD matches.
pub fn seal_item(
    vek: &VaultKey,
    item_id: &Uuid,
    plaintext: &[u8],
    aad: &[u8],
) -> CryptoResult<EncryptedData> {
    let iek = vek.item_key(item_id)?;
    aead::encrypt(&iek, plaintext, aad)
}

/// Open a sealed item.
pub fn open_item(
    vek: &VaultKey,
    item_id: &Uuid,
    sealed: &EncryptedData,
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    let iek = vek.item_key(item_id).map_err(|_| CryptoError::UnwrapFailure)?;
    aead::decrypt(&iek, sealed, aad).map_err(|_| CryptoError::UnwrapFailure)
}

/// Derive the pairwise sharing key for a vault.
fn share_key(
    our_secret: &StaticSecret,
    their_public: &PublicKey,
    vault_id: i64,
) -> CryptoResult<Zeroizing<[u8; KEY_SIZE]>> {
    let info = format!("{}{}", SHARE_KEY_PREFIX, vault_id);
    Ok(Zeroizing::new(exchange::derive_shared_key(
        our_secret,
        their_public,
        info.as_bytes(),
    )?))
}

/// Wrap a key (VEK or IEK) for a recipient device using ECDH.
///
/// The server never performs this derivation; it relays the sealed blob.
pub fn wrap_for_share(
    our_secret: &StaticSecret,
    their_public: &PublicKey,
    vault_id: i64,
    key_to_share: &[u8],
    aad: &[u8],
) -> CryptoResult<EncryptedData> {
    let ssk = share_key(our_secret, their_public, vault_id)?;
    aead::encrypt(&ssk, key_to_share, aad)
}

/// Unwrap a key received through a share.
pub fn unwrap_from_share(
    our_secret: &StaticSecret,
    their_public: &PublicKey,
    vault_id: i64,
    wrapped: &EncryptedData,
    aad: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let ssk = share_key(our_secret, their_public, vault_id).map_err(|_| CryptoError::UnwrapFailure)?;
    let key = aead::decrypt(&ssk, wrapped, aad).map_err(|_| CryptoError::UnwrapFailure)?;
    Ok(Zeroizing::new(key))
}
