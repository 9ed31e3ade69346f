//! HKDF-SHA256 key expansion with explicit domain-separation info strings.

use crate::crypto::{CryptoError, CryptoResult};
use hkdf::Hkdf;
use sha2::Sha256;

/// Maximum HKDF-SHA256 output length (255 blocks).
pub const MAX_OUTPUT_LEN: usize = 255 * 32;

/// Extract-and-expand with an empty salt and the given info string.
///
/// Distinct info strings enforce domain separation: a compromise of one
/// derived key does not imply another. Callers across implementations
/// must produce bit-identical info strings or key agreement breaks.
pub fn derive(secret: &[u8], info: &[u8], out_len: usize) -> CryptoResult<Vec<u8>> {
    if out_len == 0 || out_len > MAX_OUTPUT_LEN {
        return Err(CryptoError::InvalidKdfParams(format!(
            "HKDF output length must be in 1..={}",
            MAX_OUTPUT_LEN
        )));
    }

    let hk = Hkdf::<Sha256>::new(None, secret);
    let mut out = vec![0u8; out_len];
    hk.expand(info, &mut out)
        .map_err(|_| CryptoError::InvalidKdfParams("HKDF expand failed".to_string()))?;
    Ok(out)
}

/// Derive a 32-byte key; the common case for this key hierarchy.
pub fn derive_key(secret: &[u8], info: &[u8]) -> CryptoResult<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, secret);
    let mut out = [0u8; 32];
    hk.expand(info, &mut out)
        .map_err(|_| CryptoError::InvalidKdfParams("HKDF expand failed".to_string()))?;
    Ok(out)
}
