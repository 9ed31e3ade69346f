//! Base64 helpers for wire blobs.
//!
//! All byte blobs on the wire use standard base64 with padding.

use crate::crypto::{CryptoError, CryptoResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encode bytes as standard padded base64.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard padded base64.
pub fn decode_base64(encoded: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|_| CryptoError::MalformedBase64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"\x00\x01\xfe\xffbinary";
        assert_eq!(decode_base64(&encode_base64(data)).unwrap(), data);
    }

    #[test]
    fn uses_standard_alphabet_with_padding() {
        assert_eq!(encode_base64(b"\xfb\xff"), "+/8=");
    }

    #[test]
    fn rejects_url_safe_and_garbage() {
        assert!(decode_base64("-_8=").is_err());
        assert!(decode_base64("not base64!!").is_err());
    }
}
