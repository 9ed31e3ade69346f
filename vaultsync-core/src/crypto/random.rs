//! CSPRNG helpers.

use rand::rngs::OsRng;
use rand::RngCore;

/// Size of a device enrollment challenge in bytes.
pub const CHALLENGE_SIZE: usize = 32;

/// Fill a fresh buffer of `len` bytes from the OS CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Generate a random 256-bit key.
pub fn random_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random 32-byte challenge.
pub fn random_challenge() -> [u8; CHALLENGE_SIZE] {
    let mut challenge = [0u8; CHALLENGE_SIZE];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_lengths() {
        assert_eq!(random_bytes(0).len(), 0);
        assert_eq!(random_bytes(16).len(), 16);
        assert_eq!(random_bytes(64).len(), 64);
    }

    #[test]
    fn outputs_differ() {
        assert_ne!(random_key(), random_key());
        assert_ne!(random_challenge(), random_challenge());
    }
}
