//! Hashing and signing primitives
//!
//! Every digest in the protocol is SHA-256 rendered as lowercase hex.

pub mod canonical;
pub mod keys;
pub mod merkle;

use sha2::{Digest, Sha256};

/// SHA-256 digest of `data` as lowercase hex (64 chars).
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Raw 32-byte SHA-256 digest.
pub fn sha256_bytes(data: impl AsRef<[u8]>) -> [u8; 32] {
    Sha256::digest(data.as_ref()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_lowercase_64_chars() {
        let h = sha256_hex("meridian");
        assert_eq!(h.len(), 64);
        assert_eq!(h, h.to_lowercase());
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
