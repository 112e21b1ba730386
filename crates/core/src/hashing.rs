//! Payload integrity checksums.
//!
//! Every payload is stored together with the SHA-256 hex digest of its raw
//! bytes. The API checks the client-supplied digest at submission and the
//! worker checks it again before decoding.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const CHECKSUM_LEN: usize = 64;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Check `data` against an expected hex digest (case-insensitive).
pub fn verify_checksum(data: &[u8], expected: &str) -> bool {
    expected.len() == CHECKSUM_LEN && sha256_hex(data).eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn verify_accepts_uppercase_digest() {
        let digest = sha256_hex(b"payload").to_uppercase();
        assert!(verify_checksum(b"payload", &digest));
    }

    #[test]
    fn verify_rejects_other_data_and_short_digests() {
        let digest = sha256_hex(b"payload");
        assert!(!verify_checksum(b"tampered", &digest));
        assert!(!verify_checksum(b"payload", &digest[..10]));
    }
}
