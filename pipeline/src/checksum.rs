//! Checksums for acquired products and uploaded objects.

use sha2::{Digest, Sha256};

/// Calculate the SHA-256 checksum of a byte payload.
///
/// # Arguments
/// * `bytes` - Raw artifact content
///
/// # Returns
/// Hexadecimal string representation of the SHA-256 hash.
pub fn calculate_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_known_value() {
        assert_eq!(
            calculate_checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_different_content_different_checksum() {
        assert_ne!(calculate_checksum(b"TIC 1"), calculate_checksum(b"TIC 2"));
        assert_eq!(calculate_checksum(b"same"), calculate_checksum(b"same"));
    }
}
