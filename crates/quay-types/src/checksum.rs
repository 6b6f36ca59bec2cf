//! Content hashing shared by every crate that needs a stable digest
//! (the repository cache, the pins store, the build fingerprint).

/// Hex-encoded BLAKE3 digest of `bytes`.
pub fn checksum_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic() {
        assert_eq!(checksum_hex(b"hello"), checksum_hex(b"hello"));
        assert_ne!(checksum_hex(b"hello"), checksum_hex(b"world"));
    }
}
