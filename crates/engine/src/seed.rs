//! Deterministic seeds derived from symbols

use sha2::{Digest, Sha256};

/// First eight bytes of the SHA-256 digest of the trimmed, upper-cased symbol
pub fn seed_from_symbol(symbol: &str) -> u64 {
    let digest = Sha256::digest(symbol.trim().to_uppercase().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_stable_and_normalized() {
        assert_eq!(seed_from_symbol("AAPL"), seed_from_symbol(" aapl "));
        assert_ne!(seed_from_symbol("AAPL"), seed_from_symbol("MSFT"));
    }
}
