//! Identifier, token, and clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{StateError, StateResult};

/// `len` random bytes from the OS entropy source.
pub fn random_bytes(len: usize) -> StateResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf).map_err(|e| StateError::Entropy(e.to_string()))?;
    Ok(buf)
}

/// Hex-encode `bytes` random bytes.
pub fn random_hex(bytes: usize) -> StateResult<String> {
    Ok(hex::encode(random_bytes(bytes)?))
}

/// Fresh 24-character record identifier.
pub fn new_id() -> StateResult<String> {
    random_hex(12)
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_hex_and_distinct() {
        let a = new_id().unwrap();
        let b = new_id().unwrap();
        assert_eq!(a.len(), 24);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
