//! SHA-256 hashing for SQL and configuration change detection.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::CoreResult;

/// Hex-encoded SHA-256 of a string
pub fn compute_checksum(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    format!("{:x}", digest)
}

/// Hex-encoded SHA-256 of a value's JSON serialization.
///
/// Map-valued fields must use ordered maps for the hash to be stable.
pub fn compute_json_checksum<T: Serialize + ?Sized>(value: &T) -> CoreResult<String> {
    let json = serde_json::to_string(value)?;
    Ok(compute_checksum(&json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_known_value() {
        assert_eq!(
            compute_checksum("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_json_checksum_stable() {
        let a = serde_json::json!({"strategy": "merge", "unique_key": ["id"]});
        let b = serde_json::json!({"unique_key": ["id"], "strategy": "merge"});
        assert_eq!(
            compute_json_checksum(&a).unwrap(),
            compute_json_checksum(&b).unwrap()
        );
    }
}
