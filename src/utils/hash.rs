//! Content fingerprints used by sync baselines.

use sha2::{Digest, Sha256};

/// SHA-256 of `content`, lowercase hex.
pub fn fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
