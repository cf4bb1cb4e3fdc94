//! SHA-256 digests and workflow change-hash generation.

use sha2::{Digest, Sha256};

use crate::types::Timestamp;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Generate a fresh opaque change hash for a workflow write.
///
/// The digest covers the serialized content, the write time and a random
/// nonce, so two writes of identical content still get distinct hashes.
pub fn new_change_hash(content: &serde_json::Value, at: Timestamp) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.to_string().as_bytes());
    hasher.update(at.to_rfc3339().as_bytes());
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    format!("{:x}", hasher.finalize())
}
