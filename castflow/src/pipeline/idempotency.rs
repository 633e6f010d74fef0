//! Deterministic keys for stage requests and task submissions.

use sha2::{Digest, Sha256};

/// Generates a key from ordered components.
#[must_use]
pub fn generate_idempotency_key(components: &[&str]) -> String {
    let combined = components.join(":");
    let mut hasher = Sha256::new();
    hasher.update(combined.as_bytes());
    let result = hasher.finalize();
    format!("idem:{}", hex::encode(&result[..16]))
}

/// Hashes a parameter object.
///
/// `serde_json` maps are ordered by key, so equal objects hash equally.
#[must_use]
pub fn hash_parameters(params: &serde_json::Value) -> String {
    let json = params.to_string();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}
