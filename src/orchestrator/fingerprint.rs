//! Request fingerprints.

use sha2::{Digest, Sha256};

use crate::orchestrator::request::FetchRequest;

/// Stable hex SHA-256 of the normalized request.
///
/// Covers kind, normalized target and page. Priority and timeout do not
/// change what is fetched, so they are left out.
pub fn fingerprint(request: &FetchRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.kind.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(request.normalized_target().as_bytes());
    hasher.update([0x1f]);
    hasher.update(request.page_or_default().to_be_bytes());
    hex::encode(hasher.finalize())
}
