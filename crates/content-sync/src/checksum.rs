use sha2::{Digest, Sha256};

use crate::sync::SyncError;

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Returns true if `digest` looks like a hex SHA-256.
pub fn is_sha256_hex(digest: &str) -> bool {
    digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Check downloaded bytes against the size and digest a manifest declared.
pub fn verify(
    relative_path: &str,
    bytes: &[u8],
    expected_digest: &str,
    expected_size: u64,
) -> Result<(), SyncError> {
    if bytes.len() as u64 != expected_size {
        return Err(SyncError::IntegrityConflict {
            relative_path: relative_path.to_owned(),
            reason: format!(
                "expected {expected_size} bytes, received {}",
                bytes.len()
            ),
        });
    }

    let actual = sha256_hex(bytes);
    if !actual.eq_ignore_ascii_case(expected_digest) {
        return Err(SyncError::IntegrityConflict {
            relative_path: relative_path.to_owned(),
            reason: format!("expected sha256 {expected_digest}, computed {actual}"),
        });
    }

    Ok(())
}
