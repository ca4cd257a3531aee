//! The file manifest served by a remote.
//!
//! A manifest is a text file with one entry per line:
//!
//! ```text
//! relative/path.iso,<sha256 hex>,<size in bytes>
//! ```
//!
//! Relative paths may contain commas; the digest and size are taken from the
//! last two fields. Blank lines are ignored.

use serde::{Deserialize, Serialize};

use crate::checksum::is_sha256_hex;
use crate::content::NaturalKey;
use crate::sync::SyncError;

/// Default manifest file name served by file remotes and written by publishers.
pub const DEFAULT_MANIFEST_NAME: &str = "PULP_MANIFEST";

/// One advertised file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub relative_path: String,
    pub digest: String,
    pub size: u64,
}

impl ManifestEntry {
    pub fn new(relative_path: impl Into<String>, digest: impl Into<String>, size: u64) -> Self {
        Self {
            relative_path: relative_path.into(),
            digest: digest.into(),
            size,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.relative_path, &self.digest)
    }
}

/// The list of entries a remote currently advertises, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse manifest text. Any malformed line fails the whole manifest.
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        let mut entries = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            entries.push(parse_line(line).map_err(|reason| {
                SyncError::InvalidManifest(format!("line {}: {reason}", idx + 1))
            })?);
        }

        Ok(Self { entries })
    }

    /// Render the manifest in its wire format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!(
                "{},{},{}\n",
                entry.relative_path, entry.digest, entry.size
            ));
        }
        out
    }
}

fn parse_line(line: &str) -> Result<ManifestEntry, String> {
    let mut fields = line.rsplitn(3, ',');
    let size = fields.next().unwrap_or_default().trim();
    let digest = fields.next().ok_or("missing digest")?.trim();
    let relative_path = fields.next().ok_or("missing relative path")?.trim();

    validate_relative_path(relative_path)?;

    if !is_sha256_hex(digest) {
        return Err(format!("invalid sha256 digest {digest:?}"));
    }

    let size: u64 = size
        .parse()
        .map_err(|_| format!("invalid size {size:?}"))?;

    Ok(ManifestEntry {
        relative_path: relative_path.to_owned(),
        digest: digest.to_ascii_lowercase(),
        size,
    })
}

/// Relative paths become both URL suffixes and storage names, so they must
/// stay below their root.
fn validate_relative_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("empty relative path".into());
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(format!("absolute path {path:?}"));
    }
    if path.contains('\\') {
        return Err(format!("path {path:?} contains a backslash"));
    }
    if path.split('/').any(|segment| segment == ".." || segment.is_empty()) {
        return Err(format!("path {path:?} escapes its root or has empty segments"));
    }
    // `scheme:rest` would be joined as an absolute URL.
    if path.split('/').next().is_some_and(|first| first.contains(':')) {
        return Err(format!("path {path:?} has a colon in its first segment"));
    }
    Ok(())
}
