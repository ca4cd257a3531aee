use std::fmt;

use serde::{Deserialize, Serialize};

/// Content type identifier for generic files.
pub const FILE_CONTENT_TYPE: &str = "file.file";

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

row_id!(
    /// Identifier of a configured upstream source.
    RemoteId,
    "remote-"
);
row_id!(
    /// Identifier of a repository.
    RepositoryId,
    "repository-"
);
row_id!(
    /// Identifier of a stored content unit.
    ContentUnitId,
    "content-"
);
row_id!(ArtifactId, "artifact-");
row_id!(PublisherId, "publisher-");
row_id!(PublicationId, "publication-");

/// The identifying fields of a file content unit.
///
/// Two units with equal natural keys are the same unit, regardless of
/// which remote or repository they were first seen in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub relative_path: String,
    /// Lowercase hex SHA-256 of the file bytes.
    pub digest: String,
}

impl NaturalKey {
    pub fn new(relative_path: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            digest: digest.into(),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.relative_path, short_digest(&self.digest))
    }
}

/// One logical piece of content, shared by every version that contains it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub id: ContentUnitId,
    pub content_type: String,
    pub key: NaturalKey,
    pub size: u64,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    /// `None` until the bytes have been downloaded into local storage.
    pub artifact: Option<ArtifactId>,
}

impl ContentUnit {
    pub fn relative_path(&self) -> &str {
        &self.key.relative_path
    }

    pub fn digest(&self) -> &str {
        &self.key.digest
    }

    pub fn has_artifact(&self) -> bool {
        self.artifact.is_some()
    }
}

/// Metadata for bytes held in local artifact storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub sha256: String,
    pub size: u64,
    /// Path relative to the storage root.
    pub storage_path: String,
}

/// Abbreviates a hex digest for log and display output.
pub fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_prefix() {
        assert_eq!(RepositoryId::new(4).to_string(), "repository-4");
        assert_eq!(ContentUnitId::new(17).to_string(), "content-17");
    }

    #[test]
    fn natural_key_display_abbreviates_digest() {
        let key = NaturalKey::new("a/b.iso", "0123456789abcdef0123");
        assert_eq!(key.to_string(), "a/b.iso@0123456789ab");
    }

    #[test]
    fn short_digest_keeps_short_input() {
        assert_eq!(short_digest("abc"), "abc");
    }
}
