use content_sync::{
    ContentSummary, DownloadPolicy, Feedback, PublicationId, PublisherId, RejectedUnit, RemoteId,
    RepositoryId, SyncPhase, VersionRef,
};
use serde::{Deserialize, Serialize};

/// Current state of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryView {
    pub id: RepositoryId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: u64,
    /// Highest committed version. Version 0 (empty) exists from creation.
    pub latest_version: VersionRef,
}

/// One immutable snapshot in a repository's version chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryVersion {
    pub reference: VersionRef,
    pub created_at: u64,
    pub content_count: u64,
}

impl RepositoryVersion {
    pub fn number(&self) -> u64 {
        self.reference.number
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publisher {
    pub id: PublisherId,
    pub name: String,
    /// File name the publication's manifest is written under.
    pub manifest_name: String,
}

/// A publication pins exactly one repository version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub id: PublicationId,
    pub publisher: PublisherId,
    pub version: VersionRef,
    pub created_at: u64,
}

/// Outcome of one sync run. Kept for reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub remote: RemoteId,
    pub repository: RepositoryId,
    pub policy: DownloadPolicy,
    /// Latest version after the sync, new or not.
    pub version: VersionRef,
    /// False when the manifest matched the latest version and nothing was committed.
    pub created: bool,
    pub added: ContentSummary,
    pub removed: ContentSummary,
    /// Content units the deduplication index had never seen before.
    pub new_units: u64,
    pub downloaded: u64,
    pub rejected: Vec<RejectedUnit>,
    pub feedback: Vec<Feedback>,
    pub phase: SyncPhase,
}

/// Result of deleting content no version references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanReport {
    pub units_removed: u64,
    pub artifacts_removed: u64,
}
