use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::RepositoryId;
use crate::manifest::ManifestEntry;

/// Errors that can occur during sync operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// A manifest or artifact could not be retrieved from the remote.
    #[error("remote unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("integrity conflict for {relative_path}: {reason}")]
    IntegrityConflict {
        relative_path: String,
        reason: String,
    },

    /// Another sync committed a version after this sync computed its plan.
    #[error(
        "concurrent commit on {repository}: planned against version {expected}, latest is {found}"
    )]
    ConcurrentCommitConflict {
        repository: RepositoryId,
        expected: u64,
        found: u64,
    },

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Returns `true` if recomputing the sync against fresh state might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentCommitConflict { .. })
    }
}

/// Lifecycle of a single sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Pending,
    Fetching,
    Resolving,
    Committing,
    Complete,
    Failed,
}

impl SyncPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Resolving => "resolving",
            Self::Committing => "committing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How the new version's content relates to the manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// The new version contains exactly the manifest's units.
    #[default]
    Mirror,
    /// Manifest units are added; units absent from the manifest are kept.
    Additive,
}

/// Per-call options for a sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    #[serde(default)]
    pub mode: SyncMode,
}

/// A manifest entry that was not admitted into the new version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedUnit {
    pub entry: ManifestEntry,
    pub reason: String,
}

impl RejectedUnit {
    pub fn new(entry: ManifestEntry, reason: impl Into<String>) -> Self {
        Self {
            entry,
            reason: reason.into(),
        }
    }

    pub fn to_error(&self) -> SyncError {
        SyncError::IntegrityConflict {
            relative_path: self.entry.relative_path.clone(),
            reason: self.reason.clone(),
        }
    }
}
