use serde::{Deserialize, Serialize};

use crate::content::Artifact;
use crate::remote::{DownloadPolicy, Remote};

/// Where a deferred artifact can be fetched from, and what it must hash to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLocator {
    pub remote: Remote,
    pub relative_path: String,
    pub url: String,
    pub sha256: String,
    pub size: u64,
}

/// How the bytes of one content unit are obtained when a consumer reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactSource {
    /// Bytes are already in local storage.
    Eager(Artifact),
    /// Fetch once, verify, store, then serve locally.
    LazyCached(RemoteLocator),
    /// Fetch and verify on every read; never stored.
    StreamedUncached(RemoteLocator),
}

impl ArtifactSource {
    /// Choose the deferred variant matching the locator's remote policy.
    ///
    /// An `immediate` remote only leaves a locator behind when its download
    /// was never recorded, so it is treated like `on_demand`.
    pub fn deferred(locator: RemoteLocator) -> Self {
        match locator.remote.policy() {
            DownloadPolicy::Streamed => Self::StreamedUncached(locator),
            DownloadPolicy::Immediate | DownloadPolicy::OnDemand => Self::LazyCached(locator),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Eager(_))
    }

    pub fn sha256(&self) -> &str {
        match self {
            Self::Eager(artifact) => &artifact.sha256,
            Self::LazyCached(locator) | Self::StreamedUncached(locator) => &locator.sha256,
        }
    }
}
