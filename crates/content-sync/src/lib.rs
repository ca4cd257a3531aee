pub mod artifact_source;
pub mod checksum;
pub mod content;
pub mod feedback;
pub mod fetcher;
pub mod manifest;
pub mod remote;
pub mod sync;
pub mod version;

pub use artifact_source::{ArtifactSource, RemoteLocator};
pub use content::{
    Artifact, ArtifactId, ContentUnit, ContentUnitId, FILE_CONTENT_TYPE, NaturalKey,
    PublicationId, PublisherId, RemoteId, RepositoryId,
};
pub use feedback::Feedback;
pub use fetcher::Fetcher;
pub use manifest::{DEFAULT_MANIFEST_NAME, Manifest, ManifestEntry};
pub use remote::{Credentials, DownloadPolicy, Remote, RemoteConfig};
pub use sync::{RejectedUnit, SyncError, SyncMode, SyncOptions, SyncPhase};
pub use version::{ContentSet, ContentSummary, Diff, Member, VersionPlan, VersionRef, diff};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
