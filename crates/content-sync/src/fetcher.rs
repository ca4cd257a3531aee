use std::sync::Arc;

use url::Url;

use crate::manifest::Manifest;
use crate::remote::Remote;
use crate::sync::SyncError;

/// Retrieves manifests and artifact bytes from an upstream source.
///
/// Implementations report transport failures as
/// [`SyncError::RemoteUnreachable`] and leave checksum verification to the
/// caller.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Human-readable label identifying this fetcher.
    fn label(&self) -> &str;

    /// Fetch and parse the remote's manifest.
    async fn fetch_manifest(&self, remote: &Remote) -> Result<Manifest, SyncError>;

    /// Fetch the bytes at `url`, using the remote's credentials.
    async fn fetch_artifact(&self, remote: &Remote, url: &Url) -> Result<Vec<u8>, SyncError>;
}

#[async_trait::async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    fn label(&self) -> &str {
        (**self).label()
    }

    async fn fetch_manifest(&self, remote: &Remote) -> Result<Manifest, SyncError> {
        (**self).fetch_manifest(remote).await
    }

    async fn fetch_artifact(&self, remote: &Remote, url: &Url) -> Result<Vec<u8>, SyncError> {
        (**self).fetch_artifact(remote, url).await
    }
}
