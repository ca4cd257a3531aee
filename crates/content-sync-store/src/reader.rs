use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use content_sync::checksum;
use content_sync::{
    Artifact, ArtifactSource, ContentUnit, Fetcher, RemoteLocator, RepositoryId, SyncError,
    VersionRef,
};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::storage::ArtifactStorage;
use crate::store::ContentStore;

type InFlight = Arc<OnceCell<Artifact>>;

/// Serves content bytes to consumers, fetching deferred artifacts as needed.
///
/// Concurrent first reads of the same uncached artifact share one fetch.
pub struct ArtifactReader {
    store: Arc<ContentStore>,
    storage: Arc<ArtifactStorage>,
    fetcher: Arc<dyn Fetcher>,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl ArtifactReader {
    pub fn new(
        store: Arc<ContentStore>,
        storage: Arc<ArtifactStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            store,
            storage,
            fetcher,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Read the bytes stored under `relative_path` in the repository's
    /// latest version.
    pub async fn read(
        &self,
        repository: RepositoryId,
        relative_path: &str,
    ) -> Result<Vec<u8>, SyncError> {
        let latest = self
            .store
            .latest(repository)?
            .ok_or_else(|| SyncError::NotFound(repository.to_string()))?;
        self.read_version(latest.reference, relative_path).await
    }

    pub async fn read_version(
        &self,
        version: VersionRef,
        relative_path: &str,
    ) -> Result<Vec<u8>, SyncError> {
        let unit = self.store.find_in_version(version, relative_path)?;
        self.read_unit(version, &unit).await
    }

    /// Read `unit` as a member of `version`.
    pub async fn read_unit(
        &self,
        version: VersionRef,
        unit: &ContentUnit,
    ) -> Result<Vec<u8>, SyncError> {
        let source = self.store.artifact_source(version, unit)?.ok_or_else(|| {
            SyncError::NotFound(format!("no artifact or remote for {}", unit.key))
        })?;

        match source {
            ArtifactSource::Eager(artifact) => Ok(self.storage.read(&artifact.storage_path)?),
            ArtifactSource::LazyCached(locator) => {
                let artifact = self.cache(&locator).await?;
                Ok(self.storage.read(&artifact.storage_path)?)
            }
            ArtifactSource::StreamedUncached(locator) => self.fetch_verified(&locator).await,
        }
    }

    /// Fetch, verify and store an artifact once, however many readers ask.
    async fn cache(&self, locator: &RemoteLocator) -> Result<Artifact, SyncError> {
        let cell = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(in_flight.entry(locator.sha256.clone()).or_default())
        };

        let result = cell
            .get_or_try_init(|| self.fetch_and_store(locator))
            .await
            .cloned();

        // Entries only live while a fetch is in flight.
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if in_flight
            .get(&locator.sha256)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            in_flight.remove(&locator.sha256);
        }

        result
    }

    async fn fetch_and_store(&self, locator: &RemoteLocator) -> Result<Artifact, SyncError> {
        let storage_path = match self.store.artifact_by_sha256(&locator.sha256)? {
            Some(artifact) => artifact.storage_path,
            None => {
                let bytes = self.fetch_verified(locator).await?;
                self.storage.put(&locator.sha256, &bytes)?
            }
        };
        Ok(self
            .store
            .attach_artifact(&locator.sha256, locator.size, &storage_path)?)
    }

    async fn fetch_verified(&self, locator: &RemoteLocator) -> Result<Vec<u8>, SyncError> {
        let url = Url::parse(&locator.url)
            .map_err(|e| SyncError::Other(format!("invalid artifact url {}: {e}", locator.url)))?;
        let bytes = self.fetcher.fetch_artifact(&locator.remote, &url).await?;
        checksum::verify(&locator.relative_path, &bytes, &locator.sha256, locator.size)?;
        debug!(%url, bytes = bytes.len(), "fetched deferred artifact");
        Ok(bytes)
    }
}
