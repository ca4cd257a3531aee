//! The service facade: the operations a front end drives.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use content_sync::{
    ContentSummary, Fetcher, Manifest, ManifestEntry, PublisherId, Remote, RemoteConfig, RemoteId,
    RepositoryId, SyncError, SyncOptions, SyncPhase, VersionRef,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::locks::RepositoryLocks;
use crate::models::{OrphanReport, Publication, RepositoryVersion, RepositoryView, SyncReport};
use crate::orchestrator::Synchronizer;
use crate::reader::ArtifactReader;
use crate::storage::ArtifactStorage;
use crate::store::ContentStore;

/// A background operation started by the service.
pub struct TaskHandle<T> {
    id: u64,
    phase: watch::Receiver<SyncPhase>,
    join: JoinHandle<Result<T, SyncError>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// A receiver that observes every phase change.
    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Abort the task. A commit already in progress still runs to completion.
    pub fn abort(&self) {
        self.join.abort();
    }

    pub async fn wait(self) -> Result<T, SyncError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => {
                Err(SyncError::Other(format!("task {} cancelled", self.id)))
            }
            Err(e) => Err(SyncError::Other(format!("task {} panicked: {e}", self.id))),
        }
    }
}

/// Remotes, repositories, syncs and publications behind one handle.
///
/// Cheap to share behind an `Arc`; tasks it spawns hold their own clones of
/// the store and storage.
pub struct ContentService {
    store: Arc<ContentStore>,
    storage: Arc<ArtifactStorage>,
    locks: Arc<RepositoryLocks>,
    synchronizer: Synchronizer,
    reader: ArtifactReader,
    next_task: AtomicU64,
}

impl ContentService {
    pub fn new(store: ContentStore, storage: ArtifactStorage, fetcher: Arc<dyn Fetcher>) -> Self {
        let store = Arc::new(store);
        let storage = Arc::new(storage);
        let locks = Arc::new(RepositoryLocks::new());

        Self {
            synchronizer: Synchronizer::new(
                Arc::clone(&store),
                Arc::clone(&storage),
                Arc::clone(&fetcher),
                Arc::clone(&locks),
            ),
            reader: ArtifactReader::new(Arc::clone(&store), Arc::clone(&storage), fetcher),
            store,
            storage,
            locks,
            next_task: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn storage(&self) -> &ArtifactStorage {
        &self.storage
    }

    // Remotes

    pub fn create_remote(&self, config: &RemoteConfig) -> Result<RemoteId, StoreError> {
        let id = self.store.create_remote(config)?;
        info!(remote = %id, name = %config.name, policy = %config.policy, "created remote");
        Ok(id)
    }

    pub fn update_remote(&self, id: RemoteId, config: &RemoteConfig) -> Result<(), StoreError> {
        self.store.update_remote(id, config)
    }

    pub fn remotes(&self) -> Result<Vec<Remote>, StoreError> {
        self.store.remotes()
    }

    // Repositories

    pub fn create_repository(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<RepositoryId, StoreError> {
        let id = self.store.create_repository(name, description)?;
        info!(repository = %id, name, "created repository");
        Ok(id)
    }

    pub fn get_repository(&self, id: RepositoryId) -> Result<RepositoryView, StoreError> {
        self.store.repository(id)
    }

    pub fn versions(&self, id: RepositoryId) -> Result<Vec<RepositoryVersion>, StoreError> {
        self.store.versions(id)
    }

    pub fn delete_repository(&self, id: RepositoryId) -> Result<(), StoreError> {
        self.store.delete_repository(id)?;
        self.locks.forget(id);
        Ok(())
    }

    pub fn delete_version(&self, version: VersionRef) -> Result<(), StoreError> {
        self.store.delete_version(version)
    }

    pub fn content_summary(&self, version: VersionRef) -> Result<ContentSummary, StoreError> {
        self.store.content_summary(version)
    }

    pub fn added_content_summary(&self, version: VersionRef) -> Result<ContentSummary, StoreError> {
        self.store.added_content_summary(version)
    }

    pub fn removed_content_summary(
        &self,
        version: VersionRef,
    ) -> Result<ContentSummary, StoreError> {
        self.store.removed_content_summary(version)
    }

    // Syncs

    /// Start syncing `remote` into `repository` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger_sync(
        &self,
        remote: RemoteId,
        repository: RepositoryId,
        options: SyncOptions,
    ) -> TaskHandle<SyncReport> {
        let id = self.next_task_id();
        let (tx, rx) = watch::channel(SyncPhase::Pending);
        let synchronizer = self.synchronizer.clone();

        info!(task = id, %remote, %repository, mode = ?options.mode, "queued sync");
        let join = tokio::spawn(async move {
            synchronizer.sync(remote, repository, options, &tx).await
        });

        TaskHandle {
            id,
            phase: rx,
            join,
        }
    }

    /// Read the bytes of `relative_path` in the repository's latest version,
    /// fetching them from the remote if the sync deferred the download.
    pub async fn read_artifact(
        &self,
        repository: RepositoryId,
        relative_path: &str,
    ) -> Result<Vec<u8>, SyncError> {
        self.reader.read(repository, relative_path).await
    }

    // Publications

    pub fn create_publisher(
        &self,
        name: &str,
        manifest_name: Option<&str>,
    ) -> Result<PublisherId, StoreError> {
        self.store.create_publisher(name, manifest_name)
    }

    /// Publish the repository's latest version in the background. Waits for
    /// any sync holding the repository's commit lock.
    pub fn trigger_publish(
        &self,
        publisher: PublisherId,
        repository: RepositoryId,
    ) -> TaskHandle<Publication> {
        let id = self.next_task_id();
        let (tx, rx) = watch::channel(SyncPhase::Pending);
        let store = Arc::clone(&self.store);
        let locks = Arc::clone(&self.locks);

        let join = tokio::spawn(async move {
            let _guard = locks.lock(repository).await;
            tx.send_replace(SyncPhase::Committing);

            match store.publish(publisher, repository) {
                Ok(publication) => {
                    info!(
                        publication = %publication.id,
                        version = %publication.version,
                        "published"
                    );
                    tx.send_replace(SyncPhase::Complete);
                    Ok(publication)
                }
                Err(e) => {
                    warn!(%repository, error = %e, "publish failed");
                    tx.send_replace(SyncPhase::Failed);
                    Err(SyncError::from(e))
                }
            }
        });

        TaskHandle {
            id,
            phase: rx,
            join,
        }
    }

    /// The manifest a publication serves: one entry per unit of its version.
    pub fn publication_manifest(&self, publication: &Publication) -> Result<Manifest, StoreError> {
        let entries = self
            .store
            .version_content(publication.version)?
            .into_iter()
            .map(|unit| ManifestEntry::new(unit.relative_path(), unit.digest(), unit.size))
            .collect();
        Ok(Manifest::new(entries))
    }

    // Maintenance

    /// Delete content no version references, and the stored bytes no
    /// remaining unit uses.
    pub fn remove_orphans(&self) -> Result<OrphanReport, StoreError> {
        let (units_removed, paths) = self.store.remove_orphans()?;
        for path in &paths {
            self.storage.remove(path)?;
        }

        let report = OrphanReport {
            units_removed,
            artifacts_removed: paths.len() as u64,
        };
        info!(
            units = report.units_removed,
            artifacts = report.artifacts_removed,
            "removed orphans"
        );
        Ok(report)
    }

    fn next_task_id(&self) -> u64 {
        self.next_task.fetch_add(1, Ordering::Relaxed)
    }
}
