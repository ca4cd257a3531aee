//! Sync orchestration: fetch, resolve, commit.

use std::sync::Arc;

use content_sync::checksum;
use content_sync::{
    ContentSummary, DownloadPolicy, Feedback, Fetcher, Manifest, ManifestEntry, Remote, RemoteId,
    RepositoryId, SyncError, SyncOptions, SyncPhase,
};
use futures::{StreamExt, TryStreamExt, stream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::builder::BuildOutcome;
use crate::index::{
    ResolvedManifest, attach_artifact, dedupe_manifest, link_stored_artifacts,
    record_remote_artifact, resolve_manifest,
};
use crate::locks::RepositoryLocks;
use crate::models::SyncReport;
use crate::storage::ArtifactStorage;
use crate::store::ContentStore;

/// Commit attempts before a concurrent commit conflict is returned to the caller.
pub const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Bytes downloaded and stored during the fetching phase, waiting to be
/// recorded by the commit.
#[derive(Debug, Clone)]
struct StagedArtifact {
    sha256: String,
    size: u64,
    storage_path: String,
}

/// Drives one remote into one repository.
#[derive(Clone)]
pub struct Synchronizer {
    store: Arc<ContentStore>,
    storage: Arc<ArtifactStorage>,
    fetcher: Arc<dyn Fetcher>,
    locks: Arc<RepositoryLocks>,
}

impl Synchronizer {
    pub fn new(
        store: Arc<ContentStore>,
        storage: Arc<ArtifactStorage>,
        fetcher: Arc<dyn Fetcher>,
        locks: Arc<RepositoryLocks>,
    ) -> Self {
        Self {
            store,
            storage,
            fetcher,
            locks,
        }
    }

    /// Sync `remote` into `repository`, reporting phase changes on `phase`.
    ///
    /// On failure the repository's latest version is untouched. Artifacts
    /// already written to storage stay there and are reused by the next
    /// attempt.
    pub async fn sync(
        &self,
        remote: RemoteId,
        repository: RepositoryId,
        options: SyncOptions,
        phase: &watch::Sender<SyncPhase>,
    ) -> Result<SyncReport, SyncError> {
        let result = self.run(remote, repository, options, phase).await;
        match &result {
            Ok(report) => {
                set_phase(phase, repository, SyncPhase::Complete);
                info!(
                    %repository,
                    version = report.version.number,
                    created = report.created,
                    "sync complete"
                );
            }
            Err(e) => {
                set_phase(phase, repository, SyncPhase::Failed);
                warn!(%repository, error = %e, "sync failed");
            }
        }
        result
    }

    async fn run(
        &self,
        remote_id: RemoteId,
        repository: RepositoryId,
        options: SyncOptions,
        phase: &watch::Sender<SyncPhase>,
    ) -> Result<SyncReport, SyncError> {
        // Later edits to the remote only affect later syncs.
        let remote = self.store.remote(remote_id)?;
        self.store.repository(repository)?;

        set_phase(phase, repository, SyncPhase::Fetching);
        let manifest = self.fetcher.fetch_manifest(&remote).await?;
        info!(
            remote = remote.name(),
            fetcher = self.fetcher.label(),
            entries = manifest.len(),
            policy = %remote.policy(),
            "fetched manifest"
        );

        let staged = match remote.policy() {
            DownloadPolicy::Immediate => self.download_missing(&remote, &manifest).await?,
            DownloadPolicy::OnDemand | DownloadPolicy::Streamed => Vec::new(),
        };

        let _guard = self.locks.lock(repository).await;

        set_phase(phase, repository, SyncPhase::Resolving);
        let resolved = self.resolve(&remote, &manifest, &staged)?;

        // The plan is read outside the append transaction, so a writer that
        // does not hold this process's lock can still move the chain first.
        set_phase(phase, repository, SyncPhase::Committing);
        let outcome = retry_conflicts(repository, || {
            let plan = self
                .store
                .plan_version(repository, &resolved.content, options.mode)?;
            self.store.commit_version(repository, plan)
        })?;

        Ok(report(&remote, repository, resolved, outcome, staged.len()))
    }

    /// Download every entry whose bytes are not stored yet, with at most
    /// the remote's `download_concurrency` requests in flight.
    async fn download_missing(
        &self,
        remote: &Remote,
        manifest: &Manifest,
    ) -> Result<Vec<StagedArtifact>, SyncError> {
        let (accepted, _) = dedupe_manifest(manifest);
        let missing = self.store.missing_artifacts(&accepted)?;
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            remote = remote.name(),
            count = missing.len(),
            concurrency = remote.config.download_concurrency,
            "downloading artifacts"
        );

        stream::iter(missing)
            .map(|entry| self.download(remote, entry))
            .buffer_unordered(remote.config.download_concurrency.max(1))
            .try_collect()
            .await
    }

    async fn download(
        &self,
        remote: &Remote,
        entry: ManifestEntry,
    ) -> Result<StagedArtifact, SyncError> {
        let url = remote.artifact_url(&entry.relative_path)?;
        let bytes = self.fetcher.fetch_artifact(remote, &url).await?;

        checksum::verify(&entry.relative_path, &bytes, &entry.digest, entry.size)
            .map_err(|e| SyncError::StorageFailure(format!("refusing to store {url}: {e}")))?;
        let storage_path = self.storage.put(&entry.digest, &bytes)?;

        debug!(%url, bytes = bytes.len(), "stored artifact");
        Ok(StagedArtifact {
            sha256: entry.digest,
            size: entry.size,
            storage_path,
        })
    }

    /// Map the manifest onto content units and record where each unit's
    /// bytes live, in one transaction. The resulting content is attributed
    /// to `remote`.
    fn resolve(
        &self,
        remote: &Remote,
        manifest: &Manifest,
        staged: &[StagedArtifact],
    ) -> Result<ResolvedManifest, SyncError> {
        self.store.write(|tx| {
            let mut resolved = resolve_manifest(tx, manifest)?;
            resolved.content.attribute_to(remote.id);

            for artifact in staged {
                attach_artifact(tx, &artifact.sha256, artifact.size, &artifact.storage_path)?;
            }
            link_stored_artifacts(tx, &resolved.units)?;

            for unit in &resolved.units {
                let url = remote.artifact_url(unit.relative_path())?;
                record_remote_artifact(tx, unit, remote.id, url.as_str())?;
            }

            Ok(resolved)
        })
    }
}

/// Run `attempt` until it succeeds, fails with anything other than a
/// concurrent commit conflict, or has run [`MAX_COMMIT_ATTEMPTS`] times.
pub(crate) fn retry_conflicts<T>(
    repository: RepositoryId,
    mut attempt: impl FnMut() -> Result<T, SyncError>,
) -> Result<T, SyncError> {
    let mut tries = 1;
    loop {
        match attempt() {
            Err(e) if e.is_retryable() && tries < MAX_COMMIT_ATTEMPTS => {
                warn!(%repository, attempt = tries, error = %e, "retrying commit");
                tries += 1;
            }
            other => return other,
        }
    }
}

fn set_phase(phase: &watch::Sender<SyncPhase>, repository: RepositoryId, next: SyncPhase) {
    let previous = phase.send_replace(next);
    if previous != next {
        info!(%repository, from = %previous, to = %next, "sync phase");
    }
}

fn report(
    remote: &Remote,
    repository: RepositoryId,
    resolved: ResolvedManifest,
    outcome: BuildOutcome,
    downloaded: usize,
) -> SyncReport {
    let mut feedback: Vec<Feedback> = resolved.rejected.iter().map(Feedback::rejected).collect();

    let (added, removed) = match &outcome {
        BuildOutcome::Created { version, plan } => {
            info!(
                %repository,
                version = version.number(),
                added = plan.added.len(),
                removed = plan.removed.len(),
                "committed version"
            );
            feedback.push(Feedback::info(format!(
                "created {} ({} added, {} removed)",
                version.reference,
                plan.added.len(),
                plan.removed.len()
            )));
            (plan.added.summary(), plan.removed.summary())
        }
        BuildOutcome::Unchanged { version } => {
            feedback.push(Feedback::info(format!(
                "no changes; {} remains latest",
                version.reference
            )));
            (ContentSummary::new(), ContentSummary::new())
        }
    };

    SyncReport {
        remote: remote.id,
        repository,
        policy: remote.policy(),
        version: outcome.version().reference,
        created: outcome.is_created(),
        added,
        removed,
        new_units: resolved.created,
        downloaded: downloaded as u64,
        rejected: resolved.rejected,
        feedback,
        phase: SyncPhase::Complete,
    }
}
