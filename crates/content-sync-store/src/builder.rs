use content_sync::{ContentSet, RepositoryId, SyncError, SyncMode, VersionPlan, VersionRef};
use rusqlite::Connection;

use crate::chain::{append, content_set, latest_number, version};
use crate::models::RepositoryVersion;
use crate::store::ContentStore;

/// What committing a plan did to the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Created {
        version: RepositoryVersion,
        plan: VersionPlan,
    },
    /// The plan matched the latest version, which stays latest.
    Unchanged { version: RepositoryVersion },
}

impl BuildOutcome {
    pub fn version(&self) -> &RepositoryVersion {
        match self {
            Self::Created { version, .. } | Self::Unchanged { version } => version,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

/// Computes and commits the next version of one repository.
///
/// Works on a borrowed connection, so planning and committing can share a
/// transaction or run in separate ones.
pub(crate) struct VersionBuilder<'c> {
    conn: &'c Connection,
    repository: RepositoryId,
}

impl<'c> VersionBuilder<'c> {
    pub(crate) fn new(conn: &'c Connection, repository: RepositoryId) -> Self {
        Self { conn, repository }
    }

    /// Plan the next version against whatever is latest right now.
    pub(crate) fn plan(&self, resolved: &ContentSet, mode: SyncMode) -> Result<VersionPlan, SyncError> {
        let base = latest_number(self.conn, self.repository)?
            .ok_or_else(|| SyncError::NotFound(self.repository.to_string()))?;
        let previous = content_set(self.conn, VersionRef::new(self.repository, base))?;
        Ok(VersionPlan::compute(base, &previous, resolved, mode))
    }

    pub(crate) fn commit(&self, plan: VersionPlan) -> Result<BuildOutcome, SyncError> {
        if plan.is_noop() {
            let version = version(self.conn, VersionRef::new(self.repository, plan.base))?;
            return Ok(BuildOutcome::Unchanged { version });
        }

        let version = append(self.conn, self.repository, &plan)?;
        Ok(BuildOutcome::Created { version, plan })
    }

    pub(crate) fn build(&self, resolved: &ContentSet, mode: SyncMode) -> Result<BuildOutcome, SyncError> {
        let plan = self.plan(resolved, mode)?;
        self.commit(plan)
    }
}

impl ContentStore {
    /// Plan a version from explicit content without committing it.
    pub fn plan_version(
        &self,
        repository: RepositoryId,
        content: &ContentSet,
        mode: SyncMode,
    ) -> Result<VersionPlan, SyncError> {
        let conn = self.conn()?;
        VersionBuilder::new(&conn, repository).plan(content, mode)
    }

    /// Commit a previously computed plan. Fails with a concurrent commit
    /// conflict if another version landed after the plan was made.
    pub fn commit_version(
        &self,
        repository: RepositoryId,
        plan: VersionPlan,
    ) -> Result<BuildOutcome, SyncError> {
        self.write(|tx| VersionBuilder::new(tx, repository).commit(plan))
    }

    /// Plan and commit in one transaction.
    pub fn build_version(
        &self,
        repository: RepositoryId,
        content: &ContentSet,
        mode: SyncMode,
    ) -> Result<BuildOutcome, SyncError> {
        self.write(|tx| VersionBuilder::new(tx, repository).build(content, mode))
    }
}

#[cfg(test)]
mod tests {
    use content_sync::{FILE_CONTENT_TYPE, ManifestEntry, Member};

    use super::*;
    use crate::index::Resolution;

    fn unit_set(store: &ContentStore, paths: &[&str]) -> ContentSet {
        paths
            .iter()
            .map(|path| {
                let entry = ManifestEntry::new(*path, "a".repeat(64), 1);
                let unit = match store.resolve(&entry).unwrap() {
                    Resolution::Created(unit) | Resolution::Existing(unit) => unit,
                    Resolution::Conflict(rejected) => panic!("unexpected conflict: {rejected:?}"),
                };
                (unit.id, Member::new(FILE_CONTENT_TYPE, *path))
            })
            .collect()
    }

    #[test]
    fn builds_successive_versions() {
        let store = ContentStore::open_in_memory().unwrap();
        let repo = store.create_repository("repo", None).unwrap();

        let first = store
            .build_version(repo, &unit_set(&store, &["a", "b"]), SyncMode::Mirror)
            .unwrap();
        assert!(first.is_created());
        assert_eq!(first.version().number(), 1);
        assert_eq!(first.version().content_count, 2);

        let second = store
            .build_version(repo, &unit_set(&store, &["b", "c"]), SyncMode::Mirror)
            .unwrap();
        assert_eq!(second.version().number(), 2);

        let diff = store
            .diff(VersionRef::new(repo, 1), VersionRef::new(repo, 2))
            .unwrap();
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.removed.len(), 1);
    }

    #[test]
    fn identical_content_leaves_latest_unchanged() {
        let store = ContentStore::open_in_memory().unwrap();
        let repo = store.create_repository("repo", None).unwrap();
        let content = unit_set(&store, &["a"]);

        store.build_version(repo, &content, SyncMode::Mirror).unwrap();
        let again = store.build_version(repo, &content, SyncMode::Mirror).unwrap();

        assert!(!again.is_created());
        assert_eq!(again.version().number(), 1);
        assert_eq!(store.versions(repo).unwrap().len(), 2);
    }

    #[test]
    fn stale_plan_is_a_concurrent_commit_conflict() {
        let store = ContentStore::open_in_memory().unwrap();
        let repo = store.create_repository("repo", None).unwrap();

        let first = store
            .plan_version(repo, &unit_set(&store, &["a"]), SyncMode::Mirror)
            .unwrap();
        let second = store
            .plan_version(repo, &unit_set(&store, &["b"]), SyncMode::Mirror)
            .unwrap();

        store.commit_version(repo, first).unwrap();
        let err = store.commit_version(repo, second).unwrap_err();

        assert!(err.is_retryable());
        assert!(matches!(
            err,
            SyncError::ConcurrentCommitConflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
        assert_eq!(store.latest(repo).unwrap().unwrap().number(), 1);
    }

    #[test]
    fn unknown_repository_is_not_found() {
        let store = ContentStore::open_in_memory().unwrap();
        let result = store.build_version(RepositoryId::new(99), &ContentSet::new(), SyncMode::Mirror);
        assert!(matches!(result, Err(SyncError::NotFound(_))));
    }
}
