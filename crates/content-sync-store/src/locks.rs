use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use content_sync::RepositoryId;
use tokio::sync::OwnedMutexGuard;

/// One async mutex per repository, serializing the resolve and commit
/// phases of syncs that target the same repository.
#[derive(Debug, Default)]
pub struct RepositoryLocks {
    locks: Mutex<HashMap<RepositoryId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RepositoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, repository: RepositoryId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(repository).or_default())
        };
        lock.lock_owned().await
    }

    /// Stop tracking a deleted repository. A guard still held for it stays
    /// valid until dropped.
    pub fn forget(&self, repository: RepositoryId) {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&repository);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_repository_is_exclusive() {
        let locks = RepositoryLocks::new();
        let guard = locks.lock(RepositoryId::new(1)).await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), locks.lock(RepositoryId::new(1))).await;
        assert!(blocked.is_err());

        drop(guard);
        let _again = locks.lock(RepositoryId::new(1)).await;
    }

    #[tokio::test]
    async fn forgotten_repositories_are_no_longer_tracked() {
        let locks = RepositoryLocks::new();
        drop(locks.lock(RepositoryId::new(1)).await);
        drop(locks.lock(RepositoryId::new(2)).await);
        assert_eq!(locks.tracked(), 2);

        locks.forget(RepositoryId::new(1));
        assert_eq!(locks.tracked(), 1);

        locks.forget(RepositoryId::new(1));
        assert_eq!(locks.tracked(), 1);
    }

    #[tokio::test]
    async fn different_repositories_do_not_block() {
        let locks = RepositoryLocks::new();
        let _one = locks.lock(RepositoryId::new(1)).await;

        let other =
            tokio::time::timeout(Duration::from_millis(50), locks.lock(RepositoryId::new(2))).await;
        assert!(other.is_ok());
    }
}
