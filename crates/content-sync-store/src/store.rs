use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use content_sync::{
    Credentials, DEFAULT_MANIFEST_NAME, DownloadPolicy, PublicationId, PublisherId, Remote, RemoteConfig,
    RemoteId, RepositoryId, VersionRef,
};
use rusqlite::{OptionalExtension, TransactionBehavior};

use crate::error::{StoreError, db, is_unique_violation};
use crate::models::{Publication, Publisher, RepositoryView};
use crate::schema;

/// SQLite-backed state: remotes, repositories and their version chains,
/// content units, artifacts and publications.
///
/// Every method takes the connection lock for its own duration only, so
/// callers never hold it across an `.await`.
pub struct ContentStore {
    conn: Mutex<rusqlite::Connection>,
}

impl ContentStore {
    /// Open a store backed by a file on disk.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(format!("{}: {e}", parent.display())))?;
        }
        let conn = rusqlite::Connection::open(path).map_err(db)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(db)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(db)?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db)?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&mut self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .get_mut()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(db)?;
        schema::migrations()
            .to_latest(conn)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    /// Run `f` inside an immediate transaction; commits only if `f` succeeds.
    pub(crate) fn write<T, E>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db)?;
        let value = f(&tx)?;
        tx.commit().map_err(db)?;
        Ok(value)
    }

    // Remotes

    pub fn create_remote(&self, config: &RemoteConfig) -> Result<RemoteId, StoreError> {
        config
            .validate()
            .map_err(|e| StoreError::InvalidState(e.to_string()))?;
        let conn = self.conn()?;
        let (username, password) = split_credentials(config.credentials.as_ref());

        conn.execute(
            "INSERT INTO remotes (name, url, policy, username, password, download_concurrency)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                config.name,
                config.url,
                config.policy.as_str(),
                username,
                password,
                config.download_concurrency as i64,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::InvalidState(format!("remote {:?} already exists", config.name))
            } else {
                db(e)
            }
        })?;

        Ok(RemoteId::new(conn.last_insert_rowid()))
    }

    /// Replace a remote's configuration. Syncs already running keep the
    /// snapshot they started with.
    pub fn update_remote(&self, id: RemoteId, config: &RemoteConfig) -> Result<(), StoreError> {
        config
            .validate()
            .map_err(|e| StoreError::InvalidState(e.to_string()))?;
        let conn = self.conn()?;
        let (username, password) = split_credentials(config.credentials.as_ref());

        let changed = conn
            .execute(
                "UPDATE remotes
                 SET name = ?2, url = ?3, policy = ?4, username = ?5, password = ?6,
                     download_concurrency = ?7
                 WHERE id = ?1",
                rusqlite::params![
                    id.get(),
                    config.name,
                    config.url,
                    config.policy.as_str(),
                    username,
                    password,
                    config.download_concurrency as i64,
                ],
            )
            .map_err(db)?;

        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn remote(&self, id: RemoteId) -> Result<Remote, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {REMOTE_COLUMNS} FROM remotes WHERE id = ?1"),
            [id.get()],
            row_to_remote,
        )
        .optional()
        .map_err(db)?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn remote_by_name(&self, name: &str) -> Result<Remote, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {REMOTE_COLUMNS} FROM remotes WHERE name = ?1"),
            [name],
            row_to_remote,
        )
        .optional()
        .map_err(db)?
        .ok_or_else(|| StoreError::NotFound(format!("remote {name:?}")))
    }

    pub fn remotes(&self) -> Result<Vec<Remote>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {REMOTE_COLUMNS} FROM remotes ORDER BY name"))
            .map_err(db)?;
        let remotes = stmt
            .query_map([], row_to_remote)
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(remotes)
    }

    // Repositories

    /// Create a repository together with its empty version 0.
    pub fn create_repository(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<RepositoryId, StoreError> {
        self.write(|tx| {
            let now = now_epoch_secs();
            tx.execute(
                "INSERT INTO repositories (name, description, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![name, description, now],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::InvalidState(format!("repository {name:?} already exists"))
                } else {
                    db(e)
                }
            })?;
            let id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO repository_versions (repository_id, number, created_at)
                 VALUES (?1, 0, ?2)",
                rusqlite::params![id, now],
            )
            .map_err(db)?;

            Ok(RepositoryId::new(id))
        })
    }

    pub fn repository(&self, id: RepositoryId) -> Result<RepositoryView, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{REPOSITORY_SELECT} WHERE r.id = ?1"),
            [id.get()],
            row_to_repository,
        )
        .optional()
        .map_err(db)?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn repository_by_name(&self, name: &str) -> Result<RepositoryView, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{REPOSITORY_SELECT} WHERE r.name = ?1"),
            [name],
            row_to_repository,
        )
        .optional()
        .map_err(db)?
        .ok_or_else(|| StoreError::NotFound(format!("repository {name:?}")))
    }

    pub fn repositories(&self) -> Result<Vec<RepositoryView>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{REPOSITORY_SELECT} ORDER BY r.name"))
            .map_err(db)?;
        let repos = stmt
            .query_map([], row_to_repository)
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(repos)
    }

    /// Delete a repository, its versions and their publications. Content
    /// units stay behind until orphan cleanup.
    pub fn delete_repository(&self, id: RepositoryId) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM repositories WHERE id = ?1", [id.get()])
            .map_err(db)?;
        if deleted == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    // Publishers and publications

    pub fn create_publisher(
        &self,
        name: &str,
        manifest_name: Option<&str>,
    ) -> Result<PublisherId, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO publishers (name, manifest_name) VALUES (?1, ?2)",
            rusqlite::params![name, manifest_name.unwrap_or(DEFAULT_MANIFEST_NAME)],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::InvalidState(format!("publisher {name:?} already exists"))
            } else {
                db(e)
            }
        })?;
        Ok(PublisherId::new(conn.last_insert_rowid()))
    }

    pub fn publisher(&self, id: PublisherId) -> Result<Publisher, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, manifest_name FROM publishers WHERE id = ?1",
            [id.get()],
            |row| {
                Ok(Publisher {
                    id: PublisherId::new(row.get(0)?),
                    name: row.get(1)?,
                    manifest_name: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(db)?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn publisher_by_name(&self, name: &str) -> Result<Publisher, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, manifest_name FROM publishers WHERE name = ?1",
            [name],
            |row| {
                Ok(Publisher {
                    id: PublisherId::new(row.get(0)?),
                    name: row.get(1)?,
                    manifest_name: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(db)?
        .ok_or_else(|| StoreError::NotFound(format!("publisher {name:?}")))
    }

    /// Pin the repository's latest version in a new publication.
    pub fn publish(
        &self,
        publisher: PublisherId,
        repository: RepositoryId,
    ) -> Result<Publication, StoreError> {
        self.write(|tx| {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM publishers WHERE id = ?1",
                    [publisher.get()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db)?;
            if exists.is_none() {
                return Err(StoreError::NotFound(publisher.to_string()));
            }

            let (version_id, number): (i64, i64) = tx
                .query_row(
                    "SELECT id, number FROM repository_versions
                     WHERE repository_id = ?1
                     ORDER BY number DESC LIMIT 1",
                    [repository.get()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(db)?
                .ok_or_else(|| StoreError::NotFound(repository.to_string()))?;

            let now = now_epoch_secs();
            tx.execute(
                "INSERT INTO publications (publisher_id, version_id, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![publisher.get(), version_id, now],
            )
            .map_err(db)?;

            Ok(Publication {
                id: PublicationId::new(tx.last_insert_rowid()),
                publisher,
                version: VersionRef::new(repository, number as u64),
                created_at: now as u64,
            })
        })
    }

    /// Publications that pin `version`.
    pub fn publications(&self, version: VersionRef) -> Result<Vec<Publication>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT p.id, p.publisher_id, p.created_at
                 FROM publications p
                 JOIN repository_versions v ON v.id = p.version_id
                 WHERE v.repository_id = ?1 AND v.number = ?2
                 ORDER BY p.id",
            )
            .map_err(db)?;
        let publications = stmt
            .query_map(
                rusqlite::params![version.repository.get(), version.number as i64],
                |row| {
                    Ok(Publication {
                        id: PublicationId::new(row.get(0)?),
                        publisher: PublisherId::new(row.get(1)?),
                        version,
                        created_at: row.get::<_, i64>(2)? as u64,
                    })
                },
            )
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(publications)
    }
}

pub(crate) const REMOTE_COLUMNS: &str =
    "id, name, url, policy, username, password, download_concurrency";

const REPOSITORY_SELECT: &str = "SELECT r.id, r.name, r.description, r.created_at,
        (SELECT MAX(v.number) FROM repository_versions v WHERE v.repository_id = r.id)
     FROM repositories r";

pub(crate) fn row_to_remote(row: &rusqlite::Row) -> rusqlite::Result<Remote> {
    let policy: String = row.get(3)?;
    let policy: DownloadPolicy = policy.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    let username: Option<String> = row.get(4)?;
    let password: Option<String> = row.get(5)?;

    Ok(Remote {
        id: RemoteId::new(row.get(0)?),
        config: RemoteConfig {
            name: row.get(1)?,
            url: row.get(2)?,
            policy,
            credentials: username.map(|username| Credentials { username, password }),
            download_concurrency: row.get::<_, i64>(6)?.max(1) as usize,
        },
    })
}

fn row_to_repository(row: &rusqlite::Row) -> rusqlite::Result<RepositoryView> {
    let id = RepositoryId::new(row.get(0)?);
    let latest: Option<i64> = row.get(4)?;

    Ok(RepositoryView {
        id,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get::<_, i64>(3)? as u64,
        latest_version: VersionRef::new(id, latest.unwrap_or(0) as u64),
    })
}

fn split_credentials(creds: Option<&Credentials>) -> (Option<&str>, Option<&str>) {
    match creds {
        Some(c) => (Some(c.username.as_str()), c.password.as_deref()),
        None => (None, None),
    }
}

pub(crate) fn now_epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
