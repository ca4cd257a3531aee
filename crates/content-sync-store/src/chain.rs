//! Repository version chain.
//!
//! Versions are rows keyed by (repository, number). The latest version is
//! always `MAX(number)`; nothing stores it separately.

use content_sync::{
    ContentSet, ContentSummary, ContentUnit, ContentUnitId, Diff, Member, RemoteId, RepositoryId,
    SyncError, VersionPlan, VersionRef, diff,
};
use rusqlite::{Connection, OptionalExtension};

use crate::error::{StoreError, db, is_unique_violation};
use crate::index::{unit_at_path, version_units};
use crate::models::RepositoryVersion;
use crate::store::{ContentStore, now_epoch_secs};

pub(crate) fn latest_number(
    conn: &Connection,
    repository: RepositoryId,
) -> Result<Option<u64>, StoreError> {
    let latest: Option<i64> = conn
        .query_row(
            "SELECT MAX(number) FROM repository_versions WHERE repository_id = ?1",
            [repository.get()],
            |row| row.get(0),
        )
        .map_err(db)?;
    Ok(latest.map(|n| n as u64))
}

pub(crate) fn version_row_id(conn: &Connection, version: VersionRef) -> Result<i64, StoreError> {
    conn.query_row(
        "SELECT id FROM repository_versions WHERE repository_id = ?1 AND number = ?2",
        rusqlite::params![version.repository.get(), version.number as i64],
        |row| row.get(0),
    )
    .optional()
    .map_err(db)?
    .ok_or_else(|| StoreError::NotFound(version.to_string()))
}

pub(crate) fn version(
    conn: &Connection,
    version: VersionRef,
) -> Result<RepositoryVersion, StoreError> {
    conn.query_row(
        "SELECT v.created_at,
                (SELECT COUNT(*) FROM version_content c WHERE c.version_id = v.id)
         FROM repository_versions v
         WHERE v.repository_id = ?1 AND v.number = ?2",
        rusqlite::params![version.repository.get(), version.number as i64],
        |row| {
            Ok(RepositoryVersion {
                reference: version,
                created_at: row.get::<_, i64>(0)? as u64,
                content_count: row.get::<_, i64>(1)? as u64,
            })
        },
    )
    .optional()
    .map_err(db)?
    .ok_or_else(|| StoreError::NotFound(version.to_string()))
}

pub(crate) fn content_set(conn: &Connection, version: VersionRef) -> Result<ContentSet, StoreError> {
    let version_id = version_row_id(conn, version)?;
    let mut stmt = conn
        .prepare(
            "SELECT u.id, u.content_type, u.relative_path, c.remote_id
             FROM version_content c
             JOIN content_units u ON u.id = c.content_id
             WHERE c.version_id = ?1",
        )
        .map_err(db)?;

    let set = stmt
        .query_map([version_id], |row| {
            Ok((
                ContentUnitId::new(row.get(0)?),
                Member::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?)
                    .with_remote(row.get::<_, Option<i64>>(3)?.map(RemoteId::new)),
            ))
        })
        .map_err(db)?
        .collect::<Result<ContentSet, _>>()
        .map_err(db)?;
    Ok(set)
}

/// The remote a version member was synced from, if it is still configured.
pub(crate) fn member_remote(
    conn: &Connection,
    version_id: i64,
    content_id: ContentUnitId,
) -> Result<Option<RemoteId>, StoreError> {
    let remote: Option<Option<i64>> = conn
        .query_row(
            "SELECT remote_id FROM version_content WHERE version_id = ?1 AND content_id = ?2",
            rusqlite::params![version_id, content_id.get()],
            |row| row.get(0),
        )
        .optional()
        .map_err(db)?;
    Ok(remote.flatten().map(RemoteId::new))
}

/// The closest surviving version below `version`, if any.
fn predecessor(conn: &Connection, version: VersionRef) -> Result<Option<VersionRef>, StoreError> {
    let number: Option<i64> = conn
        .query_row(
            "SELECT MAX(number) FROM repository_versions
             WHERE repository_id = ?1 AND number < ?2",
            rusqlite::params![version.repository.get(), version.number as i64],
            |row| row.get(0),
        )
        .map_err(db)?;
    Ok(number.map(|n| VersionRef::new(version.repository, n as u64)))
}

/// Changes `version` introduced relative to its predecessor.
fn diff_from_predecessor(conn: &Connection, version: VersionRef) -> Result<Diff, StoreError> {
    let current = content_set(conn, version)?;
    let previous = match predecessor(conn, version)? {
        Some(prev) => content_set(conn, prev)?,
        None => ContentSet::new(),
    };
    Ok(diff(&previous, &current))
}

/// Insert the planned version with all of its memberships.
///
/// Fails with [`SyncError::ConcurrentCommitConflict`] when the chain moved
/// past the plan's base, so the caller can re-plan against the new latest.
pub(crate) fn append(
    conn: &Connection,
    repository: RepositoryId,
    plan: &VersionPlan,
) -> Result<RepositoryVersion, SyncError> {
    let latest = latest_number(conn, repository)?
        .ok_or_else(|| SyncError::NotFound(repository.to_string()))?;

    if latest != plan.base {
        return Err(SyncError::ConcurrentCommitConflict {
            repository,
            expected: plan.base,
            found: latest,
        });
    }

    let number = plan.next_number();
    let now = now_epoch_secs();
    conn.execute(
        "INSERT INTO repository_versions (repository_id, number, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![repository.get(), number as i64, now],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            SyncError::ConcurrentCommitConflict {
                repository,
                expected: plan.base,
                found: number,
            }
        } else {
            SyncError::from(db(e))
        }
    })?;
    let version_id = conn.last_insert_rowid();

    let mut insert = conn
        .prepare(
            "INSERT INTO version_content (version_id, content_id, remote_id) VALUES (?1, ?2, ?3)",
        )
        .map_err(db)?;
    for (content_id, member) in plan.content.iter() {
        insert
            .execute(rusqlite::params![
                version_id,
                content_id.get(),
                member.remote.map(RemoteId::get)
            ])
            .map_err(db)?;
    }

    Ok(RepositoryVersion {
        reference: VersionRef::new(repository, number),
        created_at: now as u64,
        content_count: plan.content.len() as u64,
    })
}

impl ContentStore {
    /// The latest version, or `None` if the repository does not exist.
    pub fn latest(&self, repository: RepositoryId) -> Result<Option<RepositoryVersion>, StoreError> {
        let conn = self.conn()?;
        match latest_number(&conn, repository)? {
            Some(number) => Ok(Some(version(&conn, VersionRef::new(repository, number))?)),
            None => Ok(None),
        }
    }

    pub fn version(&self, reference: VersionRef) -> Result<RepositoryVersion, StoreError> {
        let conn = self.conn()?;
        version(&conn, reference)
    }

    /// All surviving versions, oldest first.
    pub fn versions(&self, repository: RepositoryId) -> Result<Vec<RepositoryVersion>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT v.number, v.created_at,
                        (SELECT COUNT(*) FROM version_content c WHERE c.version_id = v.id)
                 FROM repository_versions v
                 WHERE v.repository_id = ?1
                 ORDER BY v.number",
            )
            .map_err(db)?;
        let versions = stmt
            .query_map([repository.get()], |row| {
                Ok(RepositoryVersion {
                    reference: VersionRef::new(repository, row.get::<_, i64>(0)? as u64),
                    created_at: row.get::<_, i64>(1)? as u64,
                    content_count: row.get::<_, i64>(2)? as u64,
                })
            })
            .map_err(db)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db)?;
        Ok(versions)
    }

    pub fn content_set(&self, reference: VersionRef) -> Result<ContentSet, StoreError> {
        let conn = self.conn()?;
        content_set(&conn, reference)
    }

    /// Full content units of a version, ordered by relative path.
    pub fn version_content(&self, reference: VersionRef) -> Result<Vec<ContentUnit>, StoreError> {
        let conn = self.conn()?;
        let version_id = version_row_id(&conn, reference)?;
        version_units(&conn, version_id)
    }

    /// The unit a version holds under `relative_path`.
    pub fn find_in_version(
        &self,
        reference: VersionRef,
        relative_path: &str,
    ) -> Result<ContentUnit, StoreError> {
        let conn = self.conn()?;
        let version_id = version_row_id(&conn, reference)?;
        unit_at_path(&conn, version_id, relative_path)?
            .ok_or_else(|| StoreError::NotFound(format!("{reference}{relative_path}")))
    }

    /// Units added and removed going from `from` to `to`.
    pub fn diff(&self, from: VersionRef, to: VersionRef) -> Result<Diff, StoreError> {
        let conn = self.conn()?;
        let from = content_set(&conn, from)?;
        let to = content_set(&conn, to)?;
        Ok(diff(&from, &to))
    }

    pub fn content_summary(&self, reference: VersionRef) -> Result<ContentSummary, StoreError> {
        Ok(self.content_set(reference)?.summary())
    }

    /// Per-type counts of units added relative to the previous version.
    pub fn added_content_summary(
        &self,
        reference: VersionRef,
    ) -> Result<ContentSummary, StoreError> {
        let conn = self.conn()?;
        Ok(diff_from_predecessor(&conn, reference)?.added.summary())
    }

    pub fn removed_content_summary(
        &self,
        reference: VersionRef,
    ) -> Result<ContentSummary, StoreError> {
        let conn = self.conn()?;
        Ok(diff_from_predecessor(&conn, reference)?.removed.summary())
    }

    /// Delete a version that is neither the latest nor published.
    pub fn delete_version(&self, reference: VersionRef) -> Result<(), StoreError> {
        self.write(|tx| {
            let version_id = version_row_id(tx, reference)?;
            let latest = latest_number(tx, reference.repository)?;
            if latest == Some(reference.number) {
                return Err(StoreError::InvalidState(format!(
                    "{reference} is the latest version"
                )));
            }

            let publications: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM publications WHERE version_id = ?1",
                    [version_id],
                    |row| row.get(0),
                )
                .map_err(db)?;
            if publications > 0 {
                return Err(StoreError::InvalidState(format!(
                    "{reference} is referenced by {publications} publication(s)"
                )));
            }

            tx.execute(
                "DELETE FROM repository_versions WHERE id = ?1",
                [version_id],
            )
            .map_err(db)?;
            Ok(())
        })
    }
}
