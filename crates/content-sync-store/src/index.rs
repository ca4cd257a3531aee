//! Content deduplication index.
//!
//! Maps natural keys to stored content units. Resolving an entry never
//! creates a second unit for a key that already exists; entries that
//! disagree with what is on record are rejected rather than stored.

use std::collections::HashMap;

use content_sync::{
    Artifact, ArtifactId, ArtifactSource, ContentSet, ContentUnit, ContentUnitId,
    FILE_CONTENT_TYPE, Manifest, ManifestEntry, Member, NaturalKey, RejectedUnit, RemoteId,
    RemoteLocator, VersionRef,
};
use rusqlite::{Connection, OptionalExtension};

use crate::chain::{member_remote, version_row_id};
use crate::error::{StoreError, db};
use crate::store::{ContentStore, REMOTE_COLUMNS, now_epoch_secs, row_to_remote};

/// Outcome of resolving one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Existing(ContentUnit),
    Created(ContentUnit),
    Conflict(RejectedUnit),
}

/// A manifest mapped onto stored content units.
#[derive(Debug, Clone, Default)]
pub struct ResolvedManifest {
    pub content: ContentSet,
    pub units: Vec<ContentUnit>,
    pub created: u64,
    pub rejected: Vec<RejectedUnit>,
}

pub(crate) enum Lookup {
    Missing,
    Known(ContentUnit),
    Conflict(String),
}

/// Split a manifest into entries to resolve and entries rejected outright.
///
/// A repeated identical entry is collapsed. A later entry reusing a relative
/// path with a different digest or size is rejected, since a version holds
/// at most one unit per relative path.
pub fn dedupe_manifest(manifest: &Manifest) -> (Vec<ManifestEntry>, Vec<RejectedUnit>) {
    let mut seen: HashMap<&str, &ManifestEntry> = HashMap::new();
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for entry in &manifest.entries {
        match seen.get(entry.relative_path.as_str()) {
            None => {
                seen.insert(&entry.relative_path, entry);
                accepted.push(entry.clone());
            }
            Some(first) if *first == entry => {}
            Some(first) => rejected.push(RejectedUnit::new(
                entry.clone(),
                format!(
                    "relative path already listed with digest {} and size {}",
                    content_sync::content::short_digest(&first.digest),
                    first.size
                ),
            )),
        }
    }

    (accepted, rejected)
}

pub(crate) fn lookup(conn: &Connection, entry: &ManifestEntry) -> Result<Lookup, StoreError> {
    let Some(unit) = find_unit(conn, FILE_CONTENT_TYPE, &entry.natural_key())? else {
        return Ok(Lookup::Missing);
    };

    if unit.size != entry.size {
        return Ok(Lookup::Conflict(format!(
            "stored unit declares {} bytes, manifest declares {}",
            unit.size, entry.size
        )));
    }

    if let Some(artifact_id) = unit.artifact {
        let artifact = artifact(conn, artifact_id)?
            .ok_or_else(|| StoreError::NotFound(artifact_id.to_string()))?;
        if !artifact.sha256.eq_ignore_ascii_case(&entry.digest) {
            return Ok(Lookup::Conflict(format!(
                "stored artifact sha256 {} does not match declared digest",
                artifact.sha256
            )));
        }
    }

    Ok(Lookup::Known(unit))
}

pub(crate) fn resolve(conn: &Connection, entry: &ManifestEntry) -> Result<Resolution, StoreError> {
    match lookup(conn, entry)? {
        Lookup::Known(unit) => Ok(Resolution::Existing(unit)),
        Lookup::Conflict(reason) => Ok(Resolution::Conflict(RejectedUnit::new(
            entry.clone(),
            reason,
        ))),
        Lookup::Missing => {
            // Bytes with this digest may already be stored for another path.
            let artifact = artifact_by_sha256(conn, &entry.digest)?
                .filter(|a| a.size == entry.size)
                .map(|a| a.id);
            let now = now_epoch_secs();

            conn.execute(
                "INSERT INTO content_units
                    (content_type, relative_path, digest, size, created_at, artifact_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    FILE_CONTENT_TYPE,
                    entry.relative_path,
                    entry.digest,
                    entry.size as i64,
                    now,
                    artifact.map(ArtifactId::get),
                ],
            )
            .map_err(db)?;

            Ok(Resolution::Created(ContentUnit {
                id: ContentUnitId::new(conn.last_insert_rowid()),
                content_type: FILE_CONTENT_TYPE.to_owned(),
                key: entry.natural_key(),
                size: entry.size,
                created_at: now as u64,
                artifact,
            }))
        }
    }
}

pub(crate) fn resolve_manifest(
    conn: &Connection,
    manifest: &Manifest,
) -> Result<ResolvedManifest, StoreError> {
    let (accepted, mut rejected) = dedupe_manifest(manifest);
    let mut resolved = ResolvedManifest::default();

    for entry in &accepted {
        let unit = match resolve(conn, entry)? {
            Resolution::Existing(unit) => unit,
            Resolution::Created(unit) => {
                resolved.created += 1;
                unit
            }
            Resolution::Conflict(unit) => {
                tracing::warn!(
                    relative_path = %unit.entry.relative_path,
                    reason = %unit.reason,
                    "rejecting conflicting content unit"
                );
                rejected.push(unit);
                continue;
            }
        };

        resolved.content.insert(
            unit.id,
            Member::new(&unit.content_type, unit.relative_path()),
        );
        resolved.units.push(unit);
    }

    resolved.rejected = rejected;
    Ok(resolved)
}

const UNIT_COLUMNS: &str =
    "id, content_type, relative_path, digest, size, created_at, artifact_id";

fn row_to_unit(row: &rusqlite::Row) -> rusqlite::Result<ContentUnit> {
    let artifact: Option<i64> = row.get(6)?;
    Ok(ContentUnit {
        id: ContentUnitId::new(row.get(0)?),
        content_type: row.get(1)?,
        key: NaturalKey::new(row.get::<_, String>(2)?, row.get::<_, String>(3)?),
        size: row.get::<_, i64>(4)? as u64,
        created_at: row.get::<_, i64>(5)? as u64,
        artifact: artifact.map(ArtifactId::new),
    })
}

fn row_to_artifact(row: &rusqlite::Row) -> rusqlite::Result<Artifact> {
    Ok(Artifact {
        id: ArtifactId::new(row.get(0)?),
        sha256: row.get(1)?,
        size: row.get::<_, i64>(2)? as u64,
        storage_path: row.get(3)?,
    })
}

pub(crate) fn find_unit(
    conn: &Connection,
    content_type: &str,
    key: &NaturalKey,
) -> Result<Option<ContentUnit>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {UNIT_COLUMNS} FROM content_units
             WHERE content_type = ?1 AND relative_path = ?2 AND digest = ?3"
        ),
        rusqlite::params![content_type, key.relative_path, key.digest],
        row_to_unit,
    )
    .optional()
    .map_err(db)
}

pub(crate) fn unit(conn: &Connection, id: ContentUnitId) -> Result<Option<ContentUnit>, StoreError> {
    conn.query_row(
        &format!("SELECT {UNIT_COLUMNS} FROM content_units WHERE id = ?1"),
        [id.get()],
        row_to_unit,
    )
    .optional()
    .map_err(db)
}

/// Units that are members of a version, in relative-path order.
pub(crate) fn version_units(
    conn: &Connection,
    version_id: i64,
) -> Result<Vec<ContentUnit>, StoreError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {UNIT_COLUMNS} FROM content_units
             WHERE id IN (SELECT content_id FROM version_content WHERE version_id = ?1)
             ORDER BY relative_path"
        ))
        .map_err(db)?;
    let units = stmt
        .query_map([version_id], row_to_unit)
        .map_err(db)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db)?;
    Ok(units)
}

pub(crate) fn artifact(conn: &Connection, id: ArtifactId) -> Result<Option<Artifact>, StoreError> {
    conn.query_row(
        "SELECT id, sha256, size, storage_path FROM artifacts WHERE id = ?1",
        [id.get()],
        row_to_artifact,
    )
    .optional()
    .map_err(db)
}

pub(crate) fn artifact_by_sha256(
    conn: &Connection,
    sha256: &str,
) -> Result<Option<Artifact>, StoreError> {
    conn.query_row(
        "SELECT id, sha256, size, storage_path FROM artifacts WHERE sha256 = ?1",
        [sha256],
        row_to_artifact,
    )
    .optional()
    .map_err(db)
}

/// Record stored bytes and link them to every unit with that digest that
/// has no artifact yet.
pub(crate) fn attach_artifact(
    conn: &Connection,
    sha256: &str,
    size: u64,
    storage_path: &str,
) -> Result<Artifact, StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO artifacts (sha256, size, storage_path) VALUES (?1, ?2, ?3)",
        rusqlite::params![sha256, size as i64, storage_path],
    )
    .map_err(db)?;

    let artifact = artifact_by_sha256(conn, sha256)?
        .ok_or_else(|| StoreError::NotFound(format!("artifact {sha256}")))?;

    conn.execute(
        "UPDATE content_units SET artifact_id = ?1
         WHERE digest = ?2 AND size = ?3 AND artifact_id IS NULL",
        rusqlite::params![artifact.id.get(), sha256, size as i64],
    )
    .map_err(db)?;

    Ok(artifact)
}

/// Link units still lacking bytes to artifacts already in storage.
pub(crate) fn link_stored_artifacts(
    conn: &Connection,
    units: &[ContentUnit],
) -> Result<(), StoreError> {
    let mut stmt = conn
        .prepare(
            "UPDATE content_units
             SET artifact_id = (
                 SELECT a.id FROM artifacts a
                 WHERE a.sha256 = content_units.digest AND a.size = content_units.size
             )
             WHERE id = ?1 AND artifact_id IS NULL",
        )
        .map_err(db)?;
    for unit in units.iter().filter(|u| !u.has_artifact()) {
        stmt.execute([unit.id.get()]).map_err(db)?;
    }
    Ok(())
}

/// The member of a version stored under `relative_path`.
pub(crate) fn unit_at_path(
    conn: &Connection,
    version_id: i64,
    relative_path: &str,
) -> Result<Option<ContentUnit>, StoreError> {
    conn.query_row(
        &format!(
            "SELECT {UNIT_COLUMNS} FROM content_units
             WHERE relative_path = ?2
               AND id IN (SELECT content_id FROM version_content WHERE version_id = ?1)"
        ),
        rusqlite::params![version_id, relative_path],
        row_to_unit,
    )
    .optional()
    .map_err(db)
}

pub(crate) fn record_remote_artifact(
    conn: &Connection,
    unit: &ContentUnit,
    remote: RemoteId,
    url: &str,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO remote_artifacts (content_id, remote_id, url, sha256, size)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (content_id, remote_id) DO UPDATE SET url = excluded.url",
        rusqlite::params![
            unit.id.get(),
            remote.get(),
            url,
            unit.digest(),
            unit.size as i64
        ],
    )
    .map_err(db)?;
    Ok(())
}

/// Where `remote` serves a unit's bytes, if it ever listed the unit.
pub(crate) fn remote_locator(
    conn: &Connection,
    unit: &ContentUnit,
    remote: RemoteId,
) -> Result<Option<RemoteLocator>, StoreError> {
    let row = conn
        .query_row(
            "SELECT url, sha256, size FROM remote_artifacts
             WHERE content_id = ?1 AND remote_id = ?2",
            rusqlite::params![unit.id.get(), remote.get()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()
        .map_err(db)?;

    let Some((url, sha256, size)) = row else {
        return Ok(None);
    };

    let remote = conn
        .query_row(
            &format!("SELECT {REMOTE_COLUMNS} FROM remotes WHERE id = ?1"),
            [remote.get()],
            row_to_remote,
        )
        .map_err(db)?;

    Ok(Some(RemoteLocator {
        remote,
        relative_path: unit.relative_path().to_owned(),
        url,
        sha256,
        size: size as u64,
    }))
}

impl ContentStore {
    /// Resolve one entry against the index, creating the unit if it is new.
    pub fn resolve(&self, entry: &ManifestEntry) -> Result<Resolution, StoreError> {
        self.write(|tx| resolve(tx, entry))
    }

    pub fn content_unit(&self, id: ContentUnitId) -> Result<ContentUnit, StoreError> {
        let conn = self.conn()?;
        unit(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn find_content(&self, key: &NaturalKey) -> Result<Option<ContentUnit>, StoreError> {
        let conn = self.conn()?;
        find_unit(&conn, FILE_CONTENT_TYPE, key)
    }

    pub fn content_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM content_units", [], |row| row.get(0))
            .map_err(db)?;
        Ok(count as u64)
    }

    /// Entries whose bytes are not yet in local storage, one per digest.
    /// Entries that would be rejected during resolution are left out.
    pub fn missing_artifacts(
        &self,
        entries: &[ManifestEntry],
    ) -> Result<Vec<ManifestEntry>, StoreError> {
        let conn = self.conn()?;
        let mut seen = std::collections::HashSet::new();
        let mut missing = Vec::new();

        for entry in entries {
            let needs_bytes = match lookup(&conn, entry)? {
                Lookup::Missing => true,
                Lookup::Known(unit) => !unit.has_artifact(),
                Lookup::Conflict(_) => false,
            };
            if !needs_bytes || !seen.insert(entry.digest.clone()) {
                continue;
            }
            if artifact_by_sha256(&conn, &entry.digest)?.is_some_and(|a| a.size == entry.size) {
                continue;
            }
            missing.push(entry.clone());
        }

        Ok(missing)
    }

    /// Record bytes that have just been written to storage.
    pub fn attach_artifact(
        &self,
        sha256: &str,
        size: u64,
        storage_path: &str,
    ) -> Result<Artifact, StoreError> {
        self.write(|tx| attach_artifact(tx, sha256, size, storage_path))
    }

    pub fn artifact_by_sha256(&self, sha256: &str) -> Result<Option<Artifact>, StoreError> {
        let conn = self.conn()?;
        artifact_by_sha256(&conn, sha256)
    }

    /// How a read of `unit` as a member of `version` should be served, if
    /// it can be at all.
    ///
    /// Stored bytes are always served locally. Otherwise the read goes to
    /// the remote that brought the unit into `version`, under that remote's
    /// download policy.
    pub fn artifact_source(
        &self,
        version: VersionRef,
        unit: &ContentUnit,
    ) -> Result<Option<ArtifactSource>, StoreError> {
        let conn = self.conn()?;

        if let Some(artifact_id) = unit.artifact
            && let Some(artifact) = artifact(&conn, artifact_id)?
        {
            return Ok(Some(ArtifactSource::Eager(artifact)));
        }

        let version_id = version_row_id(&conn, version)?;
        let Some(remote) = member_remote(&conn, version_id, unit.id)? else {
            return Ok(None);
        };
        Ok(remote_locator(&conn, unit, remote)?.map(ArtifactSource::deferred))
    }

    /// Delete content units no version references, then artifacts no unit
    /// references. Returns the number of units removed and the storage
    /// paths of the artifacts removed.
    pub fn remove_orphans(&self) -> Result<(u64, Vec<String>), StoreError> {
        self.write(|tx| {
            let units = tx
                .execute(
                    "DELETE FROM content_units
                     WHERE id NOT IN (SELECT content_id FROM version_content)",
                    [],
                )
                .map_err(db)?;

            let paths = {
                let mut stmt = tx
                    .prepare(
                        "SELECT storage_path FROM artifacts
                         WHERE id NOT IN (
                             SELECT artifact_id FROM content_units WHERE artifact_id IS NOT NULL
                         )",
                    )
                    .map_err(db)?;
                stmt.query_map([], |row| row.get::<_, String>(0))
                    .map_err(db)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(db)?
            };

            tx.execute(
                "DELETE FROM artifacts
                 WHERE id NOT IN (
                     SELECT artifact_id FROM content_units WHERE artifact_id IS NOT NULL
                 )",
                [],
            )
            .map_err(db)?;

            Ok((units as u64, paths))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(c: char) -> String {
        c.to_string().repeat(64)
    }

    fn entry(path: &str, c: char, size: u64) -> ManifestEntry {
        ManifestEntry::new(path, digest(c), size)
    }

    #[test]
    fn dedupe_collapses_identical_entries() {
        let manifest = Manifest::new(vec![entry("a", 'a', 1), entry("a", 'a', 1)]);
        let (accepted, rejected) = dedupe_manifest(&manifest);
        assert_eq!(accepted.len(), 1);
        assert!(rejected.is_empty());
    }

    #[test]
    fn dedupe_rejects_second_digest_for_same_path() {
        let manifest = Manifest::new(vec![entry("a", 'a', 1), entry("a", 'b', 1)]);
        let (accepted, rejected) = dedupe_manifest(&manifest);
        assert_eq!(accepted, vec![entry("a", 'a', 1)]);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].entry.digest, digest('b'));
    }

    #[test]
    fn resolve_creates_then_returns_existing() {
        let store = ContentStore::open_in_memory().unwrap();
        let e = entry("1.iso", 'a', 10);

        let created = match store.resolve(&e).unwrap() {
            Resolution::Created(unit) => unit,
            other => panic!("expected Created, got {other:?}"),
        };

        let second = store.resolve(&e).unwrap();
        assert_eq!(second, Resolution::Existing(created));
        assert_eq!(store.content_count().unwrap(), 1);
    }

    #[test]
    fn resolve_flags_size_conflict() {
        let store = ContentStore::open_in_memory().unwrap();
        store.resolve(&entry("1.iso", 'a', 10)).unwrap();

        let result = store.resolve(&entry("1.iso", 'a', 11)).unwrap();
        assert!(matches!(result, Resolution::Conflict(_)));
        assert_eq!(store.content_count().unwrap(), 1);
    }

    #[test]
    fn same_digest_different_path_is_a_distinct_unit() {
        let store = ContentStore::open_in_memory().unwrap();
        store.resolve(&entry("1.iso", 'a', 10)).unwrap();
        store.resolve(&entry("copy/1.iso", 'a', 10)).unwrap();
        assert_eq!(store.content_count().unwrap(), 2);
    }

    #[test]
    fn new_unit_links_existing_artifact_with_same_digest() {
        let store = ContentStore::open_in_memory().unwrap();
        let artifact = store.attach_artifact(&digest('a'), 10, "aa/aaaa").unwrap();

        let Resolution::Created(unit) = store.resolve(&entry("1.iso", 'a', 10)).unwrap() else {
            panic!("expected Created");
        };
        assert_eq!(unit.artifact, Some(artifact.id));
    }

    #[test]
    fn attach_links_units_waiting_for_bytes() {
        let store = ContentStore::open_in_memory().unwrap();
        let Resolution::Created(unit) = store.resolve(&entry("1.iso", 'a', 10)).unwrap() else {
            panic!("expected Created");
        };
        assert!(!unit.has_artifact());

        let artifact = store.attach_artifact(&digest('a'), 10, "aa/aaaa").unwrap();
        let unit = store.content_unit(unit.id).unwrap();
        assert_eq!(unit.artifact, Some(artifact.id));
    }

    #[test]
    fn missing_artifacts_skips_stored_and_duplicate_digests() {
        let store = ContentStore::open_in_memory().unwrap();
        store.attach_artifact(&digest('a'), 1, "aa/aaaa").unwrap();

        let entries = vec![
            entry("a", 'a', 1),
            entry("b", 'b', 2),
            entry("b-copy", 'b', 2),
        ];
        let missing = store.missing_artifacts(&entries).unwrap();
        assert_eq!(missing, vec![entry("b", 'b', 2)]);
    }
}
