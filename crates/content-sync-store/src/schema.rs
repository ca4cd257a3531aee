use rusqlite_migration::{M, Migrations};

pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "CREATE TABLE remotes (
            id                    INTEGER PRIMARY KEY,
            name                  TEXT NOT NULL UNIQUE,
            url                   TEXT NOT NULL,
            policy                TEXT NOT NULL,
            username              TEXT,
            password              TEXT,
            download_concurrency  INTEGER NOT NULL DEFAULT 10
        );

        CREATE TABLE repositories (
            id           INTEGER PRIMARY KEY,
            name         TEXT NOT NULL UNIQUE,
            description  TEXT,
            created_at   INTEGER NOT NULL
        );

        CREATE TABLE repository_versions (
            id             INTEGER PRIMARY KEY,
            repository_id  INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
            number         INTEGER NOT NULL,
            created_at     INTEGER NOT NULL,
            UNIQUE (repository_id, number)
        );

        CREATE TABLE artifacts (
            id            INTEGER PRIMARY KEY,
            sha256        TEXT NOT NULL UNIQUE,
            size          INTEGER NOT NULL,
            storage_path  TEXT NOT NULL
        );

        CREATE TABLE content_units (
            id             INTEGER PRIMARY KEY,
            content_type   TEXT NOT NULL,
            relative_path  TEXT NOT NULL,
            digest         TEXT NOT NULL,
            size           INTEGER NOT NULL,
            created_at     INTEGER NOT NULL,
            artifact_id    INTEGER REFERENCES artifacts(id) ON DELETE SET NULL,
            UNIQUE (content_type, relative_path, digest)
        );

        CREATE TABLE version_content (
            version_id  INTEGER NOT NULL REFERENCES repository_versions(id) ON DELETE CASCADE,
            content_id  INTEGER NOT NULL REFERENCES content_units(id),
            remote_id   INTEGER REFERENCES remotes(id) ON DELETE SET NULL,
            PRIMARY KEY (version_id, content_id)
        );

        CREATE TABLE remote_artifacts (
            content_id  INTEGER NOT NULL REFERENCES content_units(id) ON DELETE CASCADE,
            remote_id   INTEGER NOT NULL REFERENCES remotes(id) ON DELETE CASCADE,
            url         TEXT NOT NULL,
            sha256      TEXT NOT NULL,
            size        INTEGER NOT NULL,
            PRIMARY KEY (content_id, remote_id)
        );

        CREATE TABLE publishers (
            id             INTEGER PRIMARY KEY,
            name           TEXT NOT NULL UNIQUE,
            manifest_name  TEXT NOT NULL
        );

        CREATE TABLE publications (
            id            INTEGER PRIMARY KEY,
            publisher_id  INTEGER NOT NULL REFERENCES publishers(id) ON DELETE CASCADE,
            version_id    INTEGER NOT NULL REFERENCES repository_versions(id) ON DELETE CASCADE,
            created_at    INTEGER NOT NULL
        );

        CREATE INDEX idx_version_content_content ON version_content(content_id);
        CREATE INDEX idx_content_units_digest ON content_units(digest);
        CREATE INDEX idx_publications_version ON publications(version_id);",
    )])
}
