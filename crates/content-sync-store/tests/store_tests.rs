use content_sync::{
    ContentSet, DownloadPolicy, FILE_CONTENT_TYPE, ManifestEntry, Member, RemoteConfig, RemoteId,
    RepositoryId, SyncMode, VersionRef,
};
use content_sync_store::{ContentStore, Resolution, StoreError};

fn create_store() -> ContentStore {
    ContentStore::open_in_memory().unwrap()
}

fn resolve_all(store: &ContentStore, paths: &[&str]) -> ContentSet {
    paths
        .iter()
        .map(|path| {
            let entry = ManifestEntry::new(*path, "b".repeat(64), 4);
            match store.resolve(&entry).unwrap() {
                Resolution::Created(unit) | Resolution::Existing(unit) => {
                    (unit.id, Member::new(FILE_CONTENT_TYPE, *path))
                }
                Resolution::Conflict(rejected) => panic!("unexpected conflict: {rejected:?}"),
            }
        })
        .collect()
}

#[test]
fn remotes_round_trip_through_the_store() {
    let store = create_store();
    let config = RemoteConfig::new(
        "upstream",
        "http://example.test/PULP_MANIFEST",
        DownloadPolicy::Streamed,
    )
    .with_credentials("admin", Some("secret".to_owned()))
    .with_download_concurrency(4);

    let id = store.create_remote(&config).unwrap();
    let remote = store.remote(id).unwrap();

    assert_eq!(remote.id, id);
    assert_eq!(remote.config, config);
    assert_eq!(store.remote_by_name("upstream").unwrap().id, id);
}

#[test]
fn duplicate_remote_name_is_rejected() {
    let store = create_store();
    let config = RemoteConfig::new(
        "upstream",
        "http://example.test/PULP_MANIFEST",
        DownloadPolicy::Immediate,
    );
    store.create_remote(&config).unwrap();

    let result = store.create_remote(&config);
    assert!(matches!(result, Err(StoreError::InvalidState(_))));
}

#[test]
fn invalid_remote_config_is_rejected() {
    let store = create_store();
    let config = RemoteConfig::new(
        "upstream",
        "http://example.test/PULP_MANIFEST",
        DownloadPolicy::Immediate,
    )
    .with_download_concurrency(0);

    assert!(matches!(
        store.create_remote(&config),
        Err(StoreError::InvalidState(_))
    ));
}

#[test]
fn update_remote_replaces_configuration() {
    let store = create_store();
    let id = store
        .create_remote(&RemoteConfig::new(
            "upstream",
            "http://example.test/PULP_MANIFEST",
            DownloadPolicy::Immediate,
        ))
        .unwrap();

    let updated = RemoteConfig::new(
        "upstream",
        "http://mirror.test/PULP_MANIFEST",
        DownloadPolicy::OnDemand,
    );
    store.update_remote(id, &updated).unwrap();

    let remote = store.remote(id).unwrap();
    assert_eq!(remote.config.url, "http://mirror.test/PULP_MANIFEST");
    assert_eq!(remote.policy(), DownloadPolicy::OnDemand);
    assert!(remote.config.credentials.is_none());

    let missing = store.update_remote(RemoteId::new(99), &updated);
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[test]
fn new_repository_starts_at_empty_version_zero() {
    let store = create_store();
    let id = store.create_repository("files", Some("test files")).unwrap();

    let repo = store.repository(id).unwrap();
    assert_eq!(repo.name, "files");
    assert_eq!(repo.description.as_deref(), Some("test files"));
    assert_eq!(repo.latest_version, VersionRef::new(id, 0));

    let v0 = store.version(repo.latest_version).unwrap();
    assert_eq!(v0.content_count, 0);
    assert!(store.content_summary(repo.latest_version).unwrap().is_empty());
    assert!(store.added_content_summary(repo.latest_version).unwrap().is_empty());
}

#[test]
fn duplicate_repository_name_is_rejected() {
    let store = create_store();
    store.create_repository("files", None).unwrap();
    assert!(matches!(
        store.create_repository("files", None),
        Err(StoreError::InvalidState(_))
    ));
}

#[test]
fn repositories_are_listed_by_name() {
    let store = create_store();
    store.create_repository("zeta", None).unwrap();
    store.create_repository("alpha", None).unwrap();

    let names: Vec<String> = store
        .repositories()
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
    assert_eq!(store.repository_by_name("zeta").unwrap().name, "zeta");
}

#[test]
fn unknown_version_is_not_found() {
    let store = create_store();
    let repo = store.create_repository("files", None).unwrap();

    let missing = VersionRef::new(repo, 7);
    assert!(matches!(store.version(missing), Err(StoreError::NotFound(_))));
    assert!(matches!(
        store.delete_version(missing),
        Err(StoreError::NotFound(_))
    ));
    assert!(store.latest(RepositoryId::new(42)).unwrap().is_none());
}

#[test]
fn removed_summary_tracks_mirror_removals() {
    let store = create_store();
    let repo = store.create_repository("files", None).unwrap();

    store
        .build_version(repo, &resolve_all(&store, &["a", "b", "c"]), SyncMode::Mirror)
        .unwrap();
    let outcome = store
        .build_version(repo, &resolve_all(&store, &["a"]), SyncMode::Mirror)
        .unwrap();

    let v2 = outcome.version().reference;
    assert_eq!(
        store.removed_content_summary(v2).unwrap().get(FILE_CONTENT_TYPE),
        Some(&2)
    );
    assert!(store.added_content_summary(v2).unwrap().is_empty());

    let units = store.version_content(v2).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].relative_path(), "a");
}

#[test]
fn publishing_an_empty_repository_pins_version_zero() {
    let store = create_store();
    let repo = store.create_repository("files", None).unwrap();
    let publisher = store.create_publisher("default", Some("MANIFEST.csv")).unwrap();

    let publication = store.publish(publisher, repo).unwrap();
    assert_eq!(publication.version, VersionRef::new(repo, 0));
    assert_eq!(store.publications(publication.version).unwrap(), vec![publication]);
    assert_eq!(store.publisher(publisher).unwrap().manifest_name, "MANIFEST.csv");
}

#[test]
fn on_disk_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("content.db");

    let repo = {
        let store = ContentStore::open(&path).unwrap();
        let repo = store.create_repository("files", None).unwrap();
        store
            .build_version(repo, &resolve_all(&store, &["a", "b"]), SyncMode::Mirror)
            .unwrap();
        repo
    };

    let store = ContentStore::open(&path).unwrap();
    let latest = store.latest(repo).unwrap().unwrap();
    assert_eq!(latest.number(), 1);
    assert_eq!(latest.content_count, 2);
}

#[test]
fn orphan_report_serializes_to_json() {
    let report = content_sync_store::OrphanReport {
        units_removed: 2,
        artifacts_removed: 1,
    };
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["units_removed"], 2);
    assert_eq!(json["artifacts_removed"], 1);
}
