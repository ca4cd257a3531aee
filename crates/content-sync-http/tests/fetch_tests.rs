use content_sync::{DownloadPolicy, Fetcher, Remote, RemoteConfig, RemoteId, SyncError};
use content_sync_http::HttpFetcher;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIGEST_A: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

fn remote_for(server: &MockServer) -> Remote {
    Remote {
        id: RemoteId::new(1),
        config: RemoteConfig::new(
            "fixtures",
            format!("{}/file/PULP_MANIFEST", server.uri()),
            DownloadPolicy::Immediate,
        ),
    }
}

#[tokio::test]
async fn fetch_manifest_parses_entries() {
    let server = MockServer::start().await;
    let body = format!("1.iso,{DIGEST_A},5\nsub/2.iso,{DIGEST_A},5\n");

    Mock::given(method("GET"))
        .and(path("/file/PULP_MANIFEST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let manifest = HttpFetcher::new()
        .fetch_manifest(&remote_for(&server))
        .await
        .unwrap();

    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest.entries[1].relative_path, "sub/2.iso");
    assert_eq!(manifest.entries[1].size, 5);
}

#[tokio::test]
async fn fetch_manifest_maps_404_to_unreachable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/file/PULP_MANIFEST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let result = HttpFetcher::new().fetch_manifest(&remote_for(&server)).await;

    match result {
        Err(SyncError::RemoteUnreachable(msg)) => assert!(msg.contains("404")),
        other => panic!("expected RemoteUnreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_manifest_rejects_malformed_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/file/PULP_MANIFEST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = HttpFetcher::new().fetch_manifest(&remote_for(&server)).await;
    assert!(matches!(result, Err(SyncError::InvalidManifest(_))));
}

#[tokio::test]
async fn fetch_manifest_unreachable_host() {
    let remote = Remote {
        id: RemoteId::new(1),
        config: RemoteConfig::new(
            "nowhere",
            "http://127.0.0.1:1/PULP_MANIFEST",
            DownloadPolicy::Immediate,
        ),
    };

    let result = HttpFetcher::new().fetch_manifest(&remote).await;
    assert!(matches!(result, Err(SyncError::RemoteUnreachable(_))));
}

#[tokio::test]
async fn fetch_artifact_returns_raw_bytes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/file/1.iso"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let remote = remote_for(&server);
    let url = remote.artifact_url("1.iso").unwrap();
    let bytes = HttpFetcher::new().fetch_artifact(&remote, &url).await.unwrap();

    assert_eq!(bytes, b"hello");
}

#[tokio::test]
async fn fetch_artifact_server_error_is_unreachable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/file/1.iso"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let remote = remote_for(&server);
    let url = remote.artifact_url("1.iso").unwrap();
    let result = HttpFetcher::new().fetch_artifact(&remote, &url).await;

    assert!(matches!(result, Err(SyncError::RemoteUnreachable(_))));
}

#[tokio::test]
async fn sends_basic_auth_when_configured() {
    let server = MockServer::start().await;

    // base64("admin:secret")
    Mock::given(method("GET"))
        .and(path("/file/PULP_MANIFEST"))
        .and(header("authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(1)
        .mount(&server)
        .await;

    let mut remote = remote_for(&server);
    remote.config = remote
        .config
        .with_credentials("admin", Some("secret".to_owned()));

    let manifest = HttpFetcher::new().fetch_manifest(&remote).await.unwrap();
    assert!(manifest.is_empty());
}
