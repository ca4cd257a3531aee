use content_sync::{Fetcher, Manifest, Remote, SyncError};
use url::Url;

const USER_AGENT: &str = concat!("content-sync/", env!("CARGO_PKG_VERSION"));

/// HTTP transport for file remotes.
///
/// Downloads the manifest and artifact bytes as-is. It does not verify
/// checksums or decide what to download; that belongs to the sync.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_request(&self, remote: &Remote, url: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(url).header("User-Agent", USER_AGENT);

        if let Some(creds) = &remote.config.credentials {
            req = req.basic_auth(&creds.username, creds.password.as_deref());
        }

        req
    }

    async fn get_bytes(&self, remote: &Remote, url: &str) -> Result<Vec<u8>, SyncError> {
        let response = self
            .build_request(remote, url)
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnreachable(format!("GET {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SyncError::RemoteUnreachable(format!(
                "GET {url} returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::RemoteUnreachable(format!("failed to read body of {url}: {e}")))?;

        Ok(bytes.to_vec())
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    fn label(&self) -> &str {
        "http"
    }

    async fn fetch_manifest(&self, remote: &Remote) -> Result<Manifest, SyncError> {
        let url = &remote.config.url;
        tracing::debug!(remote = remote.name(), %url, "fetching manifest");

        let bytes = self.get_bytes(remote, url).await?;
        let text = String::from_utf8(bytes)
            .map_err(|e| SyncError::InvalidManifest(format!("{url} is not UTF-8: {e}")))?;

        Manifest::parse(&text)
    }

    async fn fetch_artifact(&self, remote: &Remote, url: &Url) -> Result<Vec<u8>, SyncError> {
        tracing::debug!(remote = remote.name(), %url, "fetching artifact");
        self.get_bytes(remote, url.as_str()).await
    }
}
