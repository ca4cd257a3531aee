use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use url::Url;

use crate::checksum::sha256_hex;
use crate::{Fetcher, Manifest, ManifestEntry, Remote, SyncError};

/// In-memory upstream for testing. Serves manifest text and artifact bytes
/// by URL and counts every request.
pub struct InMemoryFetcher {
    label: String,
    artifact_delay: Option<Duration>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    documents: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    requests: HashMap<String, usize>,
}

impl InMemoryFetcher {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            artifact_delay: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Delay every artifact response, so concurrent readers overlap.
    pub fn with_artifact_delay(mut self, delay: Duration) -> Self {
        self.artifact_delay = Some(delay);
        self
    }

    /// Serve `bytes` at `url`.
    pub fn serve(&self, url: &str, bytes: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().unwrap();
        state.documents.insert(url.to_owned(), bytes.into());
    }

    /// Serve a manifest at `manifest_url` listing `files`, and each file's
    /// bytes next to it. Returns the manifest that was published.
    pub fn publish(&self, manifest_url: &str, files: &[(&str, &[u8])]) -> Manifest {
        let base = Url::parse(manifest_url).unwrap();
        let mut entries = Vec::new();

        for (path, bytes) in files {
            let url = base.join(path).unwrap();
            self.serve(url.as_str(), bytes.to_vec());
            entries.push(ManifestEntry::new(*path, sha256_hex(bytes), bytes.len() as u64));
        }

        let manifest = Manifest::new(entries);
        self.serve(manifest_url, manifest.render());
        manifest
    }

    /// Make every request for `url` fail as unreachable.
    pub fn fail(&self, url: &str) {
        self.state.lock().unwrap().failing.insert(url.to_owned());
    }

    pub fn heal(&self, url: &str) {
        self.state.lock().unwrap().failing.remove(url);
    }

    /// Number of requests made for `url`, including failed ones.
    pub fn requests_for(&self, url: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Total requests across all URLs.
    pub fn total_requests(&self) -> usize {
        self.state.lock().unwrap().requests.values().sum()
    }

    fn get(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        let mut state = self.state.lock().unwrap();
        *state.requests.entry(url.to_owned()).or_insert(0) += 1;

        if state.failing.contains(url) {
            return Err(SyncError::RemoteUnreachable(format!("{url}: connection refused")));
        }

        state
            .documents
            .get(url)
            .cloned()
            .ok_or_else(|| SyncError::RemoteUnreachable(format!("{url}: HTTP 404 Not Found")))
    }
}

#[async_trait::async_trait]
impl Fetcher for InMemoryFetcher {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_manifest(&self, remote: &Remote) -> Result<Manifest, SyncError> {
        let bytes = self.get(&remote.config.url)?;
        let text = String::from_utf8(bytes)
            .map_err(|e| SyncError::InvalidManifest(format!("not UTF-8: {e}")))?;
        Manifest::parse(&text)
    }

    async fn fetch_artifact(&self, _remote: &Remote, url: &Url) -> Result<Vec<u8>, SyncError> {
        if let Some(delay) = self.artifact_delay {
            tokio::time::sleep(delay).await;
        }
        self.get(url.as_str())
    }
}

/// Three small files, matching the shape of the standard file fixture.
pub fn fixture_files() -> Vec<(&'static str, &'static [u8])> {
    vec![
        ("1.iso", &b"first fixture file\n"[..]),
        ("2.iso", &b"second fixture file\n"[..]),
        ("3.iso", &b"third fixture file\n"[..]),
    ]
}
