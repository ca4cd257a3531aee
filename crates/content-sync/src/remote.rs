use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::content::RemoteId;
use crate::sync::SyncError;

/// Default number of simultaneous artifact downloads per sync.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 10;

/// When artifact bytes are retrieved from the remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPolicy {
    /// Download every artifact during the sync.
    #[default]
    Immediate,
    /// Download on first read, then serve from local storage.
    OnDemand,
    /// Download on every read, never store.
    Streamed,
}

impl DownloadPolicy {
    pub fn is_lazy(self) -> bool {
        !matches!(self, Self::Immediate)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::OnDemand => "on_demand",
            Self::Streamed => "streamed",
        }
    }
}

impl fmt::Display for DownloadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "immediate" => Ok(Self::Immediate),
            "on_demand" | "ondemand" => Ok(Self::OnDemand),
            "streamed" => Ok(Self::Streamed),
            other => Err(format!(
                "unknown download policy {other:?} (expected immediate, on_demand or streamed)"
            )),
        }
    }
}

/// Basic-auth credentials sent to the remote.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// User-supplied configuration of an upstream source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub name: String,
    /// URL of the manifest. Artifact URLs are resolved against it.
    pub url: String,
    #[serde(default)]
    pub policy: DownloadPolicy,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default = "default_concurrency")]
    pub download_concurrency: usize,
}

fn default_concurrency() -> usize {
    DEFAULT_DOWNLOAD_CONCURRENCY
}

impl RemoteConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, policy: DownloadPolicy) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            policy,
            credentials: None,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password,
        });
        self
    }

    pub fn with_download_concurrency(mut self, n: usize) -> Self {
        self.download_concurrency = n;
        self
    }

    /// Reject configurations no sync could succeed with.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.name.trim().is_empty() {
            return Err(SyncError::Other("remote name must not be empty".into()));
        }
        Url::parse(&self.url)
            .map_err(|e| SyncError::Other(format!("invalid remote url {:?}: {e}", self.url)))?;
        if self.download_concurrency == 0 {
            return Err(SyncError::Other(
                "download_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A stored remote. A sync works from a clone taken when it starts, so
/// later edits only affect future syncs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub id: RemoteId,
    #[serde(flatten)]
    pub config: RemoteConfig,
}

impl Remote {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn policy(&self) -> DownloadPolicy {
        self.config.policy
    }

    /// Resolve an entry's relative path against the manifest URL.
    ///
    /// The result must stay on the manifest's origin and below its
    /// directory, since requests to it carry the remote's credentials.
    pub fn artifact_url(&self, relative_path: &str) -> Result<Url, SyncError> {
        let base = Url::parse(&self.config.url).map_err(|e| {
            SyncError::Other(format!("invalid remote url {:?}: {e}", self.config.url))
        })?;
        let url = base.join(relative_path).map_err(|e| {
            SyncError::Other(format!("cannot resolve {relative_path:?} against {base}: {e}"))
        })?;

        let directory = &base.path()[..base.path().rfind('/').map_or(0, |i| i + 1)];
        if url.origin() != base.origin() || !url.path().starts_with(directory) {
            return Err(SyncError::IntegrityConflict {
                relative_path: relative_path.to_owned(),
                reason: format!("resolves to {url}, outside {base}"),
            });
        }
        Ok(url)
    }
}
