use anyhow::{Result, bail};
use content_sync::{Credentials, DownloadPolicy, RemoteConfig};
use content_sync_store::ContentService;

use super::format;

/// Arguments of `remote create`.
pub struct NewRemote {
    pub name: String,
    pub url: String,
    pub policy: DownloadPolicy,
    pub username: Option<String>,
    pub password: Option<String>,
    pub concurrency: usize,
}

pub fn create(service: &ContentService, new: NewRemote) -> Result<()> {
    let mut config = RemoteConfig::new(new.name, new.url, new.policy)
        .with_download_concurrency(new.concurrency);
    if let Some(username) = new.username {
        config = config.with_credentials(username, new.password);
    }

    let id = service.create_remote(&config)?;
    println!("Created remote {} ({id}, {}).", config.name, config.policy);
    Ok(())
}

pub fn list(service: &ContentService) -> Result<()> {
    format::print_remotes(&service.remotes()?);
    Ok(())
}

/// Arguments of `remote update`. Unset fields keep their current value.
#[derive(Debug, Default)]
pub struct RemoteChanges {
    pub url: Option<String>,
    pub policy: Option<DownloadPolicy>,
    pub concurrency: Option<usize>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub clear_credentials: bool,
}

impl RemoteChanges {
    /// The configuration after these changes. A new username keeps the
    /// current password unless a password is given too.
    pub fn apply(self, mut config: RemoteConfig) -> Result<RemoteConfig> {
        if let Some(url) = self.url {
            config.url = url;
        }
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if let Some(concurrency) = self.concurrency {
            config.download_concurrency = concurrency;
        }

        if self.clear_credentials {
            if self.username.is_some() || self.password.is_some() {
                bail!("--clear-credentials cannot be combined with --username or --password");
            }
            config.credentials = None;
            return Ok(config);
        }

        let current = config.credentials.take();
        config.credentials = match (self.username, self.password, current) {
            (Some(username), password, current) => Some(Credentials {
                username,
                password: password.or(current.and_then(|c| c.password)),
            }),
            (None, Some(password), Some(current)) => Some(Credentials {
                username: current.username,
                password: Some(password),
            }),
            (None, Some(_), None) => bail!("--password needs a username; pass --username too"),
            (None, None, current) => current,
        };
        Ok(config)
    }
}

pub fn update(service: &ContentService, name: &str, changes: RemoteChanges) -> Result<()> {
    let remote = service.store().remote_by_name(name)?;
    let config = changes.apply(remote.config)?;

    service.update_remote(remote.id, &config)?;
    println!("Updated remote {name}; the next sync uses the new configuration.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RemoteConfig {
        RemoteConfig::new("r", "http://x/PULP_MANIFEST", DownloadPolicy::Immediate)
            .with_credentials("admin", Some("old".into()))
    }

    fn credentials(config: &RemoteConfig) -> Option<(&str, Option<&str>)> {
        config
            .credentials
            .as_ref()
            .map(|c| (c.username.as_str(), c.password.as_deref()))
    }

    #[test]
    fn untouched_credentials_survive_other_changes() {
        let changes = RemoteChanges {
            policy: Some(DownloadPolicy::Streamed),
            ..Default::default()
        };
        let updated = changes.apply(config()).unwrap();
        assert_eq!(updated.policy, DownloadPolicy::Streamed);
        assert_eq!(credentials(&updated), Some(("admin", Some("old"))));
    }

    #[test]
    fn password_can_be_rotated_alone() {
        let changes = RemoteChanges {
            password: Some("new".into()),
            ..Default::default()
        };
        let updated = changes.apply(config()).unwrap();
        assert_eq!(credentials(&updated), Some(("admin", Some("new"))));
    }

    #[test]
    fn new_username_keeps_the_password() {
        let changes = RemoteChanges {
            username: Some("ops".into()),
            ..Default::default()
        };
        let updated = changes.apply(config()).unwrap();
        assert_eq!(credentials(&updated), Some(("ops", Some("old"))));
    }

    #[test]
    fn credentials_can_be_cleared() {
        let changes = RemoteChanges {
            clear_credentials: true,
            ..Default::default()
        };
        assert_eq!(credentials(&changes.apply(config()).unwrap()), None);
    }

    #[test]
    fn password_without_any_username_is_an_error() {
        let plain = RemoteConfig::new("r", "http://x/PULP_MANIFEST", DownloadPolicy::Immediate);
        let changes = RemoteChanges {
            password: Some("new".into()),
            ..Default::default()
        };
        assert!(changes.apply(plain).is_err());
    }
}
