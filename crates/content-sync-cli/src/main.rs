mod commands;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use content_sync::{DownloadPolicy, Fetcher, SyncMode};
use content_sync_http::HttpFetcher;
use content_sync_store::{ArtifactStorage, ContentService, ContentStore};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "content-sync")]
#[command(about = "Sync file repositories from remote manifests into immutable versions")]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage remotes
    #[command(subcommand)]
    Remote(RemoteCommand),
    /// Manage repositories
    #[command(subcommand)]
    Repo(RepoCommand),
    /// Sync a remote into a repository
    Sync {
        remote: String,
        repository: String,
        /// Mirror replaces the content; additive keeps units missing upstream
        #[arg(long, value_enum, default_value_t = ModeArg::Mirror)]
        mode: ModeArg,
        /// Print the sync report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List a repository's versions
    Versions { repository: String },
    /// Show content counts for a repository version
    Summary {
        repository: String,
        /// Version number (defaults to the latest)
        #[arg(long)]
        version: Option<u64>,
    },
    /// Manage publishers
    #[command(subcommand)]
    Publisher(PublisherCommand),
    /// Publish a repository's latest version
    Publish {
        publisher: String,
        repository: String,
        /// Print the published manifest
        #[arg(long)]
        manifest: bool,
    },
    /// Write a file from a repository's latest version to stdout
    Cat {
        repository: String,
        relative_path: String,
    },
    /// Manage repository versions
    #[command(subcommand)]
    Version(VersionCommand),
    /// Delete content and artifacts no version references
    Orphans,
}

#[derive(Subcommand)]
enum RemoteCommand {
    /// Register a remote manifest URL
    Create {
        name: String,
        url: String,
        #[arg(long, value_enum, default_value_t = PolicyArg::Immediate)]
        policy: PolicyArg,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Maximum simultaneous downloads during immediate syncs
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// List remotes
    List,
    /// Change a remote; only later syncs see the change
    Update {
        name: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
        #[arg(long)]
        concurrency: Option<usize>,
        /// Basic-auth username; keeps the current password unless --password is given
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        /// Stop sending credentials to the remote
        #[arg(long)]
        clear_credentials: bool,
    },
}

#[derive(Subcommand)]
enum RepoCommand {
    /// Create an empty repository
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Show a repository and its latest version
    Show { name: String },
    /// Delete a repository and all of its versions
    Delete { name: String },
}

#[derive(Subcommand)]
enum PublisherCommand {
    /// Create a publisher
    Create {
        name: String,
        /// File name of the published manifest
        #[arg(long)]
        manifest_name: Option<String>,
    },
}

#[derive(Subcommand)]
enum VersionCommand {
    /// Delete a version that is neither latest nor published
    Delete { repository: String, number: u64 },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Immediate,
    OnDemand,
    Streamed,
}

impl From<PolicyArg> for DownloadPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Immediate => DownloadPolicy::Immediate,
            PolicyArg::OnDemand => DownloadPolicy::OnDemand,
            PolicyArg::Streamed => DownloadPolicy::Streamed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Mirror,
    Additive,
}

impl From<ModeArg> for SyncMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Mirror => SyncMode::Mirror,
            ModeArg::Additive => SyncMode::Additive,
        }
    }
}

/// `-v` flags win, then `RUST_LOG`, then the config file, then `info`.
fn init_tracing(verbose: u8, configured: Option<&str>) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = configured.unwrap_or("info");
            EnvFilter::new(crate_filter(level))
        }),
        1 => EnvFilter::new(crate_filter("debug")),
        _ => EnvFilter::new(crate_filter("trace")),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn crate_filter(level: &str) -> String {
    format!(
        "content_sync={level},content_sync_http={level},content_sync_store={level},content_sync_cli={level}"
    )
}

fn build_service(config: &AppConfig) -> Result<ContentService> {
    let store = ContentStore::open(&config.database)
        .with_context(|| format!("failed to open database {}", config.database.display()))?;
    let storage = ArtifactStorage::open(&config.storage)
        .with_context(|| format!("failed to open storage {}", config.storage.display()))?;
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new());

    Ok(ContentService::new(store, storage, fetcher))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let app_config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load_config(),
    };
    init_tracing(cli.verbose, app_config.log_level.as_deref());

    let service = build_service(&app_config)?;

    match cli.command {
        Command::Remote(RemoteCommand::Create {
            name,
            url,
            policy,
            username,
            password,
            concurrency,
        }) => commands::remote::create(
            &service,
            commands::remote::NewRemote {
                name,
                url,
                policy: policy.into(),
                username,
                password,
                concurrency: concurrency.unwrap_or(app_config.default_download_concurrency),
            },
        ),
        Command::Remote(RemoteCommand::List) => commands::remote::list(&service),
        Command::Remote(RemoteCommand::Update {
            name,
            url,
            policy,
            concurrency,
            username,
            password,
            clear_credentials,
        }) => commands::remote::update(
            &service,
            &name,
            commands::remote::RemoteChanges {
                url,
                policy: policy.map(Into::into),
                concurrency,
                username,
                password,
                clear_credentials,
            },
        ),
        Command::Repo(RepoCommand::Create { name, description }) => {
            commands::repo::create(&service, &name, description.as_deref())
        }
        Command::Repo(RepoCommand::Show { name }) => commands::repo::show(&service, &name),
        Command::Repo(RepoCommand::Delete { name }) => commands::repo::delete(&service, &name),
        Command::Sync {
            remote,
            repository,
            mode,
            json,
        } => commands::sync::run(&service, &remote, &repository, mode.into(), json).await,
        Command::Versions { repository } => commands::repo::versions(&service, &repository),
        Command::Summary {
            repository,
            version,
        } => commands::repo::summary(&service, &repository, version),
        Command::Publisher(PublisherCommand::Create {
            name,
            manifest_name,
        }) => commands::publish::create_publisher(&service, &name, manifest_name.as_deref()),
        Command::Publish {
            publisher,
            repository,
            manifest,
        } => commands::publish::run(&service, &publisher, &repository, manifest).await,
        Command::Cat {
            repository,
            relative_path,
        } => commands::cat::run(&service, &repository, &relative_path).await,
        Command::Version(VersionCommand::Delete { repository, number }) => {
            commands::repo::delete_version(&service, &repository, number)
        }
        Command::Orphans => commands::orphans::run(&service),
    }
}
