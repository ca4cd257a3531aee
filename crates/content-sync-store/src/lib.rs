pub mod builder;
pub mod chain;
pub mod error;
pub mod index;
pub mod locks;
pub mod models;
pub mod orchestrator;
pub mod reader;
pub mod schema;
pub mod service;
pub mod storage;
pub mod store;

pub use builder::BuildOutcome;
pub use error::StoreError;
pub use index::{Resolution, ResolvedManifest, dedupe_manifest};
pub use locks::RepositoryLocks;
pub use models::{
    OrphanReport, Publication, Publisher, RepositoryVersion, RepositoryView, SyncReport,
};
pub use orchestrator::{MAX_COMMIT_ATTEMPTS, Synchronizer};
pub use reader::ArtifactReader;
pub use service::{ContentService, TaskHandle};
pub use storage::ArtifactStorage;
pub use store::ContentStore;
