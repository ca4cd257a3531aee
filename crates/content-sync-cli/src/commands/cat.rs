use std::io::Write;

use anyhow::{Context, Result};
use content_sync_store::ContentService;

pub async fn run(service: &ContentService, repository: &str, relative_path: &str) -> Result<()> {
    let repo = service.store().repository_by_name(repository)?;
    let bytes = service
        .read_artifact(repo.id, relative_path)
        .await
        .with_context(|| format!("failed to read {relative_path} from {repository}"))?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(())
}
