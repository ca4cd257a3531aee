use anyhow::Result;
use content_sync::{SyncMode, SyncOptions};
use content_sync_store::ContentService;

use super::format::{print_feedback, summary_line};

/// Run a sync, reporting phases on stderr and the outcome on stdout.
pub async fn run(
    service: &ContentService,
    remote: &str,
    repository: &str,
    mode: SyncMode,
    json: bool,
) -> Result<()> {
    let remote = service.store().remote_by_name(remote)?;
    let repo = service.store().repository_by_name(repository)?;

    println!(
        "Syncing {} into {} ({})...",
        remote.name(),
        repo.name,
        remote.policy()
    );

    let handle = service.trigger_sync(remote.id, repo.id, SyncOptions { mode });
    let mut phase = handle.subscribe();
    let progress = tokio::spawn(async move {
        while phase.changed().await.is_ok() {
            let current = *phase.borrow_and_update();
            eprintln!("  {current}");
            if current.is_terminal() {
                break;
            }
        }
    });

    let result = handle.wait().await;
    let _ = progress.await;
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_feedback(&report.feedback);
    if report.created {
        println!(
            "Created {} (added {}; removed {}).",
            report.version,
            summary_line(&report.added),
            summary_line(&report.removed)
        );
    } else {
        println!("No changes; {} remains latest.", report.version);
    }
    if !report.rejected.is_empty() {
        println!("{} unit(s) rejected.", report.rejected.len());
    }

    Ok(())
}
