use anyhow::Result;
use content_sync_store::ContentService;

pub fn run(service: &ContentService) -> Result<()> {
    let report = service.remove_orphans()?;
    println!(
        "Removed {} content unit(s) and {} artifact(s).",
        report.units_removed, report.artifacts_removed
    );
    Ok(())
}
