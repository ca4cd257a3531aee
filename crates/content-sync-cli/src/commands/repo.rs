use anyhow::{Result, bail};
use content_sync::VersionRef;
use content_sync_store::ContentService;

use super::format;

pub fn create(service: &ContentService, name: &str, description: Option<&str>) -> Result<()> {
    let id = service.create_repository(name, description)?;
    println!("Created repository {name} ({id}) at version 0.");
    Ok(())
}

pub fn show(service: &ContentService, name: &str) -> Result<()> {
    let repo = service.store().repository_by_name(name)?;
    let summary = service.content_summary(repo.latest_version)?;

    println!("Name:        {}", repo.name);
    if let Some(desc) = &repo.description {
        println!("Description: {desc}");
    }
    println!("ID:          {}", repo.id);
    println!("Latest:      {}", repo.latest_version);
    println!("Content:     {}", format::summary_line(&summary));
    Ok(())
}

pub fn delete(service: &ContentService, name: &str) -> Result<()> {
    let repo = service.store().repository_by_name(name)?;
    service.delete_repository(repo.id)?;
    println!("Deleted repository {name}. Run `content-sync orphans` to reclaim its content.");
    Ok(())
}

pub fn versions(service: &ContentService, name: &str) -> Result<()> {
    let repo = service.store().repository_by_name(name)?;
    let versions = service.versions(repo.id)?;
    format::print_versions(&versions, repo.latest_version.number);
    Ok(())
}

pub fn summary(service: &ContentService, name: &str, number: Option<u64>) -> Result<()> {
    let repo = service.store().repository_by_name(name)?;
    let version = match number {
        Some(n) => VersionRef::new(repo.id, n),
        None => repo.latest_version,
    };

    println!("{version}");
    println!("  present: {}", format::summary_line(&service.content_summary(version)?));
    println!("  added:   {}", format::summary_line(&service.added_content_summary(version)?));
    println!("  removed: {}", format::summary_line(&service.removed_content_summary(version)?));
    Ok(())
}

pub fn delete_version(service: &ContentService, name: &str, number: u64) -> Result<()> {
    let repo = service.store().repository_by_name(name)?;
    if number == repo.latest_version.number {
        bail!("version {number} is the latest version of {name}");
    }

    service.delete_version(VersionRef::new(repo.id, number))?;
    println!("Deleted version {number} of {name}.");
    Ok(())
}
