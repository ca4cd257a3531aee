use anyhow::Result;
use content_sync_store::ContentService;

pub fn create_publisher(
    service: &ContentService,
    name: &str,
    manifest_name: Option<&str>,
) -> Result<()> {
    let id = service.create_publisher(name, manifest_name)?;
    println!("Created publisher {name} ({id}).");
    Ok(())
}

pub async fn run(
    service: &ContentService,
    publisher: &str,
    repository: &str,
    print_manifest: bool,
) -> Result<()> {
    let publisher = service.store().publisher_by_name(publisher)?;
    let repo = service.store().repository_by_name(repository)?;

    let publication = service.trigger_publish(publisher.id, repo.id).wait().await?;
    let manifest = service.publication_manifest(&publication)?;

    if print_manifest {
        print!("{}", manifest.render());
        return Ok(());
    }

    println!(
        "Published {} as {} ({} entries in {}).",
        publication.version,
        publication.id,
        manifest.len(),
        publisher.manifest_name
    );
    Ok(())
}
