use content_sync::{ContentSummary, Feedback, Remote};
use content_sync_store::RepositoryVersion;

/// Print feedback items to stderr.
pub fn print_feedback(feedback: &[Feedback]) {
    for item in feedback {
        eprintln!("{item}");
    }
}

/// `file.file: 3, file.other: 1`, or `(none)` when empty.
pub fn summary_line(summary: &ContentSummary) -> String {
    if summary.is_empty() {
        return "(none)".to_owned();
    }
    summary
        .iter()
        .map(|(content_type, count)| format!("{content_type}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_remotes(remotes: &[Remote]) {
    if remotes.is_empty() {
        println!("No remotes.");
        return;
    }

    let name_width = remotes
        .iter()
        .map(|r| r.name().chars().count())
        .max()
        .unwrap_or(0);

    for remote in remotes {
        println!(
            "  {:<width$}  {:<9}  {}",
            remote.name(),
            remote.policy().as_str(),
            remote.config.url,
            width = name_width
        );
    }
}

pub fn print_versions(versions: &[RepositoryVersion], latest: u64) {
    for version in versions {
        let marker = if version.number() == latest { "*" } else { " " };
        println!(
            "{marker} {:>4}  {:>6} units  created {}",
            version.number(),
            version.content_count,
            version.created_at
        );
    }
}
