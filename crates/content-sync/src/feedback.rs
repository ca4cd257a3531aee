use serde::{Deserialize, Serialize};

use crate::sync::RejectedUnit;

/// A message produced while syncing, for callers to present as they see fit.
///
/// The CLI prints these to stderr; the service keeps them on the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", content = "message", rename_all = "snake_case")]
pub enum Feedback {
    Info(String),
    /// The sync continued, but something was skipped or rejected.
    Warning(String),
}

impl Feedback {
    pub fn info(msg: impl Into<String>) -> Self {
        Self::Info(msg.into())
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Self::Warning(msg.into())
    }

    /// Warning describing a manifest entry left out of the new version.
    pub fn rejected(unit: &RejectedUnit) -> Self {
        Self::Warning(format!(
            "rejected {} ({}): {}",
            unit.entry.relative_path,
            crate::content::short_digest(&unit.entry.digest),
            unit.reason
        ))
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Info(msg) | Self::Warning(msg) => msg,
        }
    }
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info(msg) => write!(f, "{msg}"),
            Self::Warning(msg) => write!(f, "warning: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestEntry;

    #[test]
    fn rejected_unit_becomes_warning() {
        let unit = RejectedUnit::new(
            ManifestEntry::new("1.iso", "f".repeat(64), 3),
            "size mismatch",
        );
        let fb = Feedback::rejected(&unit);

        assert!(fb.is_warning());
        assert_eq!(fb.message(), "rejected 1.iso (ffffffffffff): size mismatch");
    }

    #[test]
    fn display_prefixes_level() {
        assert_eq!(Feedback::info("synced").to_string(), "synced");
        assert_eq!(Feedback::warning("msg").to_string(), "warning: msg");
        assert!(!Feedback::info("synced").is_warning());
    }
}
