//! Pure content-set arithmetic behind repository versions.
//!
//! Nothing here touches storage: a [`ContentSet`] is a snapshot of version
//! membership, [`diff`] compares two snapshots, and [`VersionPlan`] decides
//! what the next version of a repository should contain.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::{ContentUnitId, RemoteId, RepositoryId};
use crate::sync::SyncMode;

/// Stable reference to one repository version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionRef {
    pub repository: RepositoryId,
    pub number: u64,
}

impl VersionRef {
    pub fn new(repository: RepositoryId, number: u64) -> Self {
        Self { repository, number }
    }

    /// The version this one was built on, if any.
    pub fn predecessor(self) -> Option<Self> {
        self.number.checked_sub(1).map(|number| Self {
            repository: self.repository,
            number,
        })
    }
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "repositories/{}/versions/{}/",
            self.repository.get(),
            self.number
        )
    }
}

/// What a version needs to know about each member unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub content_type: String,
    pub relative_path: String,
    /// The remote that brought the unit into the version. Deferred reads
    /// of the unit go to this remote, under its download policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteId>,
}

impl Member {
    pub fn new(content_type: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            relative_path: relative_path.into(),
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: Option<RemoteId>) -> Self {
        self.remote = remote;
        self
    }
}

/// The membership of one repository version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSet {
    units: BTreeMap<ContentUnitId, Member>,
}

impl ContentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ContentUnitId, member: Member) {
        self.units.insert(id, member);
    }

    pub fn contains(&self, id: ContentUnitId) -> bool {
        self.units.contains_key(&id)
    }

    pub fn get(&self, id: ContentUnitId) -> Option<&Member> {
        self.units.get(&id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ContentUnitId> + '_ {
        self.units.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContentUnitId, &Member)> {
        self.units.iter().map(|(id, m)| (*id, m))
    }

    /// Mark every member as supplied by `remote`.
    pub fn attribute_to(&mut self, remote: RemoteId) {
        for member in self.units.values_mut() {
            member.remote = Some(remote);
        }
    }

    /// Count members per content type.
    pub fn summary(&self) -> ContentSummary {
        let mut summary = ContentSummary::new();
        for member in self.units.values() {
            *summary.entry(member.content_type.clone()).or_insert(0) += 1;
        }
        summary
    }

    fn minus(&self, other: &ContentSet) -> ContentSet {
        ContentSet {
            units: self
                .units
                .iter()
                .filter(|(id, _)| !other.units.contains_key(id))
                .map(|(id, m)| (*id, m.clone()))
                .collect(),
        }
    }
}

impl FromIterator<(ContentUnitId, Member)> for ContentSet {
    fn from_iter<I: IntoIterator<Item = (ContentUnitId, Member)>>(iter: I) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}

/// Mapping from content type to unit count.
pub type ContentSummary = BTreeMap<String, u64>;

/// Units present in one snapshot but not the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub added: ContentSet,
    pub removed: ContentSet,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Changes needed to go from `from` to `to`.
///
/// `diff(a, b).added == diff(b, a).removed` for any pair.
pub fn diff(from: &ContentSet, to: &ContentSet) -> Diff {
    Diff {
        added: to.minus(from),
        removed: from.minus(to),
    }
}

/// The next version of a repository, before it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPlan {
    /// Number of the version this plan was computed against.
    pub base: u64,
    pub content: ContentSet,
    pub added: ContentSet,
    pub removed: ContentSet,
}

impl VersionPlan {
    /// Combine the previous version's content with the resolved manifest.
    ///
    /// In additive mode a previous unit is still replaced when a resolved
    /// unit claims the same relative path.
    pub fn compute(base: u64, previous: &ContentSet, resolved: &ContentSet, mode: SyncMode) -> Self {
        let content = match mode {
            SyncMode::Mirror => resolved.clone(),
            SyncMode::Additive => {
                let claimed: HashSet<&str> = resolved
                    .units
                    .values()
                    .map(|m| m.relative_path.as_str())
                    .collect();
                let mut content: ContentSet = previous
                    .iter()
                    .filter(|(id, m)| {
                        resolved.contains(*id) || !claimed.contains(m.relative_path.as_str())
                    })
                    .map(|(id, m)| (id, m.clone()))
                    .collect();
                for (id, member) in resolved.iter() {
                    content.insert(id, member.clone());
                }
                content
            }
        };

        let Diff { added, removed } = diff(previous, &content);
        Self {
            base,
            content,
            added,
            removed,
        }
    }

    /// Nothing changed; no version should be created.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn next_number(&self) -> u64 {
        self.base + 1
    }
}
