//! Which books changed since the last export.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use folio_common::{Error, Result};
use folio_library::{EditQuery, EditTarget, TextLibrary, TocNode};

use crate::state::SyncSnapshot;

/// Outcome of change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSet {
    /// No usable snapshot; everything has to be exported.
    FullExportRequired,
    Incremental {
        /// Known books edited after their recorded export time.
        updated: Vec<String>,
        /// Books in the table of contents the snapshot has never seen.
        added: Vec<String>,
    },
}

impl ChangeSet {
    /// Every book to re-export, updated first. Empty for a full export.
    pub fn titles(&self) -> Vec<String> {
        match self {
            ChangeSet::FullExportRequired => Vec::new(),
            ChangeSet::Incremental { updated, added } => {
                updated.iter().chain(added.iter()).cloned().collect()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ChangeSet::Incremental { updated, added } if updated.is_empty() && added.is_empty())
    }
}

/// Compares a snapshot against the edit history of the library.
pub struct ChangeDetector<'a, L: TextLibrary + ?Sized> {
    library: &'a L,
}

impl<'a, L: TextLibrary + ?Sized> ChangeDetector<'a, L> {
    pub fn new(library: &'a L) -> Self {
        Self { library }
    }

    pub async fn detect(&self, snapshot: Option<&SyncSnapshot>) -> Result<ChangeSet> {
        let Some(snapshot) = snapshot else {
            info!("No previous export recorded, full export required");
            return Ok(ChangeSet::FullExportRequired);
        };

        let updated = self.updated_books_list(snapshot).await?;
        let added = self.new_books_since_last_update(snapshot).await?;
        info!("{} updated books, {} new books", updated.len(), added.len());
        Ok(ChangeSet::Incremental { updated, added })
    }

    /// Snapshot titles with edits after their recorded time.
    pub async fn updated_books_list(&self, snapshot: &SyncSnapshot) -> Result<Vec<String>> {
        let mut updated = Vec::new();
        for (title, since) in &snapshot.titles {
            if self.has_updated(title, *since).await? {
                updated.push(title.clone());
            }
        }
        Ok(updated)
    }

    /// Whether `title` has any text, link or index edit strictly after `since`.
    ///
    /// A title the library no longer knows is reported unchanged.
    pub async fn has_updated(&self, title: &str, since: DateTime<Utc>) -> Result<bool> {
        let patterns = match self.library.title_patterns(title).await {
            Ok(patterns) => patterns,
            Err(Error::BookName(_)) => {
                warn!("Unknown book {} in snapshot", title);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let targets = [
            EditTarget::TextRef(patterns.clone()),
            EditTarget::LinkOldRefs(patterns.clone()),
            EditTarget::LinkNewRefs(patterns),
            EditTarget::IndexTitle(title.to_string()),
        ];
        for target in targets {
            let query = EditQuery { since, target };
            if self.library.count_edits(&query).await? > 0 {
                debug!("{} changed: {:?}", title, query.target);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Books in the table of contents that the snapshot does not list.
    pub async fn new_books_since_last_update(&self, snapshot: &SyncSnapshot) -> Result<Vec<String>> {
        let toc = TocNode::clean(&self.library.toc().await?);
        let known: BTreeSet<&str> = snapshot.titles.keys().map(String::as_str).collect();
        Ok(TocNode::leaf_titles(&toc)
            .into_iter()
            .filter(|t| !known.contains(t.as_str()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use folio_library::{EditKind, Index, MemoryBook, MemoryLibrary, TextNode, Version};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn book(title: &str) -> MemoryBook {
        let index = Index {
            title: title.to_string(),
            he_title: String::new(),
            categories: vec!["Tanakh".to_string()],
            primary_corpus: None,
        };
        MemoryBook::new(index, 2).with_version(
            Version::new("JPS", "en", Some(1.0)),
            TextNode::Branch(vec![TextNode::Branch(vec![TextNode::Leaf("a".to_string())])]),
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn library() -> MemoryLibrary {
        MemoryLibrary::new()
            .with_book(book("Job"))
            .with_book(book("Joshua"))
            .with_toc(vec![json!({"category": "Tanakh", "contents": [
                {"title": "Job"}, {"title": "Joshua"}, {"title": "Ruth"}
            ]})])
    }

    fn snapshot(titles: &[&str]) -> SyncSnapshot {
        let titles: BTreeMap<_, _> = titles.iter().map(|t| (t.to_string(), t0())).collect();
        SyncSnapshot::new("7", titles)
    }

    #[tokio::test]
    async fn test_edit_boundary_is_strict() {
        let mut lib = library();
        lib.record_edit(
            t0() - Duration::seconds(1),
            EditKind::Text { tref: "Job 1:1".to_string() },
        );
        let detector = ChangeDetector::new(&lib);
        assert!(!detector.has_updated("Job", t0()).await.unwrap());

        lib.record_edit(t0(), EditKind::Text { tref: "Job 1:1".to_string() });
        let detector = ChangeDetector::new(&lib);
        assert!(!detector.has_updated("Job", t0()).await.unwrap());

        lib.record_edit(
            t0() + Duration::seconds(1),
            EditKind::Text { tref: "Job 1:1".to_string() },
        );
        let detector = ChangeDetector::new(&lib);
        assert!(detector.has_updated("Job", t0()).await.unwrap());
    }

    #[tokio::test]
    async fn test_title_prefix_does_not_match_other_book() {
        let mut lib = library();
        lib.record_edit(
            t0() + Duration::hours(1),
            EditKind::Text { tref: "Joshua 1:1".to_string() },
        );
        let detector = ChangeDetector::new(&lib);
        assert!(!detector.has_updated("Job", t0()).await.unwrap());
        assert!(detector.has_updated("Joshua", t0()).await.unwrap());
    }

    #[tokio::test]
    async fn test_link_and_index_edits_count() {
        let mut lib = library();
        lib.record_edit(
            t0() + Duration::hours(1),
            EditKind::Link {
                old_refs: vec!["Genesis 1:1".to_string(), "Job 2:1".to_string()],
                new_refs: vec![],
            },
        );
        lib.record_edit(
            t0() + Duration::hours(1),
            EditKind::Index { title: "Joshua".to_string() },
        );
        let detector = ChangeDetector::new(&lib);
        assert!(detector.has_updated("Job", t0()).await.unwrap());
        assert!(detector.has_updated("Joshua", t0()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_title_is_unchanged() {
        let lib = library();
        let detector = ChangeDetector::new(&lib);
        assert!(!detector.has_updated("Lost Book", t0()).await.unwrap());
    }

    #[tokio::test]
    async fn test_detect() {
        let mut lib = library();
        lib.record_edit(
            t0() + Duration::hours(1),
            EditKind::Text { tref: "Job 1:1".to_string() },
        );
        let detector = ChangeDetector::new(&lib);

        assert_eq!(detector.detect(None).await.unwrap(), ChangeSet::FullExportRequired);

        let changes = detector.detect(Some(&snapshot(&["Job", "Joshua"]))).await.unwrap();
        assert_eq!(
            changes,
            ChangeSet::Incremental {
                updated: vec!["Job".to_string()],
                added: vec!["Ruth".to_string()],
            }
        );
        assert_eq!(changes.titles(), vec!["Job", "Ruth"]);
        assert!(!changes.is_empty());
    }
}
