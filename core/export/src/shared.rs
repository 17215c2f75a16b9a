//! Library-wide documents published next to the book archives.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use folio_common::config::{
    CALENDAR_FILENAME, CATEGORIES_FILENAME, PEOPLE_FILENAME, SEARCH_TOC_FILENAME, TOC_FILENAME,
    TOPIC_TOC_FILENAME,
};
use folio_common::{ExportConfig, Result};
use folio_library::{CatalogSource, TocNode};

use crate::calendar::build_calendar;
use crate::documents::write_doc;

/// Writer for the shared documents.
///
/// Every document is written to each directory in `targets`: the export
/// directory for a regular run, the app source trees for a release.
pub struct SharedDocs<'a, L: ?Sized> {
    library: &'a L,
    config: &'a ExportConfig,
}

impl<'a, L> SharedDocs<'a, L>
where
    L: CatalogSource + ?Sized,
{
    pub fn new(library: &'a L, config: &'a ExportConfig) -> Self {
        Self { library, config }
    }

    /// The export directory alone.
    pub fn export_targets(&self) -> Vec<PathBuf> {
        vec![self.config.export_dir()]
    }

    /// The configured app source directories.
    pub fn source_targets(&self) -> Vec<PathBuf> {
        self.config.sources_dirs.clone()
    }

    /// Write `doc` as `filename` in every target directory.
    pub async fn write<T: Serialize + ?Sized>(
        &self,
        targets: &[PathBuf],
        filename: &str,
        doc: &T,
    ) -> Result<()> {
        for dir in targets {
            write_doc(doc, &dir.join(filename), self.config.minify_json).await?;
        }
        Ok(())
    }

    /// Cleaned table of contents, and the cleaned search-filter tree.
    pub async fn export_toc(&self, targets: &[PathBuf]) -> Result<Vec<TocNode>> {
        info!("Exporting table of contents");
        let toc = TocNode::clean(&self.library.toc().await?);
        let search_toc = TocNode::clean(&self.library.search_toc().await?);

        self.write(targets, TOC_FILENAME, &toc).await?;
        self.write(targets, SEARCH_TOC_FILENAME, &search_toc).await?;
        Ok(toc)
    }

    pub async fn export_topic_toc(&self, targets: &[PathBuf]) -> Result<()> {
        let topic_toc = self.library.topic_toc().await?;
        self.write(targets, TOPIC_TOC_FILENAME, &topic_toc).await
    }

    /// Hebrew name of every category that has one.
    pub async fn export_categories(&self, targets: &[PathBuf]) -> Result<BTreeMap<String, String>> {
        info!("Exporting Hebrew categories");
        let mut categories = BTreeMap::new();
        for category in self.library.text_categories().await? {
            match self.library.category_term(&category).await? {
                Some(term) => {
                    categories.insert(category, term);
                }
                None => info!("No term for category '{}', skipping", category),
            }
        }
        self.write(targets, CATEGORIES_FILENAME, &categories).await?;
        Ok(categories)
    }

    /// Lower-cased title of every author, mapped to 1.
    pub async fn export_authors(&self, targets: &[PathBuf]) -> Result<()> {
        let people: BTreeMap<String, u8> = self
            .library
            .author_titles()
            .await?
            .into_iter()
            .map(|title| (title.to_lowercase(), 1))
            .collect();
        self.write(targets, PEOPLE_FILENAME, &people).await
    }

    pub async fn export_calendar(&self, targets: &[PathBuf], today: NaiveDate) -> Result<()> {
        info!("Exporting calendar");
        let calendar = build_calendar(
            self.library,
            today,
            self.config.calendar_days_back,
            self.config.calendar_days_ahead,
        )
        .await?;
        self.write(targets, CALENDAR_FILENAME, &calendar).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_library::MemoryLibrary;
    use serde_json::{json, Value};

    fn read(path: PathBuf) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_toc_written_to_every_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::with_root(dir.path().join("export"));
        let library = MemoryLibrary::new().with_toc(vec![json!({
            "category": "Tanakh",
            "contents": [{"title": "Genesis"}, {"isGroup": true, "title": "Group"}]
        })]);
        let docs = SharedDocs::new(&library, &config);
        let targets = vec![dir.path().join("ios"), dir.path().join("android")];

        docs.export_toc(&targets).await.unwrap();
        for target in &targets {
            let toc = read(target.join(TOC_FILENAME));
            assert_eq!(toc[0]["contents"], json!([{"title": "Genesis"}]));
            assert_eq!(read(target.join(SEARCH_TOC_FILENAME)), toc);
        }
    }

    #[tokio::test]
    async fn test_categories_skip_missing_terms() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::with_root(dir.path());
        let library = MemoryLibrary::new()
            .with_category("Tanakh", Some("תנ״ך"))
            .with_category("Unnamed", None);
        let docs = SharedDocs::new(&library, &config);

        let categories = docs.export_categories(&docs.export_targets()).await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(
            read(config.shared_path(CATEGORIES_FILENAME)),
            json!({"Tanakh": "תנ״ך"})
        );
    }

    #[tokio::test]
    async fn test_authors_are_lowercased() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::with_root(dir.path());
        let library = MemoryLibrary::new().with_author("Rashi").with_author("RAMBAM");
        let docs = SharedDocs::new(&library, &config);

        docs.export_authors(&docs.export_targets()).await.unwrap();
        assert_eq!(
            read(config.shared_path(PEOPLE_FILENAME)),
            json!({"rashi": 1, "rambam": 1})
        );
    }

    #[tokio::test]
    async fn test_calendar_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ExportConfig::with_root(dir.path());
        config.calendar_days_ahead = 1;
        config.calendar_days_back = 0;
        let library = MemoryLibrary::new();
        let docs = SharedDocs::new(&library, &config);

        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        docs.export_calendar(&docs.export_targets(), today).await.unwrap();
        let calendar = read(config.shared_path(CALENDAR_FILENAME));
        assert!(calendar["metadata"].is_object());
        assert_eq!(calendar["2024-05-01"], json!({}));
    }
}
