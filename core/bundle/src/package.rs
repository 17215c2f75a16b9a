//! Curated download packages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

use folio_common::{archive_name, Error, ExportConfig, Result};
use folio_library::TocNode;

/// Catalog shipped with the crate.
static BUILTIN_CATALOG: &str = include_str!("../resources/packages.json");

/// A package as declared in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDefinition {
    pub en: String,
    pub he: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Category paths joined by `/`; empty means the whole library.
    #[serde(default)]
    pub categories: Vec<String>,
}

/// A resolved package, as published in `packages.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub en: String,
    pub he: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Member titles; absent for the whole-library package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexes: Option<Vec<String>>,
    /// Total size in bytes of the members' archives.
    #[serde(default)]
    pub size: u64,
}

impl Package {
    pub fn is_whole_library(&self) -> bool {
        self.indexes.is_none()
    }
}

/// Packages together with the category paths that failed to resolve.
#[derive(Debug, Default)]
pub struct Resolution {
    pub packages: Vec<Package>,
    pub failures: Vec<String>,
}

/// Declarative list of curated packages.
#[derive(Debug, Clone)]
pub struct PackageCatalog {
    definitions: Vec<PackageDefinition>,
}

impl PackageCatalog {
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let definitions: Vec<PackageDefinition> = serde_json::from_str(json)
            .map_err(|e| Error::Serialization(format!("package catalog: {}", e)))?;
        Ok(Self { definitions })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// The catalog at `packages_path` if configured, the built-in one otherwise.
    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        match &config.packages_path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn definitions(&self) -> &[PackageDefinition] {
        &self.definitions
    }

    /// English names of the declared packages.
    pub fn names(&self) -> BTreeSet<String> {
        self.definitions.iter().map(|d| d.en.clone()).collect()
    }

    /// Declared packages followed by one package per top-level category.
    ///
    /// Only the first `top_level` categories of the tree are considered;
    /// a category some declared package already covers whole is skipped.
    pub fn expand(&self, toc: &[TocNode], top_level: usize) -> Vec<PackageDefinition> {
        let mut definitions = self.definitions.clone();
        for node in toc.iter().take(top_level) {
            let TocNode::Category {
                category,
                he_category,
                ..
            } = node
            else {
                continue;
            };
            let covered = self
                .definitions
                .iter()
                .any(|d| d.categories.iter().any(|c| c == category));
            if covered {
                continue;
            }
            definitions.push(PackageDefinition {
                en: category.to_uppercase(),
                he: he_category.clone().unwrap_or_default(),
                color: category.clone(),
                parent: None,
                categories: vec![category.clone()],
            });
        }
        definitions
    }

    /// Resolve every package to its member titles and on-disk size.
    ///
    /// A category path that does not exist is recorded in `failures` and
    /// contributes no titles; the package itself is still published.
    pub fn resolve(&self, toc: &[TocNode], export_dir: &Path, top_level: usize) -> Resolution {
        let mut resolution = Resolution::default();

        for definition in self.expand(toc, top_level) {
            let mut titles = Vec::new();
            if definition.categories.is_empty() {
                match TocNode::titles_in_category(toc, &[]) {
                    Ok(found) => titles = found,
                    Err(e) => {
                        warn!("Could not resolve full library: {}", e);
                        resolution.failures.push("Full library".to_string());
                    }
                }
            } else {
                for path in &definition.categories {
                    let segments: Vec<&str> = path.split('/').collect();
                    match TocNode::titles_in_category(toc, &segments) {
                        Ok(found) => titles.extend(found),
                        Err(e) => {
                            warn!("Package {}: {}", definition.en, e);
                            resolution
                                .failures
                                .push(format!("Category doesn't exist: {}", path));
                        }
                    }
                }
            }

            let size = archive_size(export_dir, &titles);
            debug!("Package {} has {} titles, {} bytes", definition.en, titles.len(), size);

            let indexes = (!definition.categories.is_empty()).then_some(titles);
            resolution.packages.push(Package {
                en: definition.en,
                he: definition.he,
                color: definition.color,
                parent: definition.parent,
                indexes,
                size,
            });
        }

        resolution
    }
}

/// Sum of the primary archive sizes of `titles`; missing archives count 0.
fn archive_size(export_dir: &Path, titles: &[String]) -> u64 {
    titles
        .iter()
        .filter_map(|t| std::fs::metadata(export_dir.join(archive_name(t))).ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn toc() -> Vec<TocNode> {
        TocNode::clean(
            json!([
                {"category": "Tanakh", "heCategory": "תנ״ך", "contents": [
                    {"category": "Torah", "contents": [{"title": "Genesis"}]},
                    {"category": "Prophets", "contents": [{"title": "Joshua"}]},
                    {"category": "Writings", "contents": [{"title": "Job"}]},
                    {"category": "Rishonim on Tanakh", "contents": [
                        {"category": "Rashi", "contents": [{"title": "Rashi on Genesis"}]}
                    ]}
                ]},
                {"category": "Mishnah", "heCategory": "משנה", "contents": [{"title": "Mishnah Berakhot"}]},
                {"category": "Talmud", "heCategory": "תלמוד", "contents": [{"title": "Berakhot"}]}
            ])
            .as_array()
            .unwrap(),
        )
    }

    #[test]
    fn test_builtin_catalog() {
        let catalog = PackageCatalog::builtin().unwrap();
        assert_eq!(catalog.definitions().len(), 5);
        assert!(catalog.names().contains("COMPLETE LIBRARY"));
    }

    #[test]
    fn test_top_level_categories_added() {
        let catalog = PackageCatalog::builtin().unwrap();
        let expanded = catalog.expand(&toc(), 7);
        assert_eq!(expanded.len(), 6);
        let mishnah = &expanded[5];
        assert_eq!(mishnah.en, "MISHNAH");
        assert_eq!(mishnah.he, "משנה");
        assert_eq!(mishnah.color, "Mishnah");

        assert_eq!(catalog.expand(&toc(), 1).len(), 5);
    }

    #[test]
    fn test_resolve_packages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Genesis.zip"), vec![0u8; 100]).unwrap();
        std::fs::write(dir.path().join("Job.zip"), vec![0u8; 50]).unwrap();

        let resolution = PackageCatalog::builtin().unwrap().resolve(&toc(), dir.path(), 7);

        let complete = &resolution.packages[0];
        assert!(complete.is_whole_library());
        assert_eq!(complete.size, 150);

        let rashi = &resolution.packages[1];
        assert_eq!(
            rashi.indexes.as_deref().unwrap(),
            &["Genesis", "Joshua", "Job", "Rashi on Genesis"]
        );
        assert_eq!(rashi.size, 150);

        let talmud_rashi = &resolution.packages[3];
        assert_eq!(talmud_rashi.indexes.as_deref().unwrap().len(), 0);
        assert_eq!(resolution.failures.len(), 8);
    }

    #[test]
    fn test_package_json_shape() {
        let package = Package {
            en: "COMPLETE LIBRARY".to_string(),
            he: "כל הספרייה".to_string(),
            color: "Other".to_string(),
            parent: None,
            indexes: None,
            size: 3,
        };
        assert_eq!(
            serde_json::to_value(&package).unwrap(),
            json!({"en": "COMPLETE LIBRARY", "he": "כל הספרייה", "color": "Other", "size": 3})
        );
    }
}
