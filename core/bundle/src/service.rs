//! Bundle requests.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use folio_common::config::BUNDLES_DIRNAME;
use folio_common::{archive_name, Error, ExportConfig, Result};

use crate::archive::{build_split_archive, run_blocking};
use crate::fingerprint::fingerprint;
use crate::package::Package;

/// Builds bundles on demand and lists existing ones.
#[derive(Debug, Clone)]
pub struct BundleService {
    export_dir: PathBuf,
    bundle_dir: PathBuf,
    max_archive_size: u64,
}

impl BundleService {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            export_dir: config.export_dir(),
            bundle_dir: config.bundle_dir(),
            max_archive_size: config.max_archive_size,
        }
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    /// Bundle the archives of `books`, reusing an existing bundle of the same set.
    ///
    /// Returns the resource paths of the parts, `bundles/{name}/{part}`.
    ///
    /// # Errors
    /// - [`Error::InvalidInput`] if `books` is empty
    /// - [`Error::NotFound`] if none of the books has an archive
    pub async fn make_bundle(&self, books: &[String]) -> Result<Vec<String>> {
        if books.is_empty() {
            return Err(Error::InvalidInput("no books requested".to_string()));
        }

        let archives: Vec<String> = books
            .iter()
            .map(|b| archive_name(b))
            .filter(|name| self.export_dir.join(name).is_file())
            .collect();
        if archives.is_empty() {
            return Err(Error::NotFound("requested books not found".to_string()));
        }

        let name = fingerprint(&archives);
        let parts = match self.existing_parts(&name).await? {
            Some(parts) => {
                debug!("Reusing bundle {}", name);
                parts
            }
            None => {
                info!("Building new bundle {} ({} books)", name, archives.len());
                self.build(&name, archives).await?
            }
        };

        Ok(parts
            .into_iter()
            .map(|part| format!("{}/{}/{}", BUNDLES_DIRNAME, name, part))
            .collect())
    }

    /// Parts of an existing curated bundle.
    pub async fn package_parts(&self, package: &str) -> Result<Vec<String>> {
        let parts = self
            .existing_parts(package)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Package bundle {}", package)))?;
        Ok(parts
            .into_iter()
            .map(|part| format!("{}/{}/{}", BUNDLES_DIRNAME, package, part))
            .collect())
    }

    /// Build (or rebuild) the bundle `name` from the archive file names.
    pub async fn build(&self, name: &str, archives: Vec<String>) -> Result<Vec<String>> {
        let source = self.export_dir.clone();
        let target = self.bundle_dir.join(name);
        let cap = self.max_archive_size;
        run_blocking(move || build_split_archive(&archives, &source, &target, cap)).await
    }

    /// Build one bundle per package.
    ///
    /// The whole-library package holds every title in `all_titles`.
    pub async fn zip_packages(&self, packages: &[Package], all_titles: &[String]) -> Result<()> {
        tokio::fs::create_dir_all(&self.bundle_dir)
            .await
            .map_err(|e| Error::Io(e).classify())?;

        for package in packages {
            let titles = package.indexes.as_deref().unwrap_or(all_titles);
            let archives = titles.iter().map(|t| archive_name(t)).collect();
            let parts = self.build(&package.en, archives).await?;
            info!("Bundled package {} into {} parts", package.en, parts.len());
        }
        Ok(())
    }

    /// Part names of an existing bundle, ordered by part number.
    async fn existing_parts(&self, name: &str) -> Result<Option<Vec<String>>> {
        let dir = self.bundle_dir.join(name);
        if !tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
            return Ok(None);
        }

        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut parts: Vec<(u64, String)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let number = file_name
                .strip_suffix(".zip")
                .and_then(|stem| stem.parse::<u64>().ok());
            if let Some(number) = number {
                parts.push((number, file_name));
            }
        }
        parts.sort();
        Ok(Some(parts.into_iter().map(|(_, name)| name).collect()))
    }
}
