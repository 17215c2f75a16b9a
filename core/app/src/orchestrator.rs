//! Full, incremental and single-book export runs.

use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use folio_bundle::{clear_bundles, run_blocking, zip_book_files, BundleService, PackageCatalog, Resolution};
use folio_common::config::PACKAGES_FILENAME;
use folio_common::{Error, ExportConfig, Result};
use folio_export::{export_index, export_text_json, remove_files, SharedDocs};
use folio_library::{TextLibrary, TocNode};
use folio_sync::{
    alerter_for, AlertIcon, Alerter, CacheInvalidator, ChangeDetector, ChangeSet,
    CloudflarePurgeClient, PurgeClient, PurgeReport, SyncSnapshot, SyncStateStore,
};

use crate::cleanup::disk_full_cleanup;

/// Books handled by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub exported: Vec<String>,
    pub failed: Vec<String>,
}

/// Sequences every stage of an export run against one library.
pub struct ExportOrchestrator<'a, L: TextLibrary + ?Sized> {
    library: &'a L,
    config: &'a ExportConfig,
    state: SyncStateStore,
    bundles: BundleService,
    catalog: PackageCatalog,
    alerter: Arc<dyn Alerter>,
    invalidator: Option<CacheInvalidator<Arc<dyn PurgeClient>>>,
    today: NaiveDate,
}

impl<'a, L: TextLibrary + ?Sized> ExportOrchestrator<'a, L> {
    /// Orchestrator with the configured catalog, alert channel and CDN.
    pub fn new(library: &'a L, config: &'a ExportConfig) -> Result<Self> {
        let invalidator = config.cdn.as_ref().map(|cdn| {
            let client: Arc<dyn PurgeClient> = Arc::new(CloudflarePurgeClient::new(cdn));
            CacheInvalidator::new(client, &cdn.base_url, config)
        });

        Ok(Self {
            library,
            config,
            state: SyncStateStore::new(config),
            bundles: BundleService::new(config),
            catalog: PackageCatalog::from_config(config)?,
            alerter: alerter_for(config),
            invalidator,
            today: Utc::now().date_naive(),
        })
    }

    pub fn with_alerter(mut self, alerter: Arc<dyn Alerter>) -> Self {
        self.alerter = alerter;
        self
    }

    pub fn with_invalidator(mut self, invalidator: Option<CacheInvalidator<Arc<dyn PurgeClient>>>) -> Self {
        self.invalidator = invalidator;
        self
    }

    /// Day the calendar window is computed from.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn shared(&self) -> SharedDocs<'a, L> {
        SharedDocs::new(self.library, self.config)
    }

    pub fn bundles(&self) -> &BundleService {
        &self.bundles
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Export every book and shared document, then rewrite the snapshot.
    ///
    /// With `skip_existing` books that already have an archive are kept.
    pub async fn export_all(&self, skip_existing: bool) -> Result<ExportReport> {
        let result = self.run_full_export(skip_existing).await;
        self.guard(result).await
    }

    /// Export the books changed or added since the last snapshot.
    ///
    /// Falls back to a full export when no snapshot can be read.
    pub async fn export_updated(&self) -> Result<ExportReport> {
        let result = self.run_incremental_export().await;
        self.guard(result).await
    }

    /// Export one book; with `update` its snapshot entry is refreshed.
    pub async fn export_text(&self, title: &str, update: bool) -> Result<PathBuf> {
        let result = async {
            let archive = self.export_book(title).await?;
            if update {
                self.state.write(&[title.to_string()], true).await?;
            }
            Ok::<_, Error>(archive)
        }
        .await;
        self.guard(result).await
    }

    /// Record archive times of `titles` and purge them from the edge cache.
    ///
    /// An empty list records and purges everything.
    pub async fn write_last_updated(&self, titles: &[String], merge: bool) -> Result<SyncSnapshot> {
        let result = self.state.write(titles, merge).await;
        let snapshot = self.guard(result).await?;
        if let Some(invalidator) = &self.invalidator {
            invalidator.purge_titles(self.library, titles).await?;
        }
        Ok(snapshot)
    }

    /// Purge `titles` from the edge cache; an empty list purges everything.
    ///
    /// Returns `None` when no CDN is configured.
    pub async fn purge_cdn(&self, titles: &[String]) -> Result<Option<PurgeReport>> {
        match &self.invalidator {
            Some(invalidator) => Ok(Some(invalidator.purge_titles(self.library, titles).await?)),
            None => {
                debug!("No CDN configured, nothing to purge");
                Ok(None)
            }
        }
    }

    /// Write the shared documents into each configured app source tree.
    pub async fn export_base_files_to_sources(&self) -> Result<()> {
        let shared = self.shared();
        let targets = shared.source_targets();
        if targets.is_empty() {
            warn!("No source directories configured");
            return Ok(());
        }

        info!("Exporting base files to {} source trees", targets.len());
        let result = async {
            let toc = shared.export_toc(&targets).await?;
            shared.export_topic_toc(&targets).await?;
            shared.export_categories(&targets).await?;
            shared.export_calendar(&targets, self.today).await?;
            shared.export_authors(&targets).await?;
            let resolution =
                self.catalog
                    .resolve(&toc, &self.config.export_dir(), self.config.top_level_packages);
            shared
                .write(&targets, PACKAGES_FILENAME, &resolution.packages)
                .await
        }
        .await;
        self.guard(result).await
    }

    /// Resolve the package catalog against `toc` and publish `packages.json`.
    ///
    /// Category paths that fail to resolve are reported to the operators.
    pub async fn export_packages(&self, toc: &[TocNode]) -> Result<Resolution> {
        let resolution =
            self.catalog
                .resolve(toc, &self.config.export_dir(), self.config.top_level_packages);
        self.shared()
            .write(&self.shared().export_targets(), PACKAGES_FILENAME, &resolution.packages)
            .await?;

        if !resolution.failures.is_empty() {
            let message = format!("Package errors:\n{}", resolution.failures.join("\n"));
            self.notify(&message, AlertIcon::RedLight).await;
        }
        info!("Published {} packages", resolution.packages.len());
        Ok(resolution)
    }

    /// Delete every bundle and rebuild the curated ones.
    pub async fn rebuild_bundles(&self) -> Result<()> {
        let result = async {
            clear_bundles(self.bundles.bundle_dir()).await?;
            let toc = TocNode::clean(&self.library.toc().await?);
            let resolution =
                self.catalog
                    .resolve(&toc, &self.config.export_dir(), self.config.top_level_packages);
            let all_titles = self.library.all_index_titles().await?;
            self.bundles.zip_packages(&resolution.packages, &all_titles).await
        }
        .await;
        self.guard(result).await
    }

    /// Tell the operators the run finished.
    pub async fn announce_completion(&self) {
        let stamp = tokio::fs::metadata(self.state.path())
            .await
            .and_then(|m| m.modified())
            .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|_| "missing".to_string());
        let message = format!(
            "Mobile export complete. Timestamp on `last_updated.json` is {}",
            stamp
        );
        self.notify(&message, AlertIcon::FileFolder).await;
    }

    async fn run_full_export(&self, skip_existing: bool) -> Result<ExportReport> {
        info!("Starting full export");
        tokio::fs::create_dir_all(self.config.export_dir())
            .await
            .map_err(|e| Error::Io(e).classify())?;

        let shared = self.shared();
        let targets = shared.export_targets();
        let toc = shared.export_toc(&targets).await?;
        shared.export_topic_toc(&targets).await?;
        shared.export_calendar(&targets, self.today).await?;
        shared.export_categories(&targets).await?;

        let mut titles = self.library.all_index_titles().await?;
        titles.reverse();
        let report = self.export_books(&titles, skip_existing).await?;

        shared.export_authors(&targets).await?;
        self.export_packages(&toc).await?;

        self.state.record(&report.exported, false).await?;
        self.purge_exported(&report.exported).await;
        info!(
            "Full export finished: {} exported, {} failed",
            report.exported.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn run_incremental_export(&self) -> Result<ExportReport> {
        let snapshot = self.state.load().await?;
        let changes = ChangeDetector::new(self.library)
            .detect(snapshot.as_ref())
            .await?;
        if changes == ChangeSet::FullExportRequired {
            return self.run_full_export(false).await;
        }

        let mut titles = Vec::new();
        for title in changes.titles() {
            match self.library.index(&title).await {
                Ok(_) => titles.push(title),
                Err(Error::BookName(_)) => warn!("Skipping unknown book {}", title),
                Err(e) => return Err(e),
            }
        }
        info!("{} books to update", titles.len());

        let shared = self.shared();
        let targets = shared.export_targets();
        let toc = shared.export_toc(&targets).await?;
        shared.export_topic_toc(&targets).await?;
        shared.export_calendar(&targets, self.today).await?;
        shared.export_categories(&targets).await?;
        shared.export_authors(&targets).await?;

        let report = self.export_books(&titles, false).await?;
        self.export_packages(&toc).await?;

        if !report.exported.is_empty() {
            self.state.write(&report.exported, true).await?;
        }
        self.purge_exported(&report.exported).await;
        Ok(report)
    }

    /// Export `titles` one after another; a failing book is logged and skipped.
    async fn export_books(&self, titles: &[String], skip_existing: bool) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        for title in titles {
            if skip_existing && self.config.book_archive(title).is_file() {
                debug!("Archive exists for {}, skipping", title);
                report.exported.push(title.clone());
                continue;
            }
            match self.export_book(title).await {
                Ok(_) => report.exported.push(title.clone()),
                Err(e) if e.is_disk_full() => return Err(e),
                Err(e) => {
                    error!("Failed to export {}: {}", title, e);
                    report.failed.push(title.clone());
                }
            }
        }
        Ok(report)
    }

    /// Write a book's documents and zip them into its primary archive.
    async fn export_book(&self, title: &str) -> Result<PathBuf> {
        let index = self.library.index(title).await?;
        info!("Exporting {}", title);

        let mut files = export_text_json(self.library, &index, self.config).await?;
        match export_index(self.library, &index, self.config).await {
            Ok(path) => files.push(path),
            Err(e) => {
                remove_files(&files).await;
                return Err(e);
            }
        }

        let archive = self.config.book_archive(title);
        let target = archive.clone();
        let zipped = files.clone();
        if let Err(e) = run_blocking(move || zip_book_files(&zipped, &target)).await {
            remove_files(&files).await;
            return Err(e);
        }
        Ok(archive)
    }

    async fn purge_exported(&self, titles: &[String]) -> Option<PurgeReport> {
        let invalidator = self.invalidator.as_ref()?;
        let paths = invalidator.purge_paths(titles, false);
        Some(invalidator.purge(paths).await)
    }

    async fn notify(&self, message: &str, icon: AlertIcon) {
        if let Err(e) = self.alerter.alert(message, icon).await {
            warn!("Could not send alert: {}", e);
        }
    }

    /// Clean up after a disk-full error before handing it back.
    async fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_disk_full() {
                disk_full_cleanup(self.config, &self.catalog, self.alerter.as_ref()).await;
            }
        }
        result
    }
}
