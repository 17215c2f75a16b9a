//! Edge-cache invalidation after an export.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use folio_common::config::{
    BUNDLES_DIRNAME, CALENDAR_FILENAME, CATEGORIES_FILENAME, LAST_UPDATED_FILENAME,
    PACKAGES_FILENAME, PEOPLE_FILENAME, SEARCH_TOC_FILENAME, TOC_FILENAME, TOPIC_TOC_FILENAME,
};
use folio_common::{archive_name, CdnConfig, Error, ExportConfig, Result};
use folio_library::ReferenceResolver;

use crate::retry::{RetryConfig, RetryExecutor};

/// Shared documents purged on every run.
const SHARED_FILES: [&str; 8] = [
    TOC_FILENAME,
    TOPIC_TOC_FILENAME,
    SEARCH_TOC_FILENAME,
    LAST_UPDATED_FILENAME,
    CALENDAR_FILENAME,
    CATEGORIES_FILENAME,
    PEOPLE_FILENAME,
    PACKAGES_FILENAME,
];

/// Removes URLs from an edge cache.
#[async_trait]
pub trait PurgeClient: Send + Sync {
    /// Purge one batch of absolute URLs.
    async fn purge(&self, files: &[String]) -> Result<()>;
}

#[async_trait]
impl<T: PurgeClient + ?Sized> PurgeClient for Arc<T> {
    async fn purge(&self, files: &[String]) -> Result<()> {
        (**self).purge(files).await
    }
}

/// Cloudflare `purge_cache` endpoint.
pub struct CloudflarePurgeClient {
    client: reqwest::Client,
    endpoint: String,
    email: String,
    api_key: String,
}

impl CloudflarePurgeClient {
    pub fn new(config: &CdnConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!(
                "{}/zones/{}/purge_cache",
                config.api_base.trim_end_matches('/'),
                config.zone
            ),
            email: config.email.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl PurgeClient for CloudflarePurgeClient {
    async fn purge(&self, files: &[String]) -> Result<()> {
        let response = self
            .client
            .delete(&self.endpoint)
            .header("X-Auth-Email", &self.email)
            .header("X-Auth-Key", &self.api_key)
            .json(&serde_json::json!({ "files": files }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Purge request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Network(format!("Purge failed: {} - {}", status, text)));
        }

        debug!("Purged {} files", files.len());
        Ok(())
    }
}

/// Records purge batches in memory; optionally fails the first calls.
#[derive(Debug, Default)]
pub struct MemoryPurgeClient {
    batches: Mutex<Vec<Vec<String>>>,
    failures_left: AtomicU32,
}

impl MemoryPurgeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` calls with a network error.
    pub fn failing(count: u32) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            failures_left: AtomicU32::new(count),
        }
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PurgeClient for MemoryPurgeClient {
    async fn purge(&self, files: &[String]) -> Result<()> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Network("simulated purge failure".to_string()));
        }
        self.batches
            .lock()
            .map_err(|e| Error::InvalidInput(format!("purge log poisoned: {}", e)))?
            .push(files.to_vec());
        Ok(())
    }
}

/// Outcome of a purge run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub files: usize,
    pub batches: usize,
    pub failed_batches: usize,
}

/// Builds purge lists and sends them in concurrent, retried batches.
pub struct CacheInvalidator<C: PurgeClient> {
    client: C,
    base_url: String,
    schema_version: String,
    bundle_dir: PathBuf,
    batch_size: usize,
    concurrency: usize,
    retry: RetryExecutor,
}

impl CacheInvalidator<CloudflarePurgeClient> {
    /// Invalidator for the configured CDN, if any.
    pub fn from_config(config: &ExportConfig) -> Option<Self> {
        let cdn = config.cdn.as_ref()?;
        Some(Self::new(CloudflarePurgeClient::new(cdn), &cdn.base_url, config))
    }
}

impl<C: PurgeClient> CacheInvalidator<C> {
    pub fn new(client: C, base_url: &str, config: &ExportConfig) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            schema_version: config.schema_version.clone(),
            bundle_dir: config.bundle_dir(),
            batch_size: config.purge_batch_size.max(1),
            concurrency: config.purge_concurrency.max(1),
            retry: RetryExecutor::new(RetryConfig::default()),
        }
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(config);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn url(&self, relative: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.schema_version, relative)
    }

    /// URLs to purge: one archive per title, the shared documents, and
    /// with `include_bundles` every file under the bundle directory.
    pub fn purge_paths(&self, titles: &[String], include_bundles: bool) -> Vec<String> {
        let mut paths: Vec<String> = titles.iter().map(|t| self.url(&archive_name(t))).collect();
        paths.extend(SHARED_FILES.iter().map(|f| self.url(f)));
        if include_bundles {
            paths.extend(
                bundle_files(&self.bundle_dir)
                    .iter()
                    .map(|rel| self.url(&format!("{}/{}", BUNDLES_DIRNAME, rel))),
            );
        }
        paths
    }

    /// Purge the archives of `titles`; an empty list purges every index
    /// title and all bundles.
    pub async fn purge_titles<L>(&self, library: &L, titles: &[String]) -> Result<PurgeReport>
    where
        L: ReferenceResolver + ?Sized,
    {
        let paths = if titles.is_empty() {
            let all = library.all_index_titles().await?;
            info!("Purging all {} titles and bundles", all.len());
            self.purge_paths(&all, true)
        } else {
            self.purge_paths(titles, false)
        };
        Ok(self.purge(paths).await)
    }

    /// Send `paths` in batches. Failed batches are logged and counted.
    pub async fn purge(&self, paths: Vec<String>) -> PurgeReport {
        let batches: Vec<Vec<String>> = paths
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let mut report = PurgeReport {
            files: paths.len(),
            batches: batches.len(),
            failed_batches: 0,
        };

        let client = &self.client;
        let retry = &self.retry;
        let results: Vec<Result<usize>> = stream::iter(batches)
            .map(|batch| async move {
                retry.execute(|| client.purge(&batch)).await?;
                Ok::<usize, Error>(batch.len())
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for result in results {
            if let Err(e) = result {
                error!("Purge batch failed: {}", e);
                report.failed_batches += 1;
            }
        }
        info!(
            "Purged {} files in {} batches ({} failed)",
            report.files, report.batches, report.failed_batches
        );
        report
    }
}

/// Files under `bundle_dir`, relative and `/`-separated, sorted.
fn bundle_files(bundle_dir: &Path) -> Vec<String> {
    let mut files = Vec::new();
    for entry in WalkDir::new(bundle_dir).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.io_error().map(|io| io.kind()) != Some(std::io::ErrorKind::NotFound) {
                    warn!("Skipping bundle entry: {}", e);
                }
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(bundle_dir) {
            let parts: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            files.push(parts.join("/"));
        }
    }
    files.sort();
    files
}
