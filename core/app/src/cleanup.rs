//! Recovery when the export volume fills up.

use std::io;
use std::path::Path;
use tracing::{error, info, warn};

use folio_bundle::{clear_old_bundles, curated_names, PackageCatalog};
use folio_common::config::{
    CALENDAR_FILENAME, CATEGORIES_FILENAME, LAST_UPDATED_FILENAME, PACKAGES_FILENAME,
    SEARCH_TOC_FILENAME, TOC_FILENAME, TOPIC_TOC_FILENAME,
};
use folio_common::{Error, ExportConfig, Result};
use folio_sync::{AlertIcon, Alerter};

/// JSON documents that survive a disk-full cleanup.
const KEPT_DOCUMENTS: [&str; 6] = [
    CALENDAR_FILENAME,
    TOC_FILENAME,
    SEARCH_TOC_FILENAME,
    TOPIC_TOC_FILENAME,
    LAST_UPDATED_FILENAME,
    CATEGORIES_FILENAME,
];

/// Remove partial `*.json` output from `export_dir`, keeping the shared
/// documents the clients cannot do without. Returns the number removed.
async fn remove_partial_documents(export_dir: &Path) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(export_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::Io(e)),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.ends_with(".json") || KEPT_DOCUMENTS.contains(&name) {
            continue;
        }
        if entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Free space after a disk-full error.
///
/// Partial documents are deleted, the operators are alerted and every
/// ad-hoc bundle is evicted. Failures here are logged; the caller still
/// reports the original error.
pub async fn disk_full_cleanup(config: &ExportConfig, catalog: &PackageCatalog, alerter: &dyn Alerter) {
    let export_dir = config.export_dir();
    error!("Disk full while exporting to {}", export_dir.display());

    match remove_partial_documents(&export_dir).await {
        Ok(removed) => info!("Removed {} partial documents", removed),
        Err(e) => warn!("Could not remove partial documents: {}", e),
    }

    if let Err(e) = alerter
        .alert("Disk full during mobile export", AlertIcon::RedLight)
        .await
    {
        warn!("Could not send disk-full alert: {}", e);
    }

    let curated = curated_names(&config.shared_path(PACKAGES_FILENAME), catalog).await;
    if let Err(e) = clear_old_bundles(&config.bundle_dir(), &curated, 0).await {
        warn!("Could not evict bundles: {}", e);
    }
}
