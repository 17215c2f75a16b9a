//! Removal of stale bundles.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use tracing::{info, warn};

use folio_common::{Error, Result};

use crate::package::PackageCatalog;

#[derive(Deserialize)]
struct PublishedPackage {
    en: String,
}

/// Names of the curated bundles, which are never evicted.
///
/// Read from the published `packages.json`; when that is missing or
/// unreadable the catalog's declared names are used instead.
pub async fn curated_names(published: &Path, catalog: &PackageCatalog) -> BTreeSet<String> {
    let parsed = match tokio::fs::read(published).await {
        Ok(bytes) => serde_json::from_slice::<Vec<PublishedPackage>>(&bytes)
            .map_err(|e| warn!("Unreadable {}: {}", published.display(), e))
            .ok(),
        Err(e) => {
            warn!("Could not read {}: {}", published.display(), e);
            None
        }
    };

    match parsed {
        Some(packages) => packages.into_iter().map(|p| p.en).collect(),
        None => catalog.names(),
    }
}

async fn remove_entry(path: &Path) -> Result<()> {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

async fn list_entries(bundle_dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(bundle_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::Io(e)),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Delete every non-curated bundle once there are at least `max_files` of them.
///
/// Below the threshold nothing is touched. Returns the number removed.
pub async fn clear_old_bundles(
    bundle_dir: &Path,
    curated: &BTreeSet<String>,
    max_files: usize,
) -> Result<usize> {
    let stale: Vec<String> = list_entries(bundle_dir)
        .await?
        .into_iter()
        .filter(|name| !curated.contains(name))
        .collect();

    if stale.len() < max_files {
        return Ok(0);
    }

    for name in &stale {
        remove_entry(&bundle_dir.join(name)).await?;
    }
    info!("Removed {} ad-hoc bundles", stale.len());
    Ok(stale.len())
}

/// Delete everything under the bundle directory.
pub async fn clear_bundles(bundle_dir: &Path) -> Result<usize> {
    let entries = list_entries(bundle_dir).await?;
    for name in &entries {
        remove_entry(&bundle_dir.join(name)).await?;
    }
    info!("Cleared {} bundles", entries.len());
    Ok(entries.len())
}
