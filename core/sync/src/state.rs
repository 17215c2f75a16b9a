//! Per-book export times and their persistence.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use folio_common::{json, title_from_archive, Error, ExportConfig, Result};

/// Contents of `last_updated.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    #[serde(alias = "schema_version", deserialize_with = "schema_version_string")]
    pub schema_version: String,
    #[serde(default)]
    pub comment: String,
    /// Last export time of each book.
    #[serde(default, deserialize_with = "timestamps")]
    pub titles: BTreeMap<String, DateTime<Utc>>,
}

impl SyncSnapshot {
    pub fn new(schema_version: impl Into<String>, titles: BTreeMap<String, DateTime<Utc>>) -> Self {
        Self {
            schema_version: schema_version.into(),
            comment: String::new(),
            titles,
        }
    }

    /// Placeholder used when no previous document can be read.
    pub fn empty() -> Self {
        Self::new("0", BTreeMap::new())
    }

    /// Overlay `newer` onto this snapshot.
    ///
    /// Schema version and comment are replaced; titles are added or
    /// overwritten, never removed.
    pub fn merge(&mut self, newer: SyncSnapshot) {
        self.schema_version = newer.schema_version;
        self.comment = newer.comment;
        self.titles.extend(newer.titles);
    }

    pub fn contains(&self, title: &str) -> bool {
        self.titles.contains_key(title)
    }
}

fn schema_version_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn timestamps<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(title, stamp)| match parse_timestamp(&stamp) {
            Some(dt) => Ok((title, dt)),
            None => Err(serde::de::Error::custom(format!(
                "bad timestamp for {}: {}",
                title, stamp
            ))),
        })
        .collect()
}

/// Reads and writes `last_updated.json` in the export directory.
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    export_dir: PathBuf,
    path: PathBuf,
    schema_version: String,
    minify: bool,
}

impl SyncStateStore {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            export_dir: config.export_dir(),
            path: config.last_updated_path(),
            schema_version: config.schema_version.clone(),
            minify: config.minify_json,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the current snapshot.
    ///
    /// Returns `None` when the document is absent or cannot be parsed.
    pub async fn load(&self) -> Result<Option<SyncSnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No snapshot at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                warn!("Could not read {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };

        match serde_json::from_slice::<SyncSnapshot>(&bytes) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!("Corrupt snapshot {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    /// Titles of every primary archive in the export directory.
    pub async fn archive_titles(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.export_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut titles = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(title) = name.to_str().and_then(title_from_archive) {
                if entry.file_type().await?.is_file() {
                    titles.push(title.to_string());
                }
            }
        }
        titles.sort();
        Ok(titles)
    }

    async fn archive_time(&self, title: &str) -> Option<DateTime<Utc>> {
        let archive = self.export_dir.join(folio_common::archive_name(title));
        match tokio::fs::metadata(&archive).await.and_then(|m| m.modified()) {
            Ok(modified) => Some(DateTime::<Utc>::from(modified)),
            Err(e) => {
                warn!("No archive for {}, not recording it: {}", title, e);
                None
            }
        }
    }

    /// Record the archive times of `titles`.
    ///
    /// An empty list records every archive in the export directory. With
    /// `merge` the entries are overlaid onto the existing document, otherwise
    /// the document is replaced.
    pub async fn write(&self, titles: &[String], merge: bool) -> Result<SyncSnapshot> {
        if titles.is_empty() {
            let all = self.archive_titles().await?;
            return self.record(&all, merge).await;
        }
        self.record(titles, merge).await
    }

    /// Record exactly `titles`, never falling back to the directory scan.
    pub async fn record(&self, titles: &[String], merge: bool) -> Result<SyncSnapshot> {
        let mut recorded = BTreeMap::new();
        for title in titles {
            if let Some(time) = self.archive_time(title).await {
                recorded.insert(title.clone(), time);
            }
        }

        let fresh = SyncSnapshot::new(&self.schema_version, recorded);
        let snapshot = if merge {
            let mut previous = self.load().await?.unwrap_or_else(SyncSnapshot::empty);
            previous.merge(fresh);
            previous
        } else {
            fresh
        };

        let bytes = json::encode(&snapshot, self.minify)?;
        tokio::fs::create_dir_all(&self.export_dir)
            .await
            .map_err(|e| Error::Io(e).classify())?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| Error::Io(e).classify())?;

        info!(
            "Wrote {} with {} titles",
            self.path.display(),
            snapshot.titles.len()
        );
        Ok(snapshot)
    }
}
