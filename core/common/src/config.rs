//! Export configuration.
//!
//! One immutable [`ExportConfig`] is built at startup and passed by
//! reference to every component. All filesystem locations are derived from
//! it; nothing in the pipeline depends on the process working directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::archive_name;

/// Snapshot of the synchronization state, relative to the export directory.
pub const LAST_UPDATED_FILENAME: &str = "last_updated.json";

/// Directory holding ad-hoc and curated bundles, relative to the export directory.
pub const BUNDLES_DIRNAME: &str = "bundles";

/// Shared documents published next to the book archives.
pub const TOC_FILENAME: &str = "toc.json";
pub const SEARCH_TOC_FILENAME: &str = "search_toc.json";
pub const TOPIC_TOC_FILENAME: &str = "topic_toc.json";
pub const CATEGORIES_FILENAME: &str = "hebrew_categories.json";
pub const PEOPLE_FILENAME: &str = "people.json";
pub const PACKAGES_FILENAME: &str = "packages.json";
pub const CALENDAR_FILENAME: &str = "calendar.json";

/// Edge-cache (Cloudflare) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    /// Public base URL the export directory is served under.
    pub base_url: String,
    /// Zone identifier.
    pub zone: String,
    /// Account email sent as `X-Auth-Email`.
    pub email: String,
    /// API key sent as `X-Auth-Key`.
    pub api_key: String,
    /// API root, overridable for tests.
    #[serde(default = "default_cdn_api_base")]
    pub api_base: String,
}

fn default_cdn_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

/// Alert channel (Slack-compatible incoming webhook).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub webhook_url: String,
    #[serde(default = "default_alert_channel")]
    pub channel: String,
    #[serde(default = "default_alert_username")]
    pub username: String,
}

fn default_alert_channel() -> String {
    "#engineering-mobile".to_string()
}

fn default_alert_username() -> String {
    "Mobile Export".to_string()
}

/// Configuration for an export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Root under which one directory per schema version is written.
    pub export_root: PathBuf,
    /// Schema version of the exported format.
    pub schema_version: String,
    /// Compressed size after which a bundle part is closed, in bytes.
    pub max_archive_size: u64,
    /// Ad-hoc bundle count at which eviction kicks in.
    pub max_bundles: usize,
    /// Write JSON without whitespace.
    pub minify_json: bool,
    /// Primary corpora for which every version is exported.
    pub all_versions_corpora: Vec<String>,
    /// App source trees that receive the shared documents on release.
    pub sources_dirs: Vec<PathBuf>,
    /// Package catalog overriding the built-in one.
    pub packages_path: Option<PathBuf>,
    /// Number of leading TOC categories turned into packages.
    pub top_level_packages: usize,
    /// Paths per edge-cache purge request.
    pub purge_batch_size: usize,
    /// Purge requests in flight at once.
    pub purge_concurrency: usize,
    /// Calendar window start, in days before today.
    pub calendar_days_back: i64,
    /// Calendar window length after today, in days.
    pub calendar_days_ahead: i64,
    /// Log alerts instead of sending them.
    pub debug_mode: bool,
    pub cdn: Option<CdnConfig>,
    pub alert: Option<AlertConfig>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_root: PathBuf::from("static/ios-export"),
            schema_version: "7".to_string(),
            max_archive_size: 100_000_000,
            max_bundles: 50,
            minify_json: false,
            all_versions_corpora: vec!["Tanakh".to_string()],
            sources_dirs: Vec::new(),
            packages_path: None,
            top_level_packages: 7,
            purge_batch_size: 25,
            purge_concurrency: 8,
            calendar_days_back: 2,
            calendar_days_ahead: 365,
            debug_mode: false,
            cdn: None,
            alert: None,
        }
    }
}

impl ExportConfig {
    /// Configuration rooted at `export_root`, everything else default.
    pub fn with_root(export_root: impl Into<PathBuf>) -> Self {
        Self {
            export_root: export_root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        tracing::debug!("Loaded export configuration from {}", path.display());
        Ok(config)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version.is_empty() {
            return Err(Error::InvalidInput("schema_version cannot be empty".to_string()));
        }
        if self.purge_batch_size == 0 || self.purge_concurrency == 0 {
            return Err(Error::InvalidInput(
                "purge batch size and concurrency must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory of the current schema version.
    pub fn export_dir(&self) -> PathBuf {
        self.export_root.join(&self.schema_version)
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.export_dir().join(BUNDLES_DIRNAME)
    }

    pub fn last_updated_path(&self) -> PathBuf {
        self.export_dir().join(LAST_UPDATED_FILENAME)
    }

    /// Primary archive of a book.
    pub fn book_archive(&self, title: &str) -> PathBuf {
        self.export_dir().join(archive_name(title))
    }

    /// A shared document in the export directory.
    pub fn shared_path(&self, filename: &str) -> PathBuf {
        self.export_dir().join(filename)
    }
}
