//! Small value types shared by the export stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity under which a version's text is published: `(versionTitle, language)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionKey {
    #[serde(rename = "versionTitle")]
    pub title: String,
    pub language: String,
}

impl VersionKey {
    pub fn new(title: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            language: language.into(),
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.title, self.language)
    }
}

/// File name of a book's primary archive.
pub fn archive_name(title: &str) -> String {
    format!("{}.zip", title)
}

/// Book title of a primary archive file name, if it is one.
pub fn title_from_archive(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(".zip")
        .filter(|title| !title.is_empty() && !title.contains('/'))
}
