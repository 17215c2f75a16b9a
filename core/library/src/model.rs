//! Data model shared with the text library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use folio_common::VersionKey;

/// A book-level logical text unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub title: String,
    pub he_title: String,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Corpus the book belongs to (e.g. "Tanakh"), if any.
    #[serde(default)]
    pub primary_corpus: Option<String>,
}

/// An address into an [`Index`] at section or segment granularity.
///
/// `sections` and `to_sections` are 1-based positional paths; they differ
/// only for ranged refs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    /// Canonical string form.
    pub normal: String,
    /// Localized string form.
    pub he_normal: String,
    pub index_title: String,
    /// Full title of the schema node this ref addresses into.
    pub node_title: String,
    pub sections: Vec<usize>,
    pub to_sections: Vec<usize>,
    /// Depth of the node's addressing scheme.
    pub depth: usize,
}

impl Ref {
    pub fn is_section_level(&self) -> bool {
        self.sections.len() + 1 == self.depth
    }

    pub fn is_segment_level(&self) -> bool {
        self.sections.len() == self.depth
    }

    /// Sections as 0-based array indices.
    pub fn zero_based_sections(&self) -> Vec<usize> {
        self.sections.iter().map(|s| s.saturating_sub(1)).collect()
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normal)
    }
}

/// A leaf node of an index schema, carrying its own text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNode {
    pub full_title: String,
    /// Ref addressing the whole node.
    pub node_ref: Ref,
}

/// A named language edition of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "versionTitle")]
    pub title: String,
    pub language: String,
    /// Ranking used when content is merged across versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

impl Version {
    pub fn new(title: impl Into<String>, language: impl Into<String>, priority: Option<f64>) -> Self {
        Self {
            title: title.into(),
            language: language.into(),
            priority,
        }
    }

    pub fn key(&self) -> VersionKey {
        VersionKey::new(&self.title, &self.language)
    }
}

/// Jagged text content: a leaf string or an ordered list of children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextNode {
    Leaf(String),
    Branch(Vec<TextNode>),
}

impl TextNode {
    pub fn empty() -> Self {
        TextNode::Branch(Vec::new())
    }

    /// Children of a branch; a leaf has none.
    pub fn children(&self) -> &[TextNode] {
        match self {
            TextNode::Leaf(_) => &[],
            TextNode::Branch(children) => children,
        }
    }

    /// Element at a 0-based index path, `None` when any index is out of range.
    pub fn get_element(&self, path: &[usize]) -> Option<&TextNode> {
        path.iter()
            .try_fold(self, |node, &i| node.children().get(i))
    }

    /// True when no leaf holds non-blank text.
    pub fn is_empty(&self) -> bool {
        match self {
            TextNode::Leaf(text) => text.trim().is_empty(),
            TextNode::Branch(children) => children.iter().all(TextNode::is_empty),
        }
    }

    /// Apply `f` to every leaf, keeping the structure.
    pub fn map_leaves<F>(&self, f: &F) -> TextNode
    where
        F: Fn(&str) -> String,
    {
        match self {
            TextNode::Leaf(text) => TextNode::Leaf(f(text)),
            TextNode::Branch(children) => {
                TextNode::Branch(children.iter().map(|c| c.map_leaves(f)).collect())
            }
        }
    }
}

/// Where the text of a [`Chunk`] came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOrigin {
    /// One version supplied all of the text.
    Single(Version),
    /// Assembled segment by segment from several versions.
    Merged {
        /// Candidate versions considered for the merge.
        versions: Vec<Version>,
        /// Titles of the versions that actually contributed, in encounter order.
        sources: Vec<String>,
    },
}

/// Materialized text of a schema node in one language.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub language: String,
    pub content: TextNode,
    pub origin: ChunkOrigin,
}

impl Chunk {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn is_merged(&self) -> bool {
        matches!(self.origin, ChunkOrigin::Merged { .. })
    }
}

/// A link as returned by the link lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLink {
    /// Ref of the anchor inside the section being exported.
    pub anchor_ref: String,
    pub source_ref: String,
    pub source_he_ref: String,
    pub category: String,
    #[serde(default)]
    pub source_has_en: bool,
}

/// Which edits an [`EditQuery`] counts.
#[derive(Debug, Clone, PartialEq)]
pub enum EditTarget {
    /// Text edits whose ref matches any of the patterns.
    TextRef(Vec<String>),
    /// Link edits whose previous refs match any of the patterns.
    LinkOldRefs(Vec<String>),
    /// Link edits whose new refs match any of the patterns.
    LinkNewRefs(Vec<String>),
    /// Index metadata edits tagged with exactly this title.
    IndexTitle(String),
}

/// Count edits strictly after `since` matching `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct EditQuery {
    pub since: DateTime<Utc>,
    pub target: EditTarget,
}

/// English/Hebrew pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(default)]
    pub en: String,
    #[serde(default)]
    pub he: String,
}

/// Liturgical custom a calendar is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarCustom {
    Ashkenazi,
    Sephardi,
}

impl CalendarCustom {
    pub const ALL: [CalendarCustom; 2] = [CalendarCustom::Ashkenazi, CalendarCustom::Sephardi];

    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarCustom::Ashkenazi => "ashkenazi",
            CalendarCustom::Sephardi => "sephardi",
        }
    }

    pub fn initial(&self) -> char {
        match self {
            CalendarCustom::Ashkenazi => 'a',
            CalendarCustom::Sephardi => 's',
        }
    }
}

/// One learning-schedule entry for a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarItem {
    pub title: LocalizedText,
    pub display_value: LocalizedText,
    /// Items with the same order are variants of one schedule.
    pub order: i64,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub tref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
