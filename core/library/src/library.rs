//! Text library trait definitions.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};

use folio_common::Result;

use crate::model::{CalendarCustom, CalendarItem, Chunk, EditQuery, Index, RawLink, Ref, SchemaNode, Version};

/// Resolves titles and enumerates the structure of an index.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Every index title, in library order.
    async fn all_index_titles(&self) -> Result<Vec<String>>;

    /// Look up an index by title.
    ///
    /// # Errors
    /// - [`folio_common::Error::BookName`] if no such index exists
    async fn index(&self, title: &str) -> Result<Index>;

    /// Leaf schema nodes of an index, each of which carries text.
    async fn leaf_nodes(&self, title: &str) -> Result<Vec<SchemaNode>>;

    /// Refs of the top-level sections of an index, in order.
    async fn top_section_refs(&self, title: &str) -> Result<Vec<Ref>>;

    /// Direct children of a ref that is above section level.
    async fn subrefs(&self, r: &Ref) -> Result<Vec<Ref>>;

    /// Parse a textual ref.
    async fn parse_ref(&self, tref: &str) -> Result<Ref>;

    /// Number of segments preceding this section in its index's numbering.
    ///
    /// Zero for indexes whose segment numbering restarts in every section.
    async fn segment_offset(&self, r: &Ref) -> Result<usize>;

    /// Previous and next sections that carry text.
    async fn adjacent_sections(&self, r: &Ref) -> Result<(Option<Ref>, Option<Ref>)>;

    /// Regular expressions matching every ref string inside the titled index.
    ///
    /// # Errors
    /// - [`folio_common::Error::BookName`] if the title does not resolve
    async fn title_patterns(&self, title: &str) -> Result<Vec<String>>;
}

/// Supplies version metadata and text.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Every version known for a schema node.
    async fn versions(&self, node: &SchemaNode) -> Result<Vec<Version>>;

    /// Text of a node in a language.
    ///
    /// With `version_title` the text of that exact version; without it the
    /// default text for the language, merged across versions when no
    /// single version covers the whole node.
    async fn chunk(&self, node: &SchemaNode, language: &str, version_title: Option<&str>)
        -> Result<Chunk>;

    /// Version records of an index as published in its index document.
    async fn version_list(&self, title: &str) -> Result<Vec<Map<String, Value>>>;

    /// Structural and category metadata of an index, with content counts.
    async fn serialized_index(&self, title: &str) -> Result<Map<String, Value>>;
}

/// Looks up links anchored in a section.
#[async_trait]
pub trait LinkIndex: Send + Sync {
    async fn links(&self, section: &Ref) -> Result<Vec<RawLink>>;
}

/// Append-only edit history.
#[async_trait]
pub trait EditHistory: Send + Sync {
    async fn count_edits(&self, query: &EditQuery) -> Result<u64>;
}

/// Library-wide catalog data published alongside the texts.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Raw table-of-contents tree.
    async fn toc(&self) -> Result<Vec<Value>>;

    /// Raw search-filter table-of-contents tree.
    async fn search_toc(&self) -> Result<Vec<Value>>;

    /// Topic table of contents, published as-is.
    async fn topic_toc(&self) -> Result<Value>;

    /// English names of every text category.
    async fn text_categories(&self) -> Result<Vec<String>>;

    /// Hebrew name of a category, `None` when no term exists.
    async fn category_term(&self, category: &str) -> Result<Option<String>>;

    /// Every title of every author.
    async fn author_titles(&self) -> Result<Vec<String>>;

    /// Learning-schedule items for a date.
    async fn calendar_items(
        &self,
        date: NaiveDate,
        diaspora: bool,
        custom: CalendarCustom,
    ) -> Result<Vec<CalendarItem>>;
}

/// Everything the exporter needs from the text library.
pub trait TextLibrary: ReferenceResolver + VersionStore + LinkIndex + EditHistory + CatalogSource {}

impl<T> TextLibrary for T where
    T: ReferenceResolver + VersionStore + LinkIndex + EditHistory + CatalogSource
{
}
