//! In-memory text library.
//!
//! Useful for testing and for running the exporter against a JSON dump of
//! a library. Every book has a single schema node with numeric addressing
//! (`"Job 3:4"`).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use folio_common::{Error, Result};

use crate::library::{CatalogSource, EditHistory, LinkIndex, ReferenceResolver, VersionStore};
use crate::model::{
    CalendarCustom, CalendarItem, Chunk, ChunkOrigin, EditQuery, EditTarget, Index, RawLink, Ref,
    SchemaNode, TextNode, Version,
};

/// A version of a book together with its text.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryVersion {
    pub version: Version,
    pub text: TextNode,
    /// Extra fields published in the index document's version list.
    #[serde(default)]
    pub details: Map<String, Value>,
}

/// A book held by [`MemoryLibrary`].
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryBook {
    pub index: Index,
    /// Depth of the addressing scheme; 2 is chapter:verse.
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Segment numbers continue across sections instead of restarting.
    #[serde(default)]
    pub continuous_numbering: bool,
    #[serde(default)]
    pub versions: Vec<MemoryVersion>,
    #[serde(default)]
    pub links: Vec<RawLink>,
    #[serde(default)]
    pub index_document: Option<Map<String, Value>>,
}

fn default_depth() -> usize {
    2
}

impl MemoryBook {
    pub fn new(index: Index, depth: usize) -> Self {
        Self {
            index,
            depth,
            continuous_numbering: false,
            versions: Vec::new(),
            links: Vec::new(),
            index_document: None,
        }
    }

    pub fn with_version(mut self, version: Version, text: TextNode) -> Self {
        self.versions.push(MemoryVersion {
            version,
            text,
            details: Map::new(),
        });
        self
    }

    pub fn with_version_details(mut self, details: Map<String, Value>) -> Self {
        if let Some(last) = self.versions.last_mut() {
            last.details = details;
        }
        self
    }

    pub fn with_link(mut self, link: RawLink) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_continuous_numbering(mut self) -> Self {
        self.continuous_numbering = true;
        self
    }

    fn title(&self) -> &str {
        &self.index.title
    }

    /// Largest child count at `path` over every version.
    fn width_at(&self, path: &[usize]) -> usize {
        self.versions
            .iter()
            .filter_map(|v| v.text.get_element(path))
            .map(|node| node.children().len())
            .max()
            .unwrap_or(0)
    }

    fn has_text_at(&self, path: &[usize]) -> bool {
        self.versions
            .iter()
            .filter_map(|v| v.text.get_element(path))
            .any(|node| !node.is_empty())
    }

    fn make_ref(&self, sections: Vec<usize>, to_sections: Vec<usize>) -> Ref {
        let address = address_string(&sections, &to_sections);
        let (normal, he_normal) = if address.is_empty() {
            (self.index.title.clone(), self.index.he_title.clone())
        } else {
            (
                format!("{} {}", self.index.title, address),
                format!("{} {}", self.index.he_title, address),
            )
        };
        Ref {
            normal,
            he_normal,
            index_title: self.index.title.clone(),
            node_title: self.index.title.clone(),
            sections,
            to_sections,
            depth: self.depth,
        }
    }

    /// Parse the address part of a ref ("3:4", "3:4-6", "3:4-4:2").
    fn parse_address(&self, address: &str) -> Result<Ref> {
        let address = address.trim();
        if address.is_empty() {
            return Ok(self.make_ref(Vec::new(), Vec::new()));
        }
        let (start, end) = match address.split_once('-') {
            Some((start, end)) => (start, Some(end)),
            None => (address, None),
        };
        let sections = parse_numbers(start)?;
        let to_sections = match end {
            None => sections.clone(),
            Some(end) => {
                let tail = parse_numbers(end)?;
                if tail.len() > sections.len() {
                    return Err(Error::InvalidInput(format!("Bad range: {}", address)));
                }
                let mut to = sections[..sections.len() - tail.len()].to_vec();
                to.extend(tail);
                to
            }
        };
        if sections.len() > self.depth {
            return Err(Error::InvalidInput(format!(
                "Ref too deep for {}: {}",
                self.title(),
                address
            )));
        }
        Ok(self.make_ref(sections, to_sections))
    }

    /// Section-level paths in document order.
    fn section_paths(&self) -> Vec<Vec<usize>> {
        let mut paths = Vec::new();
        self.walk_sections(&mut Vec::new(), &mut paths);
        paths
    }

    fn walk_sections(&self, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if prefix.len() + 1 == self.depth {
            out.push(prefix.clone());
            return;
        }
        let zero_based: Vec<usize> = prefix.iter().map(|s| s - 1).collect();
        for i in 1..=self.width_at(&zero_based) {
            prefix.push(i);
            self.walk_sections(prefix, out);
            prefix.pop();
        }
    }
}

fn parse_numbers(s: &str) -> Result<Vec<usize>> {
    s.split(':')
        .map(|n| {
            n.trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| Error::InvalidInput(format!("Bad ref address: {}", s)))
        })
        .collect()
}

fn join_numbers(numbers: &[usize]) -> String {
    numbers
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(":")
}

fn address_string(sections: &[usize], to_sections: &[usize]) -> String {
    let start = join_numbers(sections);
    if sections == to_sections || to_sections.is_empty() {
        return start;
    }
    let common = sections
        .iter()
        .zip(to_sections)
        .take_while(|(a, b)| a == b)
        .count();
    format!("{}-{}", start, join_numbers(&to_sections[common..]))
}

/// Merge version texts segment by segment, first non-blank candidate wins.
fn merge_nodes(candidates: &[(&str, &TextNode)], sources: &mut Vec<String>) -> TextNode {
    let width = candidates
        .iter()
        .filter_map(|(_, node)| match node {
            TextNode::Branch(children) => Some(children.len()),
            TextNode::Leaf(_) => None,
        })
        .max();

    match width {
        None => {
            for (title, node) in candidates {
                if let TextNode::Leaf(text) = node {
                    if !text.trim().is_empty() {
                        if !sources.iter().any(|s| s == title) {
                            sources.push(title.to_string());
                        }
                        return TextNode::Leaf(text.clone());
                    }
                }
            }
            TextNode::Leaf(String::new())
        }
        Some(width) => TextNode::Branch(
            (0..width)
                .map(|i| {
                    let children: Vec<(&str, &TextNode)> = candidates
                        .iter()
                        .filter_map(|(title, node)| match node {
                            TextNode::Branch(c) => c.get(i).map(|child| (*title, child)),
                            TextNode::Leaf(_) => None,
                        })
                        .collect();
                    merge_nodes(&children, sources)
                })
                .collect(),
        ),
    }
}

/// Kind of a recorded edit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "rev_type", rename_all = "snake_case")]
pub enum EditKind {
    Text {
        #[serde(rename = "ref")]
        tref: String,
    },
    Link {
        #[serde(default)]
        old_refs: Vec<String>,
        #[serde(default)]
        new_refs: Vec<String>,
    },
    Index {
        title: String,
    },
}

/// One entry of the edit history.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EditEvent {
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EditKind,
}

/// Calendar item with the days and calendar variants it applies to.
#[derive(Debug, Clone, Deserialize)]
struct MemoryCalendarEntry {
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    diaspora: Option<bool>,
    #[serde(default)]
    custom: Option<CalendarCustom>,
    item: CalendarItem,
}

/// In-memory text library.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryLibrary {
    books: Vec<MemoryBook>,
    toc: Vec<Value>,
    search_toc: Vec<Value>,
    topic_toc: Value,
    text_categories: Vec<String>,
    category_terms: BTreeMap<String, String>,
    authors: Vec<String>,
    calendar: Vec<MemoryCalendarEntry>,
    history: Vec<EditEvent>,
}

impl MemoryLibrary {
    /// Create a new empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a library dump from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&content).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn with_book(mut self, book: MemoryBook) -> Self {
        self.books.push(book);
        self
    }

    pub fn with_toc(mut self, toc: Vec<Value>) -> Self {
        self.toc = toc;
        self
    }

    pub fn with_search_toc(mut self, toc: Vec<Value>) -> Self {
        self.search_toc = toc;
        self
    }

    pub fn with_topic_toc(mut self, topic_toc: Value) -> Self {
        self.topic_toc = topic_toc;
        self
    }

    /// Register a category, with its Hebrew term when one exists.
    pub fn with_category(mut self, category: impl Into<String>, term: Option<&str>) -> Self {
        let category = category.into();
        if let Some(term) = term {
            self.category_terms.insert(category.clone(), term.to_string());
        }
        self.text_categories.push(category);
        self
    }

    pub fn with_author(mut self, title: impl Into<String>) -> Self {
        self.authors.push(title.into());
        self
    }

    /// Add a calendar item; `None` filters match every date or variant.
    pub fn with_calendar_item(
        mut self,
        date: Option<NaiveDate>,
        diaspora: Option<bool>,
        custom: Option<CalendarCustom>,
        item: CalendarItem,
    ) -> Self {
        self.calendar.push(MemoryCalendarEntry {
            date,
            diaspora,
            custom,
            item,
        });
        self
    }

    pub fn record_edit(&mut self, date: DateTime<Utc>, kind: EditKind) {
        self.history.push(EditEvent { date, kind });
    }

    fn book(&self, title: &str) -> Result<&MemoryBook> {
        self.books
            .iter()
            .find(|b| b.index.title == title)
            .ok_or_else(|| Error::BookName(title.to_string()))
    }

    /// Book whose title prefixes `tref`, preferring the longest title.
    fn book_for_ref<'s, 't>(&'s self, tref: &'t str) -> Result<(&'s MemoryBook, &'t str)> {
        self.books
            .iter()
            .filter_map(|b| {
                let rest = tref.strip_prefix(b.title())?;
                (rest.is_empty() || rest.starts_with(' ')).then_some((b, rest))
            })
            .max_by_key(|(b, _)| b.title().len())
            .ok_or_else(|| Error::BookName(tref.to_string()))
    }

    fn parse_ref_sync(&self, tref: &str) -> Result<Ref> {
        let (book, rest) = self.book_for_ref(tref)?;
        book.parse_address(rest)
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| Error::InvalidInput(format!("Bad pattern {}: {}", p, e))))
        .collect()
}

fn any_match(patterns: &[Regex], refs: &[String]) -> bool {
    refs.iter().any(|r| patterns.iter().any(|p| p.is_match(r)))
}

fn priority_rank(version: &Version) -> f64 {
    version.priority.unwrap_or(f64::NEG_INFINITY)
}

#[async_trait]
impl ReferenceResolver for MemoryLibrary {
    async fn all_index_titles(&self) -> Result<Vec<String>> {
        Ok(self.books.iter().map(|b| b.index.title.clone()).collect())
    }

    async fn index(&self, title: &str) -> Result<Index> {
        Ok(self.book(title)?.index.clone())
    }

    async fn leaf_nodes(&self, title: &str) -> Result<Vec<SchemaNode>> {
        let book = self.book(title)?;
        Ok(vec![SchemaNode {
            full_title: book.index.title.clone(),
            node_ref: book.make_ref(Vec::new(), Vec::new()),
        }])
    }

    async fn top_section_refs(&self, title: &str) -> Result<Vec<Ref>> {
        let book = self.book(title)?;
        Ok((1..=book.width_at(&[]))
            .map(|i| book.make_ref(vec![i], vec![i]))
            .collect())
    }

    async fn subrefs(&self, r: &Ref) -> Result<Vec<Ref>> {
        let book = self.book(&r.index_title)?;
        if r.sections.len() >= book.depth {
            return Ok(Vec::new());
        }
        Ok((1..=book.width_at(&r.zero_based_sections()))
            .map(|i| {
                let mut sections = r.sections.clone();
                sections.push(i);
                book.make_ref(sections.clone(), sections)
            })
            .collect())
    }

    async fn parse_ref(&self, tref: &str) -> Result<Ref> {
        self.parse_ref_sync(tref)
    }

    async fn segment_offset(&self, r: &Ref) -> Result<usize> {
        let book = self.book(&r.index_title)?;
        if !book.continuous_numbering || r.sections.is_empty() {
            return Ok(0);
        }
        let path = r.zero_based_sections();
        let (last, parent) = path.split_last().map(|(l, p)| (*l, p.to_vec())).unwrap_or((0, Vec::new()));
        Ok((0..last)
            .map(|k| {
                let mut sibling = parent.clone();
                sibling.push(k);
                book.width_at(&sibling)
            })
            .sum())
    }

    async fn adjacent_sections(&self, r: &Ref) -> Result<(Option<Ref>, Option<Ref>)> {
        let book = self.book(&r.index_title)?;
        let with_text: Vec<Vec<usize>> = book
            .section_paths()
            .into_iter()
            .filter(|p| book.has_text_at(&p.iter().map(|s| s - 1).collect::<Vec<_>>()))
            .collect();
        let prev = with_text
            .iter()
            .filter(|p| **p < r.sections)
            .last()
            .map(|p| book.make_ref(p.clone(), p.clone()));
        let next = with_text
            .iter()
            .find(|p| **p > r.sections)
            .map(|p| book.make_ref(p.clone(), p.clone()));
        Ok((prev, next))
    }

    async fn title_patterns(&self, title: &str) -> Result<Vec<String>> {
        let book = self.book(title)?;
        Ok(vec![format!(r"^{}(?:$| \d)", regex::escape(book.title()))])
    }
}

#[async_trait]
impl VersionStore for MemoryLibrary {
    async fn versions(&self, node: &SchemaNode) -> Result<Vec<Version>> {
        let book = self.book(&node.node_ref.index_title)?;
        Ok(book.versions.iter().map(|v| v.version.clone()).collect())
    }

    async fn chunk(
        &self,
        node: &SchemaNode,
        language: &str,
        version_title: Option<&str>,
    ) -> Result<Chunk> {
        let book = self.book(&node.node_ref.index_title)?;

        if let Some(version_title) = version_title {
            let found = book
                .versions
                .iter()
                .find(|v| v.version.title == version_title && v.version.language == language)
                .ok_or_else(|| {
                    Error::NotFound(format!("Version {} [{}]", version_title, language))
                })?;
            return Ok(Chunk {
                language: language.to_string(),
                content: found.text.clone(),
                origin: ChunkOrigin::Single(found.version.clone()),
            });
        }

        let mut candidates: Vec<&MemoryVersion> = book
            .versions
            .iter()
            .filter(|v| v.version.language == language)
            .collect();
        // Stable sort keeps library order among equal priorities.
        candidates.sort_by(|a, b| {
            priority_rank(&b.version)
                .partial_cmp(&priority_rank(&a.version))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let inputs: Vec<(&str, &TextNode)> = candidates
            .iter()
            .map(|v| (v.version.title.as_str(), &v.text))
            .collect();
        let mut sources = Vec::new();
        let content = match inputs.len() {
            0 => TextNode::empty(),
            _ => merge_nodes(&inputs, &mut sources),
        };

        let origin = match (candidates.first(), sources.as_slice()) {
            (Some(top), [only]) if *only == top.version.title => {
                ChunkOrigin::Single(top.version.clone())
            }
            _ => ChunkOrigin::Merged {
                versions: candidates.iter().map(|v| v.version.clone()).collect(),
                sources,
            },
        };

        Ok(Chunk {
            language: language.to_string(),
            content,
            origin,
        })
    }

    async fn version_list(&self, title: &str) -> Result<Vec<Map<String, Value>>> {
        let book = self.book(title)?;
        book.versions
            .iter()
            .map(|v| -> Result<Map<String, Value>> {
                let mut record = match serde_json::to_value(&v.version)? {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                record.extend(v.details.clone());
                Ok(record)
            })
            .collect()
    }

    async fn serialized_index(&self, title: &str) -> Result<Map<String, Value>> {
        let book = self.book(title)?;
        if let Some(document) = &book.index_document {
            return Ok(document.clone());
        }
        match serde_json::to_value(&book.index)? {
            Value::Object(mut map) => {
                map.insert("depth".to_string(), Value::from(book.depth));
                Ok(map)
            }
            _ => Err(Error::Serialization(format!("Index {} is not an object", title))),
        }
    }
}

#[async_trait]
impl LinkIndex for MemoryLibrary {
    async fn links(&self, section: &Ref) -> Result<Vec<RawLink>> {
        let book = self.book(&section.index_title)?;
        Ok(book
            .links
            .iter()
            .filter(|link| {
                self.parse_ref_sync(&link.anchor_ref)
                    .map(|anchor| {
                        anchor.index_title == section.index_title
                            && anchor.sections.len() > section.sections.len()
                            && anchor.sections.starts_with(&section.sections)
                    })
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EditHistory for MemoryLibrary {
    async fn count_edits(&self, query: &EditQuery) -> Result<u64> {
        let after = self.history.iter().filter(|e| e.date > query.since);
        let count = match &query.target {
            EditTarget::TextRef(patterns) => {
                let patterns = compile_patterns(patterns)?;
                after
                    .filter(|e| match &e.kind {
                        EditKind::Text { tref } => any_match(&patterns, std::slice::from_ref(tref)),
                        _ => false,
                    })
                    .count()
            }
            EditTarget::LinkOldRefs(patterns) => {
                let patterns = compile_patterns(patterns)?;
                after
                    .filter(|e| match &e.kind {
                        EditKind::Link { old_refs, .. } => any_match(&patterns, old_refs),
                        _ => false,
                    })
                    .count()
            }
            EditTarget::LinkNewRefs(patterns) => {
                let patterns = compile_patterns(patterns)?;
                after
                    .filter(|e| match &e.kind {
                        EditKind::Link { new_refs, .. } => any_match(&patterns, new_refs),
                        _ => false,
                    })
                    .count()
            }
            EditTarget::IndexTitle(title) => after
                .filter(|e| matches!(&e.kind, EditKind::Index { title: t } if t == title))
                .count(),
        };
        Ok(count as u64)
    }
}

#[async_trait]
impl CatalogSource for MemoryLibrary {
    async fn toc(&self) -> Result<Vec<Value>> {
        Ok(self.toc.clone())
    }

    async fn search_toc(&self) -> Result<Vec<Value>> {
        if self.search_toc.is_empty() {
            return Ok(self.toc.clone());
        }
        Ok(self.search_toc.clone())
    }

    async fn topic_toc(&self) -> Result<Value> {
        Ok(self.topic_toc.clone())
    }

    async fn text_categories(&self) -> Result<Vec<String>> {
        Ok(self.text_categories.clone())
    }

    async fn category_term(&self, category: &str) -> Result<Option<String>> {
        Ok(self.category_terms.get(category).cloned())
    }

    async fn author_titles(&self) -> Result<Vec<String>> {
        Ok(self.authors.clone())
    }

    async fn calendar_items(
        &self,
        date: NaiveDate,
        diaspora: bool,
        custom: CalendarCustom,
    ) -> Result<Vec<CalendarItem>> {
        Ok(self
            .calendar
            .iter()
            .filter(|e| e.date.map_or(true, |d| d == date))
            .filter(|e| e.diaspora.map_or(true, |d| d == diaspora))
            .filter(|e| e.custom.map_or(true, |c| c == custom))
            .map(|e| e.item.clone())
            .collect())
    }
}
