//! Alignment of version texts to absolute segment positions.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use folio_common::{Error, ExportConfig, Result, SparseSeq, VersionKey};
use folio_library::{Chunk, ChunkOrigin, Index, RawLink, Ref, TextLibrary, TextNode, Version};

use crate::markup::strip_itags;

/// Section text per published version identity.
pub type SectionTexts = BTreeMap<VersionKey, SparseSeq<TextNode>>;

/// A link reduced to what the clients render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleLink {
    pub source_he_ref: String,
    pub source_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub source_has_en: bool,
}

impl From<&RawLink> for SimpleLink {
    fn from(link: &RawLink) -> Self {
        let category = matches!(link.category.as_str(), "Quoting Commentary" | "Targum")
            .then(|| link.category.clone());
        Self {
            source_he_ref: link.source_he_ref.clone(),
            source_ref: link.source_ref.clone(),
            category,
            source_has_en: link.source_has_en,
        }
    }
}

/// Metadata document of one section.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMetadata {
    #[serde(rename = "ref")]
    pub tref: String,
    pub he_ref: String,
    pub index_title: String,
    pub he_title: String,
    pub section_ref: String,
    pub next: Option<String>,
    pub prev: Option<String>,
    pub versions: Vec<VersionKey>,
    pub links: SparseSeq<Vec<SimpleLink>>,
}

struct NodeTexts {
    chunks: Vec<Chunk>,
    versions: Vec<Version>,
}

/// Exporter bound to one index, holding the text of every leaf node.
pub struct IndexExporter<'a, L: ?Sized> {
    library: &'a L,
    index: Index,
    nodes: HashMap<String, NodeTexts>,
}

impl<'a, L> IndexExporter<'a, L>
where
    L: TextLibrary + ?Sized,
{
    /// Load the chunks of every leaf node of `index`.
    ///
    /// Books of a corpus listed in `all_versions_corpora` load one chunk per
    /// known version; others load the default English and Hebrew text.
    /// Empty chunks are dropped.
    pub async fn load(library: &'a L, index: &Index, config: &ExportConfig) -> Result<Self> {
        let all_versions = index
            .primary_corpus
            .as_ref()
            .is_some_and(|corpus| config.all_versions_corpora.contains(corpus));

        let mut nodes = HashMap::new();
        for node in library.leaf_nodes(&index.title).await? {
            let versions = library.versions(&node).await?;

            let mut chunks = Vec::new();
            if all_versions {
                for version in &versions {
                    chunks.push(
                        library
                            .chunk(&node, &version.language, Some(&version.title))
                            .await?,
                    );
                }
            } else {
                for language in ["en", "he"] {
                    chunks.push(library.chunk(&node, language, None).await?);
                }
            }
            chunks.retain(|c| !c.is_empty());

            debug!(
                "Loaded {} chunks for {} ({} versions)",
                chunks.len(),
                node.full_title,
                versions.len()
            );
            nodes.insert(node.full_title, NodeTexts { chunks, versions });
        }

        Ok(Self {
            library,
            index: index.clone(),
            nodes,
        })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Texts and metadata of one section-level ref.
    ///
    /// Every array is addressed by absolute segment position, so a section
    /// whose numbering continues from earlier sections starts with nulls.
    /// Whitespace-only segments stay null; versions without any text in the
    /// section are left out.
    pub async fn section_data(&self, section: &Ref) -> Result<(SectionTexts, SectionMetadata)> {
        let node = self
            .nodes
            .get(&section.node_title)
            .ok_or_else(|| Error::NotFound(format!("Schema node {}", section.node_title)))?;

        let (prev, next) = self.library.adjacent_sections(section).await?;

        let path = section.zero_based_sections();
        let arrays: Vec<Vec<TextNode>> = node
            .chunks
            .iter()
            .map(|chunk| section_array(&chunk.content, &path))
            .collect();

        let section_length = arrays.iter().map(Vec::len).max().unwrap_or(0);
        let anchored = self.anchored_links(section, section_length).await?;
        let offset = self.library.segment_offset(section).await?;

        let mut links = SparseSeq::new();
        let mut serialized: Vec<SparseSeq<TextNode>> =
            arrays.iter().map(|_| SparseSeq::new()).collect();

        for x in 0..section_length {
            let position = x + offset + 1;
            if let Some(segment_links) = anchored.get(&(x + 1)) {
                links.place(position, segment_links.clone());
            }
            for (array, seq) in arrays.iter().zip(serialized.iter_mut()) {
                match array.get(x) {
                    Some(segment) if !segment.is_empty() => seq.place(position, segment.clone()),
                    _ => {}
                }
            }
        }

        let mut texts = SectionTexts::new();
        for (chunk, seq) in node.chunks.iter().zip(serialized) {
            if seq.is_blank() {
                continue;
            }
            match version_identity(chunk) {
                Some(key) => {
                    texts.insert(key, seq);
                }
                None => debug!("Merged chunk of {} has no sources", section),
            }
        }

        let mut versions: Vec<VersionKey> = node
            .versions
            .iter()
            .map(Version::key)
            .filter(|key| texts.contains_key(key))
            .collect();
        for key in texts.keys() {
            if !versions.contains(key) {
                versions.push(key.clone());
            }
        }

        let metadata = SectionMetadata {
            tref: section.normal.clone(),
            he_ref: section.he_normal.clone(),
            index_title: self.index.title.clone(),
            he_title: self.index.he_title.clone(),
            section_ref: section.normal.clone(),
            next: next.map(|r| r.normal),
            prev: prev.map(|r| r.normal),
            versions,
            links,
        };

        Ok((texts, metadata))
    }

    /// Links keyed by 1-based segment number within the section.
    async fn anchored_links(
        &self,
        section: &Ref,
        section_length: usize,
    ) -> Result<BTreeMap<usize, Vec<SimpleLink>>> {
        let mut anchored: BTreeMap<usize, Vec<SimpleLink>> = BTreeMap::new();

        for link in self.library.links(section).await? {
            let anchor = match self.library.parse_ref(&link.anchor_ref).await {
                Ok(anchor) => anchor,
                Err(e) => {
                    debug!("Skipping link with bad anchor {}: {}", link.anchor_ref, e);
                    continue;
                }
            };
            if !anchor.is_segment_level() || anchor.sections.is_empty() {
                continue;
            }

            let last = anchor.sections.len() - 1;
            let start = anchor.sections[last];
            let same_section = anchor.to_sections.len() == anchor.sections.len()
                && anchor.sections[..last] == anchor.to_sections[..last];
            let end = if same_section {
                anchor.to_sections[last]
            } else {
                section_length
            };

            let simple = SimpleLink::from(&link);
            for segment in start..=end {
                anchored.entry(segment).or_default().push(simple.clone());
            }
        }

        Ok(anchored)
    }
}

/// Segments at a 0-based section path, markup stripped.
///
/// An empty path selects the whole node; an out-of-range path selects nothing.
fn section_array(content: &TextNode, path: &[usize]) -> Vec<TextNode> {
    let strip = |s: &str| strip_itags(s);
    match content.get_element(path) {
        Some(TextNode::Branch(children)) => children.iter().map(|c| c.map_leaves(&strip)).collect(),
        Some(leaf @ TextNode::Leaf(_)) => vec![leaf.map_leaves(&strip)],
        None => Vec::new(),
    }
}

/// The single identity under which a chunk's text is published.
///
/// A merged chunk is attributed to the contributing source with the highest
/// priority. Sources without a priority rank lowest; the first of equally
/// ranked sources wins.
pub(crate) fn version_identity(chunk: &Chunk) -> Option<VersionKey> {
    match &chunk.origin {
        ChunkOrigin::Single(version) => Some(version.key()),
        ChunkOrigin::Merged { versions, sources } => {
            let priority = |title: &str| {
                versions
                    .iter()
                    .find(|v| v.title == title)
                    .and_then(|v| v.priority)
                    .unwrap_or(f64::NEG_INFINITY)
            };

            let mut best: Option<(&str, f64)> = None;
            for source in sources {
                let rank = priority(source);
                match best {
                    Some((_, top)) if rank <= top => {}
                    _ => best = Some((source, rank)),
                }
            }
            best.map(|(title, _)| VersionKey::new(title, &chunk.language))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_library::{MemoryBook, MemoryLibrary, ReferenceResolver};

    fn leaf(s: &str) -> TextNode {
        TextNode::Leaf(s.to_string())
    }

    fn branch(items: &[&str]) -> TextNode {
        TextNode::Branch(items.iter().map(|s| leaf(s)).collect())
    }

    fn index(title: &str, corpus: Option<&str>) -> Index {
        Index {
            title: title.to_string(),
            he_title: format!("{} (he)", title),
            categories: Vec::new(),
            primary_corpus: corpus.map(str::to_string),
        }
    }

    fn merged(versions: Vec<Version>, sources: &[&str]) -> Chunk {
        Chunk {
            language: "en".to_string(),
            content: TextNode::empty(),
            origin: ChunkOrigin::Merged {
                versions,
                sources: sources.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    #[test]
    fn test_identity_prefers_contributing_source() {
        let chunk = merged(
            vec![
                Version::new("Five", "en", Some(5.0)),
                Version::new("Ten", "en", Some(10.0)),
                Version::new("None", "en", None),
            ],
            &["Ten"],
        );
        assert_eq!(version_identity(&chunk), Some(VersionKey::new("Ten", "en")));
    }

    #[test]
    fn test_identity_tie_goes_to_first() {
        let chunk = merged(
            vec![Version::new("A", "en", Some(5.0)), Version::new("B", "en", Some(5.0))],
            &["A", "B"],
        );
        assert_eq!(version_identity(&chunk), Some(VersionKey::new("A", "en")));

        let chunk = merged(
            vec![Version::new("A", "en", None), Version::new("B", "en", Some(1.0))],
            &["A", "B"],
        );
        assert_eq!(version_identity(&chunk), Some(VersionKey::new("B", "en")));
    }

    #[test]
    fn test_simple_link_fields() {
        let raw = RawLink {
            anchor_ref: "Job 1:1".to_string(),
            source_ref: "Rashi on Job 1:1:1".to_string(),
            source_he_ref: "רש״י".to_string(),
            category: "Commentary".to_string(),
            source_has_en: false,
        };
        let json = serde_json::to_value(SimpleLink::from(&raw)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"sourceHeRef": "רש״י", "sourceRef": "Rashi on Job 1:1:1"})
        );

        let targum = RawLink {
            category: "Targum".to_string(),
            source_has_en: true,
            ..raw
        };
        let json = serde_json::to_value(SimpleLink::from(&targum)).unwrap();
        assert_eq!(json["category"], "Targum");
        assert_eq!(json["sourceHasEn"], true);
    }

    #[tokio::test]
    async fn test_section_data_aligns_and_links() {
        let book = MemoryBook::new(index("Job", None), 2)
            .with_version(
                Version::new("JPS", "en", Some(1.0)),
                TextNode::Branch(vec![branch(&["a", r#"b<i class="footnote">n</i>"#, "c"])]),
            )
            .with_version(
                Version::new("Masoretic", "he", None),
                TextNode::Branch(vec![branch(&["א", "ב"])]),
            )
            .with_link(RawLink {
                anchor_ref: "Job 1:2-3".to_string(),
                source_ref: "Rashi on Job 1:2".to_string(),
                source_he_ref: "רש״י על איוב א ב".to_string(),
                category: "Commentary".to_string(),
                source_has_en: true,
            });
        let library = MemoryLibrary::new().with_book(book);
        let config = ExportConfig::default();
        let exporter = IndexExporter::load(&library, &index("Job", None), &config)
            .await
            .unwrap();

        let section = library.parse_ref("Job 1").await.unwrap();
        let (texts, metadata) = exporter.section_data(&section).await.unwrap();

        let en = &texts[&VersionKey::new("JPS", "en")];
        assert_eq!(en.len(), 3);
        assert_eq!(en.get(2), Some(&leaf("b")));
        assert_eq!(texts[&VersionKey::new("Masoretic", "he")].len(), 2);

        assert_eq!(metadata.links.len(), 3);
        assert!(metadata.links.get(1).is_none());
        assert_eq!(metadata.links.get(3).map(Vec::len), Some(1));
        assert_eq!(metadata.versions.len(), 2);
        assert_eq!(metadata.prev, None);
        assert_eq!(metadata.next, None);
    }

    #[tokio::test]
    async fn test_section_data_segment_bound_with_offset() {
        let book = MemoryBook::new(index("Mishnah", None), 2)
            .with_continuous_numbering()
            .with_version(
                Version::new("Ed", "en", None),
                TextNode::Branch(vec![branch(&["1", "2", "3"]), branch(&["4", "5"])]),
            );
        let library = MemoryLibrary::new().with_book(book);
        let exporter = IndexExporter::load(&library, &index("Mishnah", None), &ExportConfig::default())
            .await
            .unwrap();

        let section = library.parse_ref("Mishnah 2").await.unwrap();
        let (texts, metadata) = exporter.section_data(&section).await.unwrap();
        let seq = &texts[&VersionKey::new("Ed", "en")];

        assert_eq!(seq.len(), 5);
        assert_eq!(seq.highest_filled(), 5);
        assert!(seq.get(3).is_none());
        assert_eq!(seq.get(4), Some(&leaf("4")));
        assert_eq!(metadata.prev.as_deref(), Some("Mishnah 1"));
    }

    #[tokio::test]
    async fn test_blank_versions_are_excluded() {
        let book = MemoryBook::new(index("Ruth", Some("Tanakh")), 2)
            .with_version(
                Version::new("Full", "en", None),
                TextNode::Branch(vec![branch(&["x"]), branch(&["y"])]),
            )
            .with_version(
                Version::new("Partial", "en", None),
                TextNode::Branch(vec![branch(&["p"])]),
            );
        let library = MemoryLibrary::new().with_book(book);
        let exporter = IndexExporter::load(&library, &index("Ruth", Some("Tanakh")), &ExportConfig::default())
            .await
            .unwrap();

        let section = library.parse_ref("Ruth 2").await.unwrap();
        let (texts, metadata) = exporter.section_data(&section).await.unwrap();
        assert_eq!(texts.len(), 1);
        assert!(texts.contains_key(&VersionKey::new("Full", "en")));
        assert_eq!(metadata.versions, vec![VersionKey::new("Full", "en")]);
    }

    #[tokio::test]
    async fn test_whitespace_only_version_is_excluded() {
        let book = MemoryBook::new(index("Ruth", Some("Tanakh")), 2)
            .with_version(
                Version::new("Full", "en", None),
                TextNode::Branch(vec![branch(&["x"]), branch(&["y", "z"])]),
            )
            .with_version(
                Version::new("Partial", "en", None),
                TextNode::Branch(vec![branch(&["p"]), branch(&["", "  "])]),
            );
        let library = MemoryLibrary::new().with_book(book);
        let exporter = IndexExporter::load(&library, &index("Ruth", Some("Tanakh")), &ExportConfig::default())
            .await
            .unwrap();

        let section = library.parse_ref("Ruth 2").await.unwrap();
        let (texts, metadata) = exporter.section_data(&section).await.unwrap();
        assert_eq!(texts.keys().cloned().collect::<Vec<_>>(), vec![VersionKey::new("Full", "en")]);
        assert_eq!(metadata.versions, vec![VersionKey::new("Full", "en")]);

        let section = library.parse_ref("Ruth 1").await.unwrap();
        let (texts, _) = exporter.section_data(&section).await.unwrap();
        assert_eq!(texts.len(), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_section_is_empty() {
        let book = MemoryBook::new(index("Ruth", None), 2).with_version(
            Version::new("Full", "en", None),
            TextNode::Branch(vec![branch(&["x"])]),
        );
        let library = MemoryLibrary::new().with_book(book);
        let exporter = IndexExporter::load(&library, &index("Ruth", None), &ExportConfig::default())
            .await
            .unwrap();

        let section = library.parse_ref("Ruth 4").await.unwrap();
        let (texts, metadata) = exporter.section_data(&section).await.unwrap();
        assert!(texts.is_empty());
        assert!(metadata.links.is_empty());
    }
}
