//! Writing of per-book JSON documents.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use folio_common::{Error, ExportConfig, Result, SparseSeq, VersionKey};
use folio_library::{Index, Ref, TextLibrary, TextNode};

use crate::merge::{IndexExporter, SectionMetadata, SectionTexts};

/// Version fields that belong on a version record, never on the index.
const VERSION_KEYS: [&str; 6] = [
    "versionTitle",
    "versionNotes",
    "license",
    "versionSource",
    "versionTitleInHebrew",
    "versionNotesInHebrew",
];

/// Serialize `doc` to `path`, creating parent directories.
///
/// Output is UTF-8, indented by four spaces unless `minify` is set.
pub async fn write_doc<T: Serialize + ?Sized>(doc: &T, path: &Path, minify: bool) -> Result<()> {
    let bytes = folio_common::json::encode(doc, minify)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::from(e).classify())?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| Error::from(e).classify())?;
    Ok(())
}

/// First 8 hex digits of the MD5 of a version title.
pub fn version_hash(version_title: &str) -> String {
    let digest = format!("{:x}", md5::compute(version_title.as_bytes()));
    digest[..8].to_string()
}

fn text_path(dir: &Path, tref: &str, key: &VersionKey) -> PathBuf {
    dir.join(format!("{}.{}.{}.json", tref, version_hash(&key.title), key.language))
}

fn metadata_path(dir: &Path, tref: &str) -> PathBuf {
    dir.join(format!("{}.metadata.json", tref))
}

fn index_path(dir: &Path, title: &str) -> PathBuf {
    dir.join(format!("{}_index.json", title))
}

/// Sections of a top-level ref deeper than section level.
#[derive(Debug, Serialize)]
struct NestedDoc<T> {
    #[serde(rename = "ref")]
    tref: String,
    sections: BTreeMap<String, T>,
}

impl<T> NestedDoc<T> {
    fn new(tref: &str) -> Self {
        Self {
            tref: tref.to_string(),
            sections: BTreeMap::new(),
        }
    }
}

struct NestedBook {
    texts: BTreeMap<VersionKey, NestedDoc<SparseSeq<TextNode>>>,
    metadata: NestedDoc<SectionMetadata>,
}

impl NestedBook {
    fn new(top: &Ref) -> Self {
        Self {
            texts: BTreeMap::new(),
            metadata: NestedDoc::new(&top.normal),
        }
    }

    fn add(&mut self, section: &Ref, data: (SectionTexts, SectionMetadata)) {
        let (texts, metadata) = data;
        let top = self.metadata.tref.clone();
        self.metadata.sections.insert(section.normal.clone(), metadata);
        for (key, seq) in texts {
            self.texts
                .entry(key)
                .or_insert_with(|| NestedDoc::new(&top))
                .sections
                .insert(section.normal.clone(), seq);
        }
    }
}

/// Write the text and metadata documents of every top-level section of `index`.
///
/// Section-level refs produce one document per version; deeper structures
/// produce nested `{"ref", "sections"}` documents covering their sections.
/// Returns every file written, in write order. On failure the documents
/// already written are removed again.
pub async fn export_text_json<L>(
    library: &L,
    index: &Index,
    config: &ExportConfig,
) -> Result<Vec<PathBuf>>
where
    L: TextLibrary + ?Sized,
{
    let mut written = Vec::new();
    match write_text_docs(library, index, config, &mut written).await {
        Ok(()) => {
            debug!("Wrote {} documents for {}", written.len(), index.title);
            Ok(written)
        }
        Err(e) => {
            remove_files(&written).await;
            Err(e)
        }
    }
}

/// Best-effort removal of exported documents.
pub async fn remove_files(files: &[PathBuf]) {
    for file in files {
        match tokio::fs::remove_file(file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", file.display(), e),
        }
    }
}

async fn write_text_docs<L>(
    library: &L,
    index: &Index,
    config: &ExportConfig,
    written: &mut Vec<PathBuf>,
) -> Result<()>
where
    L: TextLibrary + ?Sized,
{
    let dir = config.export_dir();
    let exporter = IndexExporter::load(library, index, config).await?;

    for top in library.top_section_refs(&index.title).await? {
        if top.is_section_level() {
            let (texts, metadata) = exporter.section_data(&top).await?;
            for (key, seq) in &texts {
                let path = text_path(&dir, &top.normal, key);
                write_doc(seq, &path, config.minify_json).await?;
                written.push(path);
            }
            let path = metadata_path(&dir, &top.normal);
            write_doc(&metadata, &path, config.minify_json).await?;
            written.push(path);
            continue;
        }

        let mut nested = NestedBook::new(&top);
        for section in library.subrefs(&top).await? {
            if section.is_section_level() {
                let data = exporter.section_data(&section).await?;
                nested.add(&section, data);
            } else {
                for real in library.subrefs(&section).await? {
                    let data = exporter.section_data(&real).await?;
                    nested.add(&real, data);
                }
            }
        }

        for (key, doc) in &nested.texts {
            let path = text_path(&dir, &top.normal, key);
            write_doc(doc, &path, config.minify_json).await?;
            written.push(path);
        }
        let path = metadata_path(&dir, &top.normal);
        write_doc(&nested.metadata, &path, config.minify_json).await?;
        written.push(path);
    }
    Ok(())
}

/// Remove version-level fields from a serialized index and attach its
/// version list with empty-string values dropped.
pub fn annotate_versions(index_doc: &mut Map<String, Value>, versions: Vec<Map<String, Value>>) {
    for key in VERSION_KEYS {
        index_doc.remove(key);
        let mut chars = key.chars();
        if let Some(first) = chars.next() {
            let he_key = format!("he{}{}", first.to_uppercase(), chars.as_str());
            index_doc.remove(&he_key);
        }
    }

    let versions = versions
        .into_iter()
        .map(|mut version| {
            version.retain(|_, v| !matches!(v, Value::String(s) if s.is_empty()));
            Value::Object(version)
        })
        .collect();
    index_doc.insert("versions".to_string(), Value::Array(versions));
}

/// Write `{title}_index.json` for `index`.
pub async fn export_index<L>(library: &L, index: &Index, config: &ExportConfig) -> Result<PathBuf>
where
    L: TextLibrary + ?Sized,
{
    let mut doc = library.serialized_index(&index.title).await?;
    let versions = library.version_list(&index.title).await?;
    annotate_versions(&mut doc, versions);

    let path = index_path(&config.export_dir(), &index.title);
    write_doc(&doc, &path, config.minify_json).await?;
    info!("Exported index for {}", index.title);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_library::{MemoryBook, MemoryLibrary, Version};
    use serde_json::json;

    fn leaf(s: &str) -> TextNode {
        TextNode::Leaf(s.to_string())
    }

    fn index(title: &str) -> Index {
        Index {
            title: title.to_string(),
            he_title: "ספר".to_string(),
            categories: vec!["Tanakh".to_string()],
            primary_corpus: None,
        }
    }

    #[test]
    fn test_version_hash() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(version_hash(""), "d41d8cd9");
        assert_eq!(version_hash("JPS").len(), 8);
    }

    #[test]
    fn test_annotate_versions() {
        let mut doc = json!({
            "title": "Job",
            "versionTitle": "x",
            "heVersionTitle": "y",
            "license": "CC",
            "heLicense": "CC",
            "versionNotesInHebrew": "z"
        })
        .as_object()
        .unwrap()
        .clone();
        let versions = vec![json!({"versionTitle": "JPS", "versionNotes": "", "language": "en"})
            .as_object()
            .unwrap()
            .clone()];

        annotate_versions(&mut doc, versions);
        assert_eq!(
            Value::Object(doc),
            json!({"title": "Job", "versions": [{"versionTitle": "JPS", "language": "en"}]})
        );
    }

    #[tokio::test]
    async fn test_write_doc_pretty_and_minified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/doc.json");

        write_doc(&json!({"a": [1]}), &path, false).await.unwrap();
        let pretty = std::fs::read_to_string(&path).unwrap();
        assert!(pretty.contains("\n    \"a\""));

        write_doc(&json!({"a": "שלום"}), &path, true).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"{"a":"שלום"}"#);
    }

    #[tokio::test]
    async fn test_export_depth_two_book() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::with_root(dir.path());
        let library = MemoryLibrary::new().with_book(
            MemoryBook::new(index("Ruth"), 2).with_version(
                Version::new("JPS", "en", None),
                TextNode::Branch(vec![
                    TextNode::Branch(vec![leaf("a")]),
                    TextNode::Branch(vec![leaf("b")]),
                ]),
            ),
        );

        let written = export_text_json(&library, &index("Ruth"), &config).await.unwrap();
        assert_eq!(written.len(), 4);

        let hash = version_hash("JPS");
        let text: Value = serde_json::from_str(
            &std::fs::read_to_string(config.export_dir().join(format!("Ruth 2.{}.en.json", hash)))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(text, json!(["b"]));

        let metadata: Value = serde_json::from_str(
            &std::fs::read_to_string(config.export_dir().join("Ruth 1.metadata.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata["next"], "Ruth 2");
        assert_eq!(metadata["versions"], json!([{"versionTitle": "JPS", "language": "en"}]));
    }

    #[tokio::test]
    async fn test_failed_export_removes_written_documents() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::with_root(dir.path());
        let library = MemoryLibrary::new().with_book(
            MemoryBook::new(index("Ruth"), 2).with_version(
                Version::new("JPS", "en", None),
                TextNode::Branch(vec![
                    TextNode::Branch(vec![leaf("a")]),
                    TextNode::Branch(vec![leaf("b")]),
                ]),
            ),
        );
        // A directory in the way of the second section's metadata.
        std::fs::create_dir_all(config.export_dir().join("Ruth 2.metadata.json")).unwrap();

        assert!(export_text_json(&library, &index("Ruth"), &config).await.is_err());

        let hash = version_hash("JPS");
        let export = config.export_dir();
        assert!(!export.join(format!("Ruth 1.{}.en.json", hash)).exists());
        assert!(!export.join("Ruth 1.metadata.json").exists());
        assert!(!export.join(format!("Ruth 2.{}.en.json", hash)).exists());
    }

    #[tokio::test]
    async fn test_export_depth_three_book_is_nested() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::with_root(dir.path());
        let library = MemoryLibrary::new().with_book(
            MemoryBook::new(index("Zohar"), 3).with_version(
                Version::new("Ed", "he", None),
                TextNode::Branch(vec![TextNode::Branch(vec![
                    TextNode::Branch(vec![leaf("x"), leaf("y")]),
                    TextNode::Branch(vec![leaf("z")]),
                ])]),
            ),
        );

        let written = export_text_json(&library, &index("Zohar"), &config).await.unwrap();
        assert_eq!(written.len(), 2);

        let doc: Value = serde_json::from_str(
            &std::fs::read_to_string(&written[0]).unwrap(),
        )
        .unwrap();
        assert_eq!(doc["ref"], "Zohar 1");
        assert_eq!(doc["sections"]["Zohar 1:1"], json!(["x", "y"]));
        assert_eq!(doc["sections"]["Zohar 1:2"], json!(["z"]));

        let metadata: Value =
            serde_json::from_str(&std::fs::read_to_string(&written[1]).unwrap()).unwrap();
        assert_eq!(metadata["sections"]["Zohar 1:2"]["prev"], "Zohar 1:1");
    }

    #[tokio::test]
    async fn test_export_index_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::with_root(dir.path());
        let library = MemoryLibrary::new().with_book(
            MemoryBook::new(index("Ruth"), 2)
                .with_version(Version::new("JPS", "en", None), TextNode::empty()),
        );

        let path = export_index(&library, &index("Ruth"), &config).await.unwrap();
        assert!(path.ends_with("Ruth_index.json"));
        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["versions"][0]["versionTitle"], "JPS");
        assert_eq!(doc["title"], "Ruth");
    }
}
