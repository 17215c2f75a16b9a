//! Table-of-contents tree.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

use folio_common::{Error, Result};

/// A node of the table of contents.
///
/// Fields the exporter does not interpret are kept in `extra` so the tree
/// serializes back without loss.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TocNode {
    Category {
        category: String,
        #[serde(rename = "heCategory", skip_serializing_if = "Option::is_none")]
        he_category: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
        contents: Vec<TocNode>,
    },
    Text {
        title: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl TocNode {
    /// Build a cleaned tree from the library's raw nodes.
    ///
    /// Group and collection nodes are dropped, as is anything that is
    /// neither a category nor a text.
    pub fn clean(raw: &[Value]) -> Vec<TocNode> {
        raw.iter().filter_map(Self::from_value).collect()
    }

    fn from_value(value: &Value) -> Option<TocNode> {
        let Some(object) = value.as_object() else {
            debug!("Dropping non-object TOC node {}", value);
            return None;
        };

        if let Some(contents) = object.get("contents") {
            let category = object.get("category").and_then(Value::as_str)?.to_string();
            let he_category = object
                .get("heCategory")
                .and_then(Value::as_str)
                .map(str::to_string);
            let extra = without_keys(object, &["category", "heCategory", "contents"]);
            let children = contents.as_array().map(|c| Self::clean(c)).unwrap_or_default();
            return Some(TocNode::Category {
                category,
                he_category,
                extra,
                contents: children,
            });
        }

        let is_collection = object
            .get("isCollection")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if object.contains_key("isGroup") || is_collection {
            return None;
        }

        if let Some(title) = object.get("title").and_then(Value::as_str) {
            return Some(TocNode::Text {
                title: title.to_string(),
                extra: without_keys(object, &["title"]),
            });
        }

        debug!("Dropping unrecognized TOC node {}", value);
        None
    }

    /// Every text title in the tree.
    pub fn leaf_titles(nodes: &[TocNode]) -> BTreeSet<String> {
        let mut titles = BTreeSet::new();
        collect_titles(nodes, &mut titles);
        titles
    }

    /// Titles under a category path, walked depth-first.
    ///
    /// An empty path selects every text in `nodes`.
    ///
    /// # Errors
    /// - [`Error::Category`] if a path segment matches nothing
    pub fn titles_in_category(nodes: &[TocNode], path: &[&str]) -> Result<Vec<String>> {
        let mut titles = Vec::new();
        let mut found = false;

        for node in nodes {
            match node {
                TocNode::Category {
                    category, contents, ..
                } if path.is_empty() || category == path[0] => {
                    found = true;
                    if contents.is_empty() {
                        continue;
                    }
                    let rest = if path.is_empty() { path } else { &path[1..] };
                    titles.extend(Self::titles_in_category(contents, rest)?);
                }
                TocNode::Text { title, .. } if path.is_empty() => {
                    found = true;
                    titles.push(title.clone());
                }
                _ => {}
            }
        }

        if !found {
            return Err(Error::Category(path.join("/")));
        }
        Ok(titles)
    }
}

fn collect_titles(nodes: &[TocNode], titles: &mut BTreeSet<String>) {
    for node in nodes {
        match node {
            TocNode::Category { contents, .. } => collect_titles(contents, titles),
            TocNode::Text { title, .. } => {
                titles.insert(title.clone());
            }
        }
    }
}

fn without_keys(object: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    object
        .iter()
        .filter(|(k, _)| !keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<TocNode> {
        TocNode::clean(
            json!([
                {"category": "Tanakh", "heCategory": "תנ״ך", "contents": [
                    {"category": "Torah", "heCategory": "תורה", "contents": [
                        {"title": "Genesis", "order": 1},
                        {"title": "Exodus", "order": 2}
                    ]},
                    {"category": "Rishonim on Tanakh", "contents": [
                        {"category": "Rashi", "contents": [{"title": "Rashi on Genesis"}]}
                    ]},
                    {"category": "Empty", "contents": []}
                ]},
                {"category": "Talmud", "contents": [
                    {"isGroup": true, "title": "Some group"},
                    {"isCollection": true, "title": "A sheet collection"},
                    {"title": "Berakhot"}
                ]},
                {"nothing": "here"}
            ])
            .as_array()
            .unwrap(),
        )
    }

    #[test]
    fn test_clean_drops_groups_and_junk() {
        let toc = sample();
        assert_eq!(toc.len(), 2);
        match &toc[1] {
            TocNode::Category { contents, .. } => assert_eq!(contents.len(), 1),
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_clean_preserves_extra_fields() {
        let toc = sample();
        let json = serde_json::to_value(&toc[0]).unwrap();
        assert_eq!(json["heCategory"], json!("תנ״ך"));
        assert_eq!(json["contents"][0]["contents"][0], json!({"title": "Genesis", "order": 1}));
    }

    #[test]
    fn test_leaf_titles() {
        let titles = TocNode::leaf_titles(&sample());
        let expected: BTreeSet<String> = ["Genesis", "Exodus", "Rashi on Genesis", "Berakhot"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(titles, expected);
    }

    #[test]
    fn test_titles_in_category_path() {
        let toc = sample();
        let torah = TocNode::titles_in_category(&toc, &["Tanakh", "Torah"]).unwrap();
        assert_eq!(torah, vec!["Genesis", "Exodus"]);

        let rashi =
            TocNode::titles_in_category(&toc, &["Tanakh", "Rishonim on Tanakh", "Rashi"]).unwrap();
        assert_eq!(rashi, vec!["Rashi on Genesis"]);

        let tanakh = TocNode::titles_in_category(&toc, &["Tanakh"]).unwrap();
        assert_eq!(tanakh, vec!["Genesis", "Exodus", "Rashi on Genesis"]);
    }

    #[test]
    fn test_titles_in_category_whole_tree() {
        let all = TocNode::titles_in_category(&sample(), &[]).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_titles_in_missing_category() {
        let err = TocNode::titles_in_category(&sample(), &["Tanakh", "Apocrypha"]).unwrap_err();
        assert!(matches!(err, Error::Category(_)));
    }
}
