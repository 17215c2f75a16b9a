//! Removal of inline annotation markup from segment text.

use regex::Regex;
use std::sync::LazyLock;

static FOOTNOTE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<sup\s+class\s*=\s*["']footnote-marker["']\s*>[\s\S]*?</sup>"#)
        .expect("footnote marker pattern")
});

static ITAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<i(?:\s[^>]*)?>|</i>").expect("itag pattern"));

static FOOTNOTE_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"class\s*=\s*["']footnote["']"#).expect("footnote class pattern")
});

fn is_removable(open_tag: &str) -> bool {
    open_tag.contains("data-commentator") || FOOTNOTE_CLASS.is_match(open_tag)
}

/// Strip footnote markers, footnotes and commentator anchors from `text`.
///
/// Footnotes may contain nested `<i>` elements; the removed span always
/// ends at the matching close tag. An unterminated footnote runs to the end
/// of the text.
pub fn strip_itags(text: &str) -> String {
    let text = FOOTNOTE_MARKER.replace_all(text, "");

    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    let mut depth = 0usize;

    for tag in ITAG.find_iter(&text) {
        let opening = !tag.as_str().starts_with("</");
        if depth == 0 {
            if opening && is_removable(tag.as_str()) {
                out.push_str(&text[pos..tag.start()]);
                depth = 1;
            }
            continue;
        }
        if opening {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                pos = tag.end();
            }
        }
    }

    if depth == 0 {
        out.push_str(&text[pos..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(strip_itags("In the beginning <b>God</b>"), "In the beginning <b>God</b>");
    }

    #[test]
    fn test_removes_footnote_with_marker() {
        let text = r#"word<sup class="footnote-marker">*</sup><i class="footnote">a note</i> more"#;
        assert_eq!(strip_itags(text), "word more");
    }

    #[test]
    fn test_removes_nested_footnote() {
        let text = r#"a<i class="footnote">outer <i>inner</i> tail</i>b"#;
        assert_eq!(strip_itags(text), "ab");
    }

    #[test]
    fn test_removes_commentator_anchor() {
        let text = r#"x<i data-commentator="Rashi" data-order="1"></i>y"#;
        assert_eq!(strip_itags(text), "xy");
    }

    #[test]
    fn test_keeps_ordinary_italics() {
        assert_eq!(strip_itags("<i>emphasis</i> here"), "<i>emphasis</i> here");
    }

    #[test]
    fn test_unterminated_footnote_runs_to_end() {
        assert_eq!(strip_itags(r#"keep<i class="footnote">lost"#), "keep");
    }
}
