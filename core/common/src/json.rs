//! Encoding of published JSON documents.

use serde::Serialize;

use crate::error::Result;

/// Encode `doc` as UTF-8 JSON, indented by four spaces unless `minify` is set.
pub fn encode<T: Serialize + ?Sized>(doc: &T, minify: bool) -> Result<Vec<u8>> {
    if minify {
        return Ok(serde_json::to_vec(doc)?);
    }
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut ser)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_uses_four_spaces() {
        let bytes = encode(&serde_json::json!({"a": 1}), false).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\n    \"a\": 1\n}");
    }

    #[test]
    fn test_minified_keeps_unicode() {
        let bytes = encode(&serde_json::json!({"he": "תנ״ך"}), true).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"he":"תנ״ך"}"#);
    }
}
