//! Content-type driven response body parsing.
//!
//! Converts raw response bytes into a content-agnostic node tree
//! (`serde_json::Value`: scalar | array | string-keyed map). JSON bodies
//! decode directly; XML bodies fold into the same tree so the mapper never
//! cares which format the server spoke. Pure functions, no side effects.
//!
//! An empty (or all-whitespace) body is a distinguished valid result — the
//! empty map — since some successful requests legitimately return no
//! payload.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

/// Parsing failure. `Malformed` carries the byte offset of the first
/// invalid token.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported content type: {0}")]
    UnsupportedFormat(String),

    #[error("malformed body at byte {offset}: {detail}")]
    Malformed { offset: usize, detail: String },
}

/// Parse a response body into a node tree, dispatching on content type.
///
/// The content type is matched after stripping parameters (`; charset=...`)
/// and lowercasing. `application/json`, `text/json` and any `+json` suffix
/// go through the JSON decoder; `application/xml`, `text/xml` and `+xml`
/// through the XML decoder. Anything else is `UnsupportedFormat`.
pub fn parse(bytes: &[u8], content_type: Option<&str>) -> Result<Value, ParseError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Value::Object(Map::new()));
    }

    let normalized = normalize_content_type(content_type.unwrap_or(""));
    if is_json(&normalized) {
        parse_json(bytes)
    } else if is_xml(&normalized) {
        parse_xml(bytes)
    } else {
        Err(ParseError::UnsupportedFormat(normalized))
    }
}

/// Strip parameters and lowercase: `Application/JSON; charset=utf-8` →
/// `application/json`.
fn normalize_content_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

fn is_json(mime: &str) -> bool {
    mime == "application/json" || mime == "text/json" || mime.ends_with("+json")
}

fn is_xml(mime: &str) -> bool {
    mime == "application/xml" || mime == "text/xml" || mime.ends_with("+xml")
}

fn parse_json(bytes: &[u8]) -> Result<Value, ParseError> {
    serde_json::from_slice(bytes).map_err(|e| ParseError::Malformed {
        offset: byte_offset(bytes, e.line(), e.column()),
        detail: e.to_string(),
    })
}

/// Translate serde_json's 1-based line/column into a byte offset. The
/// column counts characters, not bytes, so the error line is walked
/// char-by-char to account for multi-byte characters before the token.
fn byte_offset(bytes: &[u8], line: usize, column: usize) -> usize {
    let mut current_line = 1usize;
    let mut line_start = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        if current_line == line {
            break;
        }
        if *b == b'\n' {
            current_line += 1;
            line_start = i + 1;
        }
    }
    let within: usize = String::from_utf8_lossy(&bytes[line_start..])
        .chars()
        .take(column.saturating_sub(1))
        .map(char::len_utf8)
        .sum();
    (line_start + within).min(bytes.len())
}

/// One element being assembled during the XML fold.
struct XmlFrame {
    name: String,
    children: Map<String, Value>,
    text: String,
}

/// Fold an XML document into the node tree.
///
/// Elements become maps, repeated sibling elements collapse into arrays,
/// attributes are stored under `@name` keys, and pure text content becomes
/// a scalar. The result is a single-entry map keyed by the root element.
fn parse_xml(bytes: &[u8]) -> Result<Value, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let malformed = |reader: &Reader<&[u8]>, detail: String| ParseError::Malformed {
        offset: reader.buffer_position() as usize,
        detail,
    };

    let mut stack: Vec<XmlFrame> = Vec::new();
    let mut root = Map::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let mut frame = XmlFrame {
                    name: String::from_utf8_lossy(e.name().as_ref()).to_string(),
                    children: Map::new(),
                    text: String::new(),
                };
                collect_attributes(&e, &mut frame.children)
                    .map_err(|d| malformed(&reader, d))?;
                stack.push(frame);
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let mut children = Map::new();
                collect_attributes(&e, &mut children).map_err(|d| malformed(&reader, d))?;
                let value = if children.is_empty() {
                    Value::Null
                } else {
                    Value::Object(children)
                };
                let target = match stack.last_mut() {
                    Some(parent) => &mut parent.children,
                    None => &mut root,
                };
                insert_folding(target, name, value);
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| malformed(&reader, e.to_string()))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::End(_)) => {
                let frame = match stack.pop() {
                    Some(f) => f,
                    None => {
                        return Err(malformed(&reader, "unexpected closing tag".to_string()))
                    }
                };
                let value = finish_frame(frame.children, frame.text);
                let target = match stack.last_mut() {
                    Some(parent) => &mut parent.children,
                    None => &mut root,
                };
                insert_folding(target, frame.name, value);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {} // declarations, comments, processing instructions
            Err(e) => return Err(malformed(&reader, e.to_string())),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(ParseError::Malformed {
            offset: bytes.len(),
            detail: format!("unclosed element <{}>", stack.last().map(|f| f.name.as_str()).unwrap_or("")),
        });
    }

    Ok(Value::Object(root))
}

/// Collapse a closed element into a node value.
fn finish_frame(children: Map<String, Value>, text: String) -> Value {
    let trimmed = text.trim();
    if children.is_empty() {
        if trimmed.is_empty() {
            Value::Null
        } else {
            Value::String(trimmed.to_string())
        }
    } else {
        let mut map = children;
        if !trimmed.is_empty() {
            map.insert("#text".to_string(), Value::String(trimmed.to_string()));
        }
        Value::Object(map)
    }
}

/// Insert a child, converting to an array on repeated sibling names.
fn insert_folding(target: &mut Map<String, Value>, name: String, value: Value) {
    match target.remove(&name) {
        None => {
            target.insert(name, value);
        }
        Some(Value::Array(mut items)) => {
            items.push(value);
            target.insert(name, Value::Array(items));
        }
        Some(existing) => {
            target.insert(name, Value::Array(vec![existing, value]));
        }
    }
}

fn collect_attributes(
    e: &quick_xml::events::BytesStart<'_>,
    into: &mut Map<String, Value>,
) -> Result<(), String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
        let value = attr.unescape_value().map_err(|e| e.to_string())?.to_string();
        into.insert(key, Value::String(value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_object() {
        let node = parse(br#"{"id": 7, "name": "espresso"}"#, Some("application/json")).unwrap();
        assert_eq!(node, json!({"id": 7, "name": "espresso"}));
    }

    #[test]
    fn test_json_array() {
        let node = parse(br#"[{"id": 1}, {"id": 2}]"#, Some("application/json")).unwrap();
        assert_eq!(node, json!([{"id": 1}, {"id": 2}]));
    }

    #[test]
    fn test_json_with_charset_parameter() {
        let node = parse(b"{}", Some("Application/JSON; charset=utf-8")).unwrap();
        assert_eq!(node, json!({}));
    }

    #[test]
    fn test_json_suffix_content_type() {
        let node = parse(br#"{"a":1}"#, Some("application/vnd.api+json")).unwrap();
        assert_eq!(node, json!({"a": 1}));
    }

    #[test]
    fn test_empty_body_is_empty_map() {
        assert_eq!(parse(b"", Some("application/json")).unwrap(), json!({}));
        assert_eq!(parse(b"  \n\t", Some("text/xml")).unwrap(), json!({}));
        // Even with an unsupported content type: no payload, nothing to parse
        assert_eq!(parse(b"", Some("image/png")).unwrap(), json!({}));
    }

    #[test]
    fn test_unsupported_content_type() {
        let err = parse(b"<html></html>", Some("text/html")).unwrap_err();
        assert_eq!(err, ParseError::UnsupportedFormat("text/html".to_string()));
    }

    #[test]
    fn test_missing_content_type() {
        let err = parse(b"{}", None).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_malformed_json_reports_offset() {
        // The '!' at byte 8 is the first invalid token
        let body = br#"{"id": 1!}"#;
        let err = parse(body, Some("application/json")).unwrap_err();
        match err {
            ParseError::Malformed { offset, .. } => assert_eq!(offset, 8),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_offset_after_multibyte_char() {
        // "ï" occupies two bytes, so the '!' sits at byte 12 even though
        // serde_json reports it as the twelfth character column.
        let body = r#"{"naïve": 1!}"#.as_bytes();
        let err = parse(body, Some("application/json")).unwrap_err();
        match err {
            ParseError::Malformed { offset, .. } => assert_eq!(offset, 12),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_multiline_offset() {
        let body = b"{\n  \"id\": }";
        let err = parse(body, Some("application/json")).unwrap_err();
        match err {
            // serde_json points at the '}' on line 2
            ParseError::Malformed { offset, .. } => assert_eq!(offset, 10),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_xml_element_tree() {
        let body = br#"<item code="A1"><name>Widget</name><qty>4</qty></item>"#;
        let node = parse(body, Some("application/xml")).unwrap();
        assert_eq!(
            node,
            json!({"item": {"@code": "A1", "name": "Widget", "qty": "4"}})
        );
    }

    #[test]
    fn test_xml_repeated_siblings_fold_to_array() {
        let body = br#"<items><item>a</item><item>b</item><item>c</item></items>"#;
        let node = parse(body, Some("text/xml")).unwrap();
        assert_eq!(node, json!({"items": {"item": ["a", "b", "c"]}}));
    }

    #[test]
    fn test_xml_malformed() {
        let err = parse(b"<a><b></a>", Some("application/xml")).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_xml_unclosed_root() {
        let err = parse(b"<open>", Some("application/xml")).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }
}
