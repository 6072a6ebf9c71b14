use std::borrow::Cow;
use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use serde::Deserialize;
use thiserror::Error;

/// SEC-003: Maximum element nesting depth.
/// Prevents stack exhaustion when walking maliciously nested documents.
const MAX_DEPTH: usize = 256;

/// How raw feed bytes are turned into text before XML parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputEncoding {
    /// Every byte is taken as the ISO-8859-1 code point of the same value,
    /// regardless of what the XML declaration says. UTF-8 input therefore
    /// turns into mojibake, which normalization later strips as high-bit text.
    #[default]
    Latin1,
    /// Bytes are decoded as UTF-8; invalid sequences become U+FFFD.
    Utf8,
}

impl InputEncoding {
    pub fn decode<'a>(self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            InputEncoding::Latin1 => match std::str::from_utf8(bytes) {
                // ASCII reads the same under both encodings
                Ok(text) if text.is_ascii() => Cow::Borrowed(text),
                _ => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
            },
            InputEncoding::Utf8 => String::from_utf8_lossy(bytes),
        }
    }
}

/// Feed bytes could not be turned into a usable document.
///
/// Carries every diagnostic collected during the parse call, in the order
/// they were found.
#[derive(Debug, Clone, Error)]
pub struct ParseError {
    pub diagnostics: Vec<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.diagnostics.is_empty() {
            return f.write_str("unusable document");
        }
        f.write_str(&self.diagnostics.join("; "))
    }
}

/// A node of the parsed document tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    local_name: String,
    namespace: Option<String>,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    /// Qualified tag name as written, e.g. `content:encoded`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag name without its prefix, e.g. `encoded`.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Resolved namespace URI, if the element is bound to one.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Attribute value by qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Direct text and CDATA content, concatenated. Text inside child
    /// elements is not included.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// First child with the given qualified name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given qualified name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First child bound to `namespace` with the given local name.
    pub fn child_ns(&self, namespace: &str, local_name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|c| c.local_name == local_name && c.namespace.as_deref() == Some(namespace))
    }
}

/// A parsed feed together with the bytes it was built from.
#[derive(Debug, Clone)]
pub struct FeedDocument {
    root: Element,
    raw: Vec<u8>,
}

impl FeedDocument {
    /// The document element (`<rss>` for RSS 2.0 feeds).
    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The `version` attribute of the document element.
    pub fn version(&self) -> Option<&str> {
        self.root.attr("version")
    }

    pub fn channel(&self) -> Option<&Element> {
        self.root.child("channel")
    }

    /// `<item>` elements under `<channel>`, in document order. Empty when
    /// either is missing.
    pub fn items(&self) -> impl Iterator<Item = &Element> + '_ {
        self.channel()
            .into_iter()
            .flat_map(|channel| channel.children_named("item"))
    }
}

/// Parses raw feed bytes into a [`FeedDocument`].
///
/// Bytes are first decoded according to `encoding`. Problems found while
/// reading are collected into a list scoped to this call instead of being
/// raised one at a time; if any were found, or no document element exists,
/// the result is a [`ParseError`] carrying all of them.
///
/// A document without `<channel>` or without `<item>` elements is still a
/// valid document.
///
/// # Security
///
/// `quick-xml` (0.37) does not parse `<!ENTITY>` declarations, so custom
/// entities are reported as diagnostics rather than expanded.
pub fn parse(bytes: &[u8], encoding: InputEncoding) -> Result<FeedDocument, ParseError> {
    let text = encoding.decode(bytes);
    let root = build_tree(&text)?;

    Ok(FeedDocument {
        root,
        raw: bytes.to_vec(),
    })
}

fn build_tree(text: &str) -> Result<Element, ParseError> {
    let mut reader = NsReader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut diagnostics = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position();
        let (namespace, event) = match reader.read_resolved_event() {
            Ok((ns, event)) => (owned_namespace(ns), event),
            Err(e) => {
                diagnostics.push(format!("at byte {position}: {e}"));
                break;
            }
        };

        match event {
            Event::Start(e) => {
                if stack.len() >= MAX_DEPTH {
                    diagnostics.push(format!(
                        "at byte {position}: nesting exceeds {MAX_DEPTH} levels"
                    ));
                    break;
                }
                if stack.is_empty() && root.is_some() {
                    diagnostics.push(format!(
                        "at byte {position}: extra content after document element"
                    ));
                    break;
                }
                stack.push(start_element(&e, namespace, &reader, &mut diagnostics));
            }
            Event::Empty(e) => {
                let element = start_element(&e, namespace, &reader, &mut diagnostics);
                if !attach(element, &mut stack, &mut root) {
                    diagnostics.push(format!(
                        "at byte {position}: extra content after document element"
                    ));
                    break;
                }
            }
            Event::End(_) => match stack.pop() {
                Some(element) => {
                    attach(element, &mut stack, &mut root);
                }
                None => {
                    diagnostics.push(format!("at byte {position}: unexpected closing tag"));
                    break;
                }
            },
            Event::Text(e) => match e.unescape() {
                Ok(content) => match stack.last_mut() {
                    Some(parent) => parent.text.push_str(&content),
                    None if content.trim().is_empty() => {}
                    None => diagnostics.push(format!(
                        "at byte {position}: text outside the document element"
                    )),
                },
                Err(e) => diagnostics.push(format!("at byte {position}: {e}")),
            },
            Event::CData(e) => {
                if let Some(parent) = stack.last_mut() {
                    parent.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    for open in stack.iter().rev() {
        diagnostics.push(format!("unclosed element <{}>", open.name));
    }

    match root {
        Some(root) if diagnostics.is_empty() => Ok(root),
        Some(_) => Err(ParseError { diagnostics }),
        None => {
            if diagnostics.is_empty() {
                diagnostics.push("document is empty".to_string());
            }
            Err(ParseError { diagnostics })
        }
    }
}

/// Attaches a finished element to its parent, or makes it the root.
///
/// Returns false if the element would be a second document element.
fn attach(element: Element, stack: &mut [Element], root: &mut Option<Element>) -> bool {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            true
        }
        None if root.is_none() => {
            *root = Some(element);
            true
        }
        None => false,
    }
}

fn start_element(
    e: &BytesStart<'_>,
    namespace: Option<String>,
    reader: &NsReader<&[u8]>,
    diagnostics: &mut Vec<String>,
) -> Element {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let local_name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

    let mut attributes = Vec::new();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                diagnostics.push(format!("malformed attribute on <{name}>: {err}"));
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(value) => attributes.push((key, value.into_owned())),
            Err(err) => diagnostics.push(format!("attribute {key} on <{name}>: {err}")),
        }
    }

    Element {
        name,
        local_name,
        namespace,
        attributes,
        children: Vec::new(),
        text: String::new(),
    }
}

fn owned_namespace(ns: ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        ResolveResult::Unbound | ResolveResult::Unknown(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel>
    <title>Example</title>
    <item><guid>1</guid><title>First</title></item>
    <item><guid>2</guid><title>Second</title><content:encoded><![CDATA[<p>Body</p>]]></content:encoded></item>
</channel>
</rss>"#;

    fn parse_str(s: &str) -> Result<FeedDocument, ParseError> {
        parse(s.as_bytes(), InputEncoding::Latin1)
    }

    #[test]
    fn test_parse_valid_rss() {
        let doc = parse_str(VALID_RSS).unwrap();
        assert_eq!(doc.root().name(), "rss");
        assert_eq!(doc.version(), Some("2.0"));
        assert_eq!(doc.channel().and_then(|c| c.child("title")).map(Element::text), Some("Example"));
        assert_eq!(doc.items().count(), 2);
        assert_eq!(doc.raw(), VALID_RSS.as_bytes());
    }

    #[test]
    fn test_namespaced_child_resolved() {
        let doc = parse_str(VALID_RSS).unwrap();
        let second = doc.items().nth(1).unwrap();
        let encoded = second
            .child_ns("http://purl.org/rss/1.0/modules/content/", "encoded")
            .unwrap();
        assert_eq!(encoded.name(), "content:encoded");
        assert_eq!(encoded.local_name(), "encoded");
        assert_eq!(encoded.text(), "<p>Body</p>");
    }

    #[test]
    fn test_entities_unescaped() {
        let doc = parse_str(
            r#"<rss><channel><item><title>Fish &amp; Chips &lt;3</title></item></channel></rss>"#,
        )
        .unwrap();
        let item = doc.items().next().unwrap();
        assert_eq!(item.child("title").unwrap().text(), "Fish & Chips <3");
    }

    #[test]
    fn test_missing_channel_yields_no_items() {
        let doc = parse_str(r#"<rss version="2.0"></rss>"#).unwrap();
        assert!(doc.channel().is_none());
        assert_eq!(doc.items().count(), 0);
    }

    #[test]
    fn test_missing_version_is_none() {
        let doc = parse_str("<rss><channel/></rss>").unwrap();
        assert_eq!(doc.version(), None);
        assert_eq!(doc.items().count(), 0);
    }

    #[test]
    fn test_truncated_document_is_malformed() {
        let err = parse_str(r#"<rss version="2.0"><channel><item><title>Hel"#).unwrap_err();
        assert!(!err.diagnostics.is_empty());
        assert!(
            err.diagnostics.iter().any(|d| d.contains("unclosed")),
            "diagnostics: {:?}",
            err.diagnostics
        );
    }

    #[test]
    fn test_mismatched_tags_are_malformed() {
        let err = parse_str("<rss><channel></item></rss>").unwrap_err();
        assert!(!err.diagnostics.is_empty());
    }

    #[test]
    fn test_empty_input_is_malformed() {
        let err = parse_str("").unwrap_err();
        assert_eq!(err.diagnostics, vec!["document is empty".to_string()]);
    }

    #[test]
    fn test_unknown_entity_is_malformed() {
        let err = parse_str("<rss><channel><title>a&nbsp;b</title></channel></rss>").unwrap_err();
        assert!(!err.diagnostics.is_empty());
    }

    #[test]
    fn test_two_document_elements_are_malformed() {
        let err = parse_str("<rss/><rss/>").unwrap_err();
        assert!(err.diagnostics[0].contains("extra content"));
    }

    #[test]
    fn test_latin1_bytes_become_code_points() {
        let bytes = b"<rss><channel><title>caf\xe9</title></channel></rss>";
        let doc = parse(bytes, InputEncoding::Latin1).unwrap();
        assert_eq!(doc.channel().unwrap().child("title").unwrap().text(), "caf\u{e9}");
    }

    #[test]
    fn test_utf8_decoding_mode() {
        let doc = parse(
            "<rss><channel><title>caf\u{e9}</title></channel></rss>".as_bytes(),
            InputEncoding::Utf8,
        )
        .unwrap();
        assert_eq!(doc.channel().unwrap().child("title").unwrap().text(), "caf\u{e9}");
    }

    #[test]
    fn test_excessive_nesting_rejected() {
        let depth = MAX_DEPTH + 1;
        let doc = format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));
        let err = parse_str(&doc).unwrap_err();
        assert!(err.diagnostics.iter().any(|d| d.contains("nesting")));
    }

    #[test]
    fn test_parse_error_display_joins_diagnostics() {
        let err = ParseError {
            diagnostics: vec!["one".into(), "two".into()],
        };
        assert_eq!(err.to_string(), "one; two");
    }
}
