//! Turns parsed `<item>` elements into uniform [`FeedItem`] records.
//!
//! Every string placed on a record goes through [`normalize_value`], so
//! callers always get tag-free printable ASCII. A missing element and an
//! empty one both normalize to `""`; the records cannot tell them apart.

use std::collections::BTreeMap;

use serde::Serialize;

use super::parser::Element;
use crate::util::{strip_control_chars, strip_high, strip_tags};

/// Namespace of the `content:encoded` extension.
pub const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

/// Item children that map to fixed [`FeedItem`] fields. Other unprefixed
/// children in the item's own namespace land in [`FeedItem::extensions`].
pub const STANDARD_FIELDS: [&str; 10] = [
    "title",
    "link",
    "description",
    "author",
    "category",
    "comments",
    "enclosure",
    "guid",
    "pubDate",
    "source",
];

/// Media attachment of an item.
///
/// All fields are `None` when the item has no `<enclosure>`. When it has
/// one, all three are `Some`, holding an empty string for any attribute the
/// element lacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Enclosure {
    pub url: Option<String>,
    pub length: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl Enclosure {
    fn from_element(element: &Element) -> Self {
        Self {
            url: Some(normalize_attr(element, "url")),
            length: Some(normalize_attr(element, "length")),
            kind: Some(normalize_attr(element, "type")),
        }
    }

    /// True when the item carried an `<enclosure>` element.
    pub fn is_present(&self) -> bool {
        self.url.is_some() || self.length.is_some() || self.kind.is_some()
    }
}

/// One normalized feed entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub comments: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub author: String,
    pub guid: String,
    pub source: String,
    pub description: String,
    pub category: String,
    /// Body from `content:encoded`, if any.
    pub content: String,
    pub enclosure: Enclosure,
    /// Non-standard unprefixed children keyed by tag name. A later child
    /// with the same name replaces an earlier one.
    pub extensions: BTreeMap<String, String>,
}

/// Sanitizes a raw value for display.
///
/// Strips markup tags, then every character above U+007F, then control
/// characters and ANSI escapes (tab, newline and carriage return survive).
///
/// # Examples
///
/// ```
/// use feedr::feed::normalize_value;
///
/// assert_eq!(normalize_value("<b>Caf\u{e9}</b>\x07"), "Caf");
/// ```
pub fn normalize_value(raw: &str) -> String {
    let untagged = strip_tags(raw);
    let low = strip_high(&untagged);
    strip_control_chars(&low).into_owned()
}

/// Normalizes an element's text; a missing element yields `""`.
pub fn normalize_node(node: Option<&Element>) -> String {
    node.map(|n| normalize_value(n.text())).unwrap_or_default()
}

fn normalize_attr(element: &Element, name: &str) -> String {
    element.attr(name).map(normalize_value).unwrap_or_default()
}

/// Prefixed children (`dc:creator`, `content:encoded`) and children bound
/// to another namespace are never extensions.
fn is_extension(item: &Element, child: &Element) -> bool {
    !child.name().contains(':')
        && child.namespace() == item.namespace()
        && !STANDARD_FIELDS.contains(&child.name())
}

/// Builds a [`FeedItem`] from an `<item>` element.
pub fn normalize_item(item: &Element) -> FeedItem {
    let field = |name: &str| normalize_node(item.child(name));

    let title = field("title");
    let link = field("link");
    let comments = field("comments");
    let pub_date = field("pubDate");
    let author = field("author");
    let guid = field("guid");
    let source = field("source");
    let description = field("description");
    let category = field("category");

    let encoded = item
        .child_ns(CONTENT_NS, "encoded")
        .or_else(|| item.child("content:encoded"));
    let content = normalize_node(encoded);

    let enclosure = item
        .child("enclosure")
        .map(Enclosure::from_element)
        .unwrap_or_default();

    let mut extensions = BTreeMap::new();
    for child in item.children().iter().filter(|c| is_extension(item, c)) {
        extensions.insert(child.name().to_string(), normalize_value(child.text()));
    }

    FeedItem {
        title,
        link,
        comments,
        pub_date,
        author,
        guid,
        source,
        description,
        category,
        content,
        enclosure,
        extensions,
    }
}
