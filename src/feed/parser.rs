//! Dialect-agnostic feed parsing.
//!
//! Raw bytes are normalized ([`crate::feed::normalize`]) and loaded into a
//! small typed document tree, then walked with explicit element/attribute
//! lookup per dialect. A document with a no-namespace `channel` child under
//! its root is RSS 2.0; everything else is read as Atom, matching children
//! against whatever namespace the root element resolved to (default
//! namespace and `atom:` prefix both end up at the same URI).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use thiserror::Error;

use crate::feed::normalize::normalize_xml;

/// Namespace of the RSS content module carrying `content:encoded`.
const CONTENT_MODULE_NS: &str = "http://purl.org/rss/1.0/modules/content/";

/// Errors produced while turning raw bytes into a [`ParsedFeed`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document was empty after normalization.
    #[error("feed XML is empty")]
    Empty,
    /// The document is not well-formed XML.
    #[error("feed XML could not be parsed: {0}")]
    Malformed(String),
}

/// A feed document reduced to the fields the pipeline stores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub site_url: Option<String>,
    pub description: Option<String>,
    pub items: Vec<ParsedItem>,
}

/// One entry of a feed document, before identity resolution and cleaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedItem {
    pub guid: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Parses a raw feed document into a [`ParsedFeed`].
///
/// # Errors
///
/// Returns [`ParseError::Empty`] when nothing remains after normalization
/// and [`ParseError::Malformed`] when the XML is not well-formed. Recoverable
/// oddities (unparseable dates, missing fields) never fail the parse; the
/// affected field is simply absent.
pub fn parse_feed(raw: &[u8]) -> Result<ParsedFeed, ParseError> {
    let xml = normalize_xml(raw);
    if xml.is_empty() {
        return Err(ParseError::Empty);
    }

    let root = build_tree(&xml)?;

    if let Some(channel) = root.child(None, "channel") {
        Ok(parse_rss(channel))
    } else {
        Ok(parse_atom(&root))
    }
}

// ============================================================================
// Document tree
// ============================================================================

/// One element of the parsed document: local name, resolved namespace URI,
/// attributes (by local name), child elements, and direct text content.
#[derive(Debug, Default)]
struct Element {
    name: String,
    namespace: Option<String>,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn matches(&self, ns: Option<&str>, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == ns
    }

    /// First child with the given namespace and local name.
    fn child(&self, ns: Option<&str>, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.matches(ns, name))
    }

    /// All children with the given namespace and local name, in document order.
    fn children_named<'a>(
        &'a self,
        ns: Option<&'a str>,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.matches(ns, name))
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

fn build_tree(xml: &str) -> Result<Element, ParseError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Index 0 is a virtual document node; the real root ends up as its child.
    let mut stack: Vec<Element> = vec![Element::default()];

    loop {
        match reader.read_resolved_event() {
            Ok((resolved, Event::Start(start))) => {
                stack.push(element_from_start(resolved, &start)?);
            }
            Ok((resolved, Event::Empty(start))) => {
                let element = element_from_start(resolved, &start)?;
                attach(&mut stack, element)?;
            }
            Ok((_, Event::End(_))) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ParseError::Malformed("unbalanced end tag".to_owned()))?;
                attach(&mut stack, element)?;
            }
            Ok((_, Event::Text(text))) => {
                let text = text.unescape().map_err(malformed)?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok((_, Event::CData(cdata))) => {
                let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok((_, Event::Eof)) => break,
            // Declaration, comments, processing instructions, doctype
            Ok(_) => {}
            Err(err) => return Err(malformed(err)),
        }
    }

    if stack.len() != 1 {
        return Err(ParseError::Malformed("unexpected end of document".to_owned()));
    }
    let document = stack.pop().expect("virtual document node");
    document
        .children
        .into_iter()
        .next()
        .ok_or_else(|| ParseError::Malformed("document has no root element".to_owned()))
}

fn element_from_start(resolved: ResolveResult, start: &BytesStart) -> Result<Element, ParseError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let namespace = match resolved {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.into_inner()).into_owned()),
        ResolveResult::Unbound | ResolveResult::Unknown(_) => None,
    };

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(malformed)?.into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        name,
        namespace,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(stack: &mut Vec<Element>, element: Element) -> Result<(), ParseError> {
    stack
        .last_mut()
        .ok_or_else(|| ParseError::Malformed("unbalanced end tag".to_owned()))?
        .children
        .push(element);
    Ok(())
}

fn malformed(err: impl std::fmt::Display) -> ParseError {
    ParseError::Malformed(err.to_string())
}

// ============================================================================
// RSS 2.0
// ============================================================================

fn parse_rss(channel: &Element) -> ParsedFeed {
    let items = channel
        .children_named(None, "item")
        .map(|item| {
            let summary = text_value(item.child(None, "description"));
            let content = text_value(item.child(Some(CONTENT_MODULE_NS), "encoded"));
            let (summary, content) = fill_missing(summary, content);

            ParsedItem {
                guid: text_value(item.child(None, "guid")),
                title: text_value(item.child(None, "title")),
                url: text_value(item.child(None, "link")),
                summary,
                content,
                published_at: text_value(item.child(None, "pubDate"))
                    .as_deref()
                    .and_then(parse_date),
            }
        })
        .collect();

    ParsedFeed {
        title: text_value(channel.child(None, "title")),
        site_url: text_value(channel.child(None, "link")),
        description: text_value(channel.child(None, "description")),
        items,
    }
}

// ============================================================================
// Atom
// ============================================================================

fn parse_atom(feed: &Element) -> ParsedFeed {
    let ns = feed.namespace.as_deref();

    let items = feed
        .children_named(ns, "entry")
        .map(|entry| {
            let summary = text_value(entry.child(ns, "summary"));
            let content = text_value(entry.child(ns, "content"));
            let (summary, content) = fill_missing(summary, content);

            // `published` is consulted only when the `updated` element is
            // missing entirely, not when it is present but blank.
            let raw_date = match entry.child(ns, "updated") {
                Some(updated) => text_value(Some(updated)),
                None => text_value(entry.child(ns, "published")),
            };

            ParsedItem {
                guid: text_value(entry.child(ns, "id")),
                title: text_value(entry.child(ns, "title")),
                url: alternate_link(entry, ns),
                summary,
                content,
                published_at: raw_date.as_deref().and_then(parse_date),
            }
        })
        .collect();

    ParsedFeed {
        title: text_value(feed.child(ns, "title")),
        site_url: alternate_link(feed, ns),
        description: text_value(feed.child(ns, "subtitle")),
        items,
    }
}

/// Selects the `href` of the first `link` child whose `rel` is absent or
/// `"alternate"`. The first qualifying link decides: if it lacks an `href`,
/// the result is absent and later links are not consulted.
fn alternate_link(element: &Element, ns: Option<&str>) -> Option<String> {
    for link in element.children_named(ns, "link") {
        let rel = link.attr("rel");
        if rel.is_none() || rel == Some("alternate") {
            return link
                .attr("href")
                .map(str::trim)
                .filter(|href| !href.is_empty())
                .map(str::to_owned);
        }
    }
    None
}

// ============================================================================
// Field helpers
// ============================================================================

/// Direct text of an element, trimmed; absent element or blank text is `None`.
fn text_value(element: Option<&Element>) -> Option<String> {
    let text = element?.text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

/// Two-way fallback between summary and content: whichever side is absent
/// takes the other's value. Both may remain absent.
fn fill_missing(
    summary: Option<String>,
    content: Option<String>,
) -> (Option<String>, Option<String>) {
    match (summary, content) {
        (Some(summary), None) => {
            let content = summary.clone();
            (Some(summary), Some(content))
        }
        (None, Some(content)) => {
            let summary = content.clone();
            (Some(summary), Some(content))
        }
        pair => pair,
    }
}

/// Permissive date parsing: RFC 2822 (RSS convention), RFC 3339 (Atom
/// convention), then a few naive forms read as UTC. Failure yields `None`.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}
