use chrono::{SecondsFormat, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::extract::{self, Tag};

/// Errors that can occur while turning feed text into items.
///
/// Any of these fails the whole feed: there is no partial recovery from a
/// document that is not well-formed.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The XML reader rejected the document.
    #[error("XML parse error: {0}")]
    Xml(String),
    /// The document ended while an element was still open.
    #[error("Unexpected end of document: <{0}> is never closed")]
    UnclosedElement(String),
    /// The document contains no element at all.
    #[error("Document has no root element")]
    NoRootElement,
}

/// One entry extracted from a feed document.
///
/// Transient: items are filtered, rendered and discarded within a single sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Dedup key. Items without a resolvable link are never imported.
    pub link: Option<String>,
    pub title: String,
    pub author: String,
    /// Raw publish-date string as found in the feed, or the parse instant.
    pub pub_date: String,
    /// Raw (unsanitized) content markup; empty when no content field matched.
    pub content: String,
}

/// Feed-level data plus the ordered item candidates.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    /// First `title` element of the document, trimmed.
    pub title: Option<String>,
    /// First `lastBuildDate` or `updated` element of the document.
    pub last_build_date: Option<String>,
    pub items: Vec<FeedItem>,
}

/// Parses RSS or Atom text into a [`ParsedFeed`].
///
/// RSS `item` and Atom `entry` elements are both item boundaries, at any
/// depth. Field extraction follows the strategy lists in
/// [`extract`](super::extract); see [`FeedItem`] for the defaults applied
/// when a field is missing.
///
/// # Errors
///
/// Returns [`ParseError`] if the document is not well-formed XML.
pub fn parse_feed(text: &str) -> Result<ParsedFeed, ParseError> {
    let root = parse_document(text)?;
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    let title = root
        .find_first(&|el| Tag::Plain("title").matches(el))
        .map(|el| el.text_content().trim().to_string());
    let last_build_date = root
        .find_first(&|el| {
            Tag::Plain("lastBuildDate").matches(el) || Tag::Plain("updated").matches(el)
        })
        .map(|el| el.text_content().trim().to_string())
        .filter(|s| !s.is_empty());

    let mut entries = Vec::new();
    root.collect_descendants(
        &|el| Tag::Plain("item").matches(el) || Tag::Plain("entry").matches(el),
        &mut entries,
    );

    let items = entries
        .into_iter()
        .map(|entry| FeedItem {
            link: extract::first_match(entry, extract::LINK),
            title: extract::first_match(entry, extract::TITLE)
                .unwrap_or_else(|| "Untitled".to_string()),
            author: extract::first_match(entry, extract::AUTHOR)
                .unwrap_or_else(|| "Unknown".to_string()),
            pub_date: extract::first_match(entry, extract::PUB_DATE)
                .unwrap_or_else(|| now.clone()),
            content: extract::first_match(entry, extract::CONTENT).unwrap_or_default(),
        })
        .collect();

    Ok(ParsedFeed {
        title,
        last_build_date,
        items,
    })
}

// ============================================================================
// Document tree
// ============================================================================

/// A node of the minimal document tree the extractors query.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Element(Element),
    Text(String),
}

/// An element with its qualified name (`prefix:local` kept verbatim).
#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) name: String,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) children: Vec<Node>,
}

impl Element {
    fn from_start(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Self, ParseError> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| ParseError::Xml(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .decode_and_unescape_value(reader.decoder())
                .map_err(|err| ParseError::Xml(err.to_string()))?;
            attrs.push((key, value.into_owned()));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
        })
    }

    pub(crate) fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of all descendant text nodes, in document order.
    pub(crate) fn text_content(&self) -> String {
        let mut out = String::new();
        self.append_text(&mut out);
        out
    }

    fn append_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(el) => el.append_text(out),
            }
        }
    }

    /// Serialized markup of the children (the element's inner XML).
    pub(crate) fn inner_markup(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            write_node(child, &mut out);
        }
        out
    }

    /// First descendant (excluding `self`) matching `pred`, depth-first in
    /// document order.
    pub(crate) fn find_first(&self, pred: &dyn Fn(&Element) -> bool) -> Option<&Element> {
        for child in &self.children {
            if let Node::Element(el) = child {
                if pred(el) {
                    return Some(el);
                }
                if let Some(found) = el.find_first(pred) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Every descendant matching `pred`, in document order.
    pub(crate) fn collect_descendants<'a>(
        &'a self,
        pred: &dyn Fn(&Element) -> bool,
        out: &mut Vec<&'a Element>,
    ) {
        for child in &self.children {
            if let Node::Element(el) = child {
                if pred(el) {
                    out.push(el);
                }
                el.collect_descendants(pred, out);
            }
        }
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&quick_xml::escape::escape(t.as_str())),
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for (k, v) in &el.attrs {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                out.push_str(&quick_xml::escape::escape(v.as_str()));
                out.push('"');
            }
            if el.children.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                for child in &el.children {
                    write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

/// Builds the document tree, rejecting anything that is not well-formed.
///
/// SEC-002: quick-xml (0.37) never expands `<!ENTITY>` declarations; only the
/// five predefined entities and character references are resolved, anything
/// else is an error.
fn parse_document(text: &str) -> Result<Element, ParseError> {
    let mut reader = Reader::from_str(text);
    // Whitespace is kept: item content is markup and its text matters.
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if root.is_some() {
                    return Err(ParseError::Xml(
                        "content after the root element".to_string(),
                    ));
                }
                stack.push(Element::from_start(&e, &reader)?);
            }
            Ok(Event::Empty(e)) => {
                if root.is_some() {
                    return Err(ParseError::Xml(
                        "content after the root element".to_string(),
                    ));
                }
                let el = Element::from_start(&e, &reader)?;
                attach(&mut stack, &mut root, el);
            }
            Ok(Event::End(_)) => {
                let el = stack.pop().ok_or_else(|| {
                    ParseError::Xml("closing tag without matching opening tag".to_string())
                })?;
                attach(&mut stack, &mut root, el);
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| ParseError::Xml(err.to_string()))?;
                push_text(&mut stack, &text)?;
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_text(&mut stack, &text)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            // Declarations, comments, processing instructions, doctype
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::UnclosedElement(open.name.clone()));
    }
    root.ok_or(ParseError::NoRootElement)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => *root = Some(el),
    }
}

fn push_text(stack: &mut [Element], text: &str) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => {
            // Adjacent text and CDATA runs merge into one node
            if let Some(Node::Text(prev)) = parent.children.last_mut() {
                prev.push_str(text);
            } else {
                parent.children.push(Node::Text(text.to_string()));
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(ParseError::Xml(
            "text outside the root element".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title> Example Blog </title>
    <lastBuildDate>Tue, 05 Mar 2024 10:30:00 GMT</lastBuildDate>
    <item>
      <title>First post</title>
      <link>https://example.com/first</link>
      <dc:creator>Alice</dc:creator>
      <pubDate>Mon, 04 Mar 2024 09:00:00 GMT</pubDate>
      <description><![CDATA[<p>Hello <b>world</b></p>]]></description>
    </item>
    <item>
      <title>Second post</title>
      <link>https://example.com/second</link>
      <author>bob@example.com (Bob)</author>
      <content:encoded><![CDATA[<p>Full body</p>]]></content:encoded>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <updated>2024-03-05T10:30:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <link href="https://example.com/atom-entry"/>
    <author><name>Carol</name><email>carol@example.com</email></author>
    <published>2024-03-01T00:00:00Z</published>
    <updated>2024-03-02T00:00:00Z</updated>
    <summary>Short summary</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_rss_feed_level_fields() {
        let feed = parse_feed(RSS).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Example Blog"));
        assert_eq!(
            feed.last_build_date.as_deref(),
            Some("Tue, 05 Mar 2024 10:30:00 GMT")
        );
        assert_eq!(feed.items.len(), 2);
    }

    #[test]
    fn test_rss_item_fields() {
        let feed = parse_feed(RSS).unwrap();
        let first = &feed.items[0];
        assert_eq!(first.link.as_deref(), Some("https://example.com/first"));
        assert_eq!(first.title, "First post");
        assert_eq!(first.author, "Alice");
        assert_eq!(first.pub_date, "Mon, 04 Mar 2024 09:00:00 GMT");
        assert_eq!(first.content, "<p>Hello <b>world</b></p>");

        let second = &feed.items[1];
        assert_eq!(second.author, "bob@example.com (Bob)");
        assert_eq!(second.content, "<p>Full body</p>");
    }

    #[test]
    fn test_atom_entry_fields() {
        let feed = parse_feed(ATOM).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Atom Example"));
        assert_eq!(feed.last_build_date.as_deref(), Some("2024-03-05T10:30:00Z"));

        let entry = &feed.items[0];
        assert_eq!(entry.link.as_deref(), Some("https://example.com/atom-entry"));
        assert_eq!(entry.author, "Carol");
        // `updated` outranks `published`
        assert_eq!(entry.pub_date, "2024-03-02T00:00:00Z");
        assert_eq!(entry.content, "Short summary");
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let xml = r#"<rss><channel><item><link>https://example.com/x</link></item></channel></rss>"#;
        let feed = parse_feed(xml).unwrap();
        let item = &feed.items[0];
        assert_eq!(item.title, "Untitled");
        assert_eq!(item.author, "Unknown");
        assert!(crate::util::parse_instant(&item.pub_date).is_some());
        assert_eq!(item.content, "");
    }

    #[test]
    fn test_empty_link_is_none() {
        let xml = r#"<rss><channel>
            <item><title>No link</title><link></link></item>
            <item><title>Link</title><link>https://example.com/ok</link></item>
        </channel></rss>"#;
        let feed = parse_feed(xml).unwrap();
        assert_eq!(feed.items.len(), 2);
        assert_eq!(feed.items[0].link, None);
        assert_eq!(feed.items[1].link.as_deref(), Some("https://example.com/ok"));
    }

    #[test]
    fn test_escaped_html_description_is_unescaped() {
        let xml = r#"<rss><channel><item><link>https://e.com/1</link>
            <description>&lt;p&gt;Hi &amp;amp; bye&lt;/p&gt;</description>
        </item></channel></rss>"#;
        let feed = parse_feed(xml).unwrap();
        assert_eq!(feed.items[0].content, "<p>Hi &amp; bye</p>");
    }

    #[test]
    fn test_markup_only_content_falls_back_to_inner_markup() {
        let xml = r#"<feed><entry><link href="https://e.com/1"/>
            <content type="xhtml"><img src="a.png"/></content>
        </entry></feed>"#;
        let feed = parse_feed(xml).unwrap();
        assert_eq!(feed.items[0].content, r#"<img src="a.png"/>"#);
    }

    #[test]
    fn test_malformed_documents_rejected() {
        assert!(parse_feed("<not valid xml").is_err());
        assert!(matches!(
            parse_feed("<rss><channel>"),
            Err(ParseError::UnclosedElement(_))
        ));
        assert!(parse_feed("<rss><channel></rss>").is_err());
        assert!(matches!(parse_feed(""), Err(ParseError::NoRootElement)));
        assert!(parse_feed("just some text").is_err());
        assert!(parse_feed("<a></a><b></b>").is_err());
    }

    #[test]
    fn test_undeclared_entity_rejected() {
        let xml = r#"<rss><channel><item><title>&nbsp;</title></item></channel></rss>"#;
        assert!(parse_feed(xml).is_err());
    }

    #[test]
    fn test_empty_feed_has_no_items() {
        let feed = parse_feed(r#"<rss version="2.0"><channel></channel></rss>"#).unwrap();
        assert!(feed.items.is_empty());
        assert_eq!(feed.title, None);
    }
}
