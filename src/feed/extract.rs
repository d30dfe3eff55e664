//! Prioritized field extraction for feed items.
//!
//! Each item field is described by an ordered list of [`Extractor`]
//! strategies. The first strategy producing a non-empty value wins, so RSS
//! and Atom vocabularies can be listed side by side.

use super::parser::Element;

/// Element name matcher.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Tag {
    /// Unprefixed element, e.g. `link`.
    Plain(&'static str),
    /// Extension-namespace element, e.g. `dc:creator`.
    Prefixed(&'static str, &'static str),
}

impl Tag {
    pub(crate) fn matches(&self, el: &Element) -> bool {
        match *self {
            Tag::Plain(local) => el.name == local,
            Tag::Prefixed(prefix, local) => el
                .name
                .split_once(':')
                .is_some_and(|(p, l)| p == prefix && l == local),
        }
    }
}

/// One way of pulling a value out of an item element.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Extractor {
    /// Text content of the first matching descendant.
    Text(Tag),
    /// An attribute of the first matching descendant.
    Attr(Tag, &'static str),
    /// Text of a child element nested in the first matching descendant.
    Nested(Tag, Tag),
    /// Text content of the first matching descendant, or its inner markup
    /// when it holds no text at all.
    TextOrMarkup(Tag),
}

impl Extractor {
    fn extract(&self, item: &Element) -> Option<String> {
        let value = match *self {
            Extractor::Text(tag) => item.find_first(&|el| tag.matches(el))?.text_content(),
            Extractor::Attr(tag, key) => item
                .find_first(&|el| tag.matches(el))?
                .attr(key)?
                .to_string(),
            Extractor::Nested(outer, inner) => item
                .find_first(&|el| outer.matches(el))?
                .find_first(&|el| inner.matches(el))?
                .text_content(),
            Extractor::TextOrMarkup(tag) => {
                let el = item.find_first(&|el| tag.matches(el))?;
                let text = el.text_content();
                if text.trim().is_empty() {
                    el.inner_markup()
                } else {
                    text
                }
            }
        };
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Runs `strategies` in order and returns the first non-empty value.
pub(crate) fn first_match(item: &Element, strategies: &[Extractor]) -> Option<String> {
    strategies.iter().find_map(|s| s.extract(item))
}

/// Link text wins; Atom-style `href` on the same element is the fallback.
pub(crate) const LINK: &[Extractor] = &[
    Extractor::Text(Tag::Plain("link")),
    Extractor::Attr(Tag::Plain("link"), "href"),
];

pub(crate) const TITLE: &[Extractor] = &[Extractor::Text(Tag::Plain("title"))];

pub(crate) const AUTHOR: &[Extractor] = &[
    Extractor::Nested(Tag::Plain("author"), Tag::Plain("name")),
    Extractor::Text(Tag::Plain("author")),
    Extractor::Text(Tag::Prefixed("dc", "creator")),
];

pub(crate) const PUB_DATE: &[Extractor] = &[
    Extractor::Text(Tag::Plain("pubDate")),
    Extractor::Text(Tag::Plain("updated")),
    Extractor::Text(Tag::Plain("published")),
];

pub(crate) const CONTENT: &[Extractor] = &[
    Extractor::TextOrMarkup(Tag::Plain("description")),
    Extractor::TextOrMarkup(Tag::Plain("content")),
    Extractor::TextOrMarkup(Tag::Plain("summary")),
    Extractor::TextOrMarkup(Tag::Prefixed("content", "encoded")),
];
