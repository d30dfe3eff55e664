//! Feed retrieval and parsing.
//!
//! - `fetcher` - plain HTTP GET with a body size limit
//! - `parser` - RSS/Atom XML into normalized [`FeedItem`] records
//! - `extract` - the prioritized per-field extractor strategies the parser uses
//!
//! # Example
//!
//! ```ignore
//! use feednote::feed::{parse_feed, Fetcher};
//!
//! let fetcher = Fetcher::new("feednote", None)?;
//! let response = fetcher.fetch("https://example.com/feed.xml").await?;
//! let feed = parse_feed(&response.text)?;
//! ```

mod extract;
mod fetcher;
mod parser;

pub use fetcher::{FetchError, FetchResponse, Fetcher};
pub use parser::{parse_feed, FeedItem, ParseError, ParsedFeed};
