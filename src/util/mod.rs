//! Utility functions shared across the pipeline.
//!
//! - **URL validation**: only http/https feed URLs are accepted
//! - **Date parsing**: lenient parsing of feed and start-date strings
//!
//! # Examples
//!
//! ```
//! use feednote::util::{parse_instant, validate_feed_url};
//!
//! let url = validate_feed_url("https://example.com/feed.xml").unwrap();
//! let when = parse_instant("Mon, 01 Jan 2024 00:00:00 GMT").unwrap();
//! ```

mod dates;
mod url_validator;

pub use dates::parse_instant;
pub use url_validator::{validate_feed_url, UrlValidationError};
