use chrono::{DateTime, Utc};

use crate::feed::FeedItem;
use crate::storage::FeedConfig;
use crate::util::parse_instant;

/// Why an item was not imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No link could be resolved, so there is no dedup key.
    MissingLink,
    /// The link is already in the feed's ledger.
    AlreadyImported,
    /// Published strictly before the feed's start date.
    BeforeStartDate,
}

/// Which side of the date comparison could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    PubDate,
    StartDate,
}

/// An item admitted only because a date could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWarning {
    pub link: String,
    pub field: DateField,
    pub value: String,
}

/// Decision for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Import,
    /// Imported although the date filter could not be applied.
    ImportUnparsedDate(DateWarning),
    Skip(SkipReason),
}

impl FilterOutcome {
    pub fn is_import(&self) -> bool {
        !matches!(self, Self::Skip(_))
    }
}

/// Decides whether `item` is new for `feed`.
///
/// Link checks come first: an item without a link, or whose link is already
/// in the ledger, is skipped whatever its date. With a start date set, the
/// item must be published at or after it. Dates that fail to parse admit
/// the item and carry a [`DateWarning`].
pub fn evaluate(item: &FeedItem, feed: &FeedConfig) -> FilterOutcome {
    let Some(link) = item.link.as_deref() else {
        return FilterOutcome::Skip(SkipReason::MissingLink);
    };
    if feed.fetched_links.contains(link) {
        return FilterOutcome::Skip(SkipReason::AlreadyImported);
    }
    let Some(start) = feed.start_date() else {
        return FilterOutcome::Import;
    };

    let warn = |field, value: &str| {
        FilterOutcome::ImportUnparsedDate(DateWarning {
            link: link.to_string(),
            field,
            value: value.to_string(),
        })
    };
    let Some(start_at) = parse_instant(start) else {
        return warn(DateField::StartDate, start);
    };
    let Some(published) = parse_instant(&item.pub_date) else {
        return warn(DateField::PubDate, &item.pub_date);
    };

    if is_on_or_after(published, start_at) {
        FilterOutcome::Import
    } else {
        FilterOutcome::Skip(SkipReason::BeforeStartDate)
    }
}

fn is_on_or_after(published: DateTime<Utc>, start: DateTime<Utc>) -> bool {
    published >= start
}

/// Boolean projection of [`evaluate`].
pub fn should_import(item: &FeedItem, feed: &FeedConfig) -> bool {
    evaluate(item, feed).is_import()
}
