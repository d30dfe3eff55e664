//! Feed sync orchestration.
//!
//! Drives each feed through fetch → parse → filter → render → write, one
//! feed at a time and one item at a time. Links are recorded only after the
//! note is written, and state is persisted after every write.
//!
//! - `filter` - dedup ledger and start-date decisions
//! - `scheduler` - timer and manual triggers behind one non-reentrant entry point

mod filter;
mod scheduler;

pub use filter::{evaluate, should_import, DateField, DateWarning, FilterOutcome, SkipReason};
pub use scheduler::{Scheduler, TriggerOutcome};

use chrono::Utc;
use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;
use crate::feed::{parse_feed, FeedItem, FetchError, Fetcher, ParseError, ParsedFeed};
use crate::note::{format_content, render, resolve_note_path, NoteFields, RenderedNote};
use crate::notify::Notifier;
use crate::storage::{
    FeedConfig, FeedMetadata, FilesystemError, GlobalConfig, StateStore, Vault,
};

/// Title cached for a health-checked feed that has no `title` element.
const UNKNOWN_TITLE: &str = "Unknown";

// ============================================================================
// Errors and reports
// ============================================================================

/// Per-feed failure. Reported to the operator; never aborts a batch.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Feed URL not configured")]
    MissingUrl,

    #[error("No feed with id '{0}'")]
    UnknownFeed(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    #[error("Failed to save state: {0}")]
    Config(#[from] ConfigError),
}

/// Stages of a single feed sync, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Fetching,
    Parsing,
    Filtering,
    Writing,
    PersistingState,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetching => "fetching",
            Self::Parsing => "parsing",
            Self::Filtering => "filtering",
            Self::Writing => "writing",
            Self::PersistingState => "persisting",
        };
        f.write_str(name)
    }
}

/// An item whose note could not be written. Its link stays out of the ledger.
#[derive(Debug)]
pub struct ItemFailure {
    pub link: String,
    pub title: String,
    pub error: FilesystemError,
}

/// Result of syncing one feed.
#[derive(Debug, Default)]
pub struct FeedReport {
    pub feed_id: String,
    pub feed_name: String,
    pub imported: usize,
    pub skipped: usize,
    /// Paths of the notes written, in item order.
    pub written: Vec<String>,
    pub failures: Vec<ItemFailure>,
    /// Items admitted only because a date could not be parsed.
    pub date_warnings: Vec<DateWarning>,
}

/// A feed in a batch run that failed as a whole.
#[derive(Debug)]
pub struct FeedFailure {
    pub feed_id: String,
    pub feed_name: String,
    pub error: SyncError,
}

/// Result of a batch run over every feed with a URL.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// New notes across all feeds.
    pub imported: usize,
    /// Feeds attempted (those with a non-empty URL).
    pub feeds: usize,
    pub reports: Vec<FeedReport>,
    pub errors: Vec<FeedFailure>,
}

impl BatchReport {
    /// The one notification a batch run ends with.
    pub fn summary(&self) -> String {
        if self.feeds == 0 {
            return "No feeds configured".to_string();
        }
        let mut summary = format!(
            "RSS import complete: {} new items across {} feeds.",
            self.imported, self.feeds
        );
        if !self.errors.is_empty() {
            let failed: Vec<String> = self
                .errors
                .iter()
                .map(|f| format!("{}: {}", f.feed_name, f.error))
                .collect();
            summary.push_str(&format!(
                " {} failed: {}",
                self.errors.len(),
                failed.join("; ")
            ));
        }
        summary
    }
}

/// Diagnostic result of a health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedHealth {
    pub title: String,
    pub item_count: usize,
    pub last_build_date: Option<String>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Owns the state blob and the collaborators a sync needs.
///
/// All operations take `&mut self`, so at most one sync runs per `Syncer`.
/// Share one behind a [`Scheduler`] to serialize timer and manual triggers.
pub struct Syncer<V, N> {
    fetcher: Fetcher,
    vault: V,
    notifier: N,
    store: StateStore,
    state: GlobalConfig,
}

impl<V: Vault, N: Notifier> Syncer<V, N> {
    pub fn new(
        fetcher: Fetcher,
        vault: V,
        notifier: N,
        store: StateStore,
        state: GlobalConfig,
    ) -> Self {
        Self {
            fetcher,
            vault,
            notifier,
            store,
            state,
        }
    }

    pub fn state(&self) -> &GlobalConfig {
        &self.state
    }

    /// Mutable access for operator edits. Call [`Self::persist`] afterwards.
    pub fn state_mut(&mut self) -> &mut GlobalConfig {
        &mut self.state
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    /// Writes the whole state blob.
    pub fn persist(&self) -> Result<(), ConfigError> {
        self.store.save(&self.state)
    }

    /// Syncs every feed with a URL, one after another.
    ///
    /// A failing feed is reported and skipped; the batch always finishes
    /// and ends with exactly one summary notification.
    pub async fn fetch_all(&mut self) -> BatchReport {
        let ids: Vec<String> = self
            .state
            .feeds
            .iter()
            .filter(|f| f.has_url())
            .map(|f| f.id.clone())
            .collect();

        let mut batch = BatchReport {
            feeds: ids.len(),
            ..BatchReport::default()
        };
        if ids.is_empty() {
            tracing::info!("No feeds with a URL, nothing to fetch");
            self.notifier.notify(&batch.summary());
            return batch;
        }

        tracing::info!(feeds = ids.len(), "Fetching all feeds");
        for id in ids {
            match self.sync_feed(&id).await {
                Ok(report) => {
                    batch.imported += report.imported;
                    batch.reports.push(report);
                }
                Err(error) => {
                    let feed_name = self.feed_name(&id);
                    tracing::warn!(feed = %feed_name, error = %error, "Feed sync failed");
                    batch.errors.push(FeedFailure {
                        feed_id: id,
                        feed_name,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            imported = batch.imported,
            feeds = batch.feeds,
            failed = batch.errors.len(),
            "Batch fetch complete"
        );
        self.notifier.notify(&batch.summary());
        batch
    }

    /// Syncs one feed and notifies its own result.
    pub async fn fetch_feed(&mut self, id: &str) -> Result<FeedReport, SyncError> {
        let feed = self
            .state
            .feed(id)
            .ok_or_else(|| SyncError::UnknownFeed(id.to_string()))?;
        if !feed.has_url() {
            self.notifier.notify(&SyncError::MissingUrl.to_string());
            return Err(SyncError::MissingUrl);
        }

        match self.sync_feed(id).await {
            Ok(report) => {
                self.notifier.notify(&format!(
                    "{}: {} new items imported.",
                    report.feed_name, report.imported
                ));
                Ok(report)
            }
            Err(e) => {
                let name = self.feed_name(id);
                tracing::warn!(feed = %name, error = %e, "Feed sync failed");
                self.notifier
                    .notify(&format!("Failed to fetch {}: {}", name, e));
                Err(e)
            }
        }
    }

    /// Fetches and parses `url` without writing notes or touching any ledger.
    ///
    /// Only the metadata cache is updated.
    pub async fn check_health(&mut self, url: &str) -> Result<FeedHealth, SyncError> {
        let result = self.probe(url).await;
        match &result {
            Ok(health) => self.notifier.notify(&format!(
                "Feed healthy: \"{}\" ({} items)",
                health.title, health.item_count
            )),
            Err(e) => self.notifier.notify(&format!("Feed error: {}", e)),
        }
        result
    }

    async fn probe(&mut self, url: &str) -> Result<FeedHealth, SyncError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(SyncError::MissingUrl);
        }
        let response = self.fetcher.fetch(url).await?;
        let parsed = parse_feed(&response.text)?;

        let health = FeedHealth {
            title: parsed
                .title
                .clone()
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            item_count: parsed.items.len(),
            last_build_date: parsed.last_build_date.clone(),
        };
        self.cache_metadata(url, &parsed, &health.title);
        self.persist()?;
        tracing::info!(url = %url, items = health.item_count, "Feed health check passed");
        Ok(health)
    }

    fn feed_name(&self, id: &str) -> String {
        self.state
            .feed(id)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn cache_metadata(&mut self, url: &str, parsed: &ParsedFeed, title: &str) {
        self.state.feed_cache.insert(
            url.to_string(),
            FeedMetadata {
                title: title.to_string(),
                item_count: parsed.items.len(),
                last_build_date: parsed.last_build_date.clone(),
                last_checked: Utc::now(),
            },
        );
    }

    /// One pass of the per-feed state machine. No notifications.
    async fn sync_feed(&mut self, id: &str) -> Result<FeedReport, SyncError> {
        let feed = self
            .state
            .feed_mut(id)
            .ok_or_else(|| SyncError::UnknownFeed(id.to_string()))?;
        if !feed.has_url() {
            return Err(SyncError::MissingUrl);
        }
        feed.last_sync = Some(Utc::now());
        let url = feed.url.trim().to_string();
        let mut report = FeedReport {
            feed_id: feed.id.clone(),
            feed_name: feed.name.clone(),
            ..FeedReport::default()
        };
        self.persist()?;

        tracing::debug!(feed = %report.feed_name, phase = %SyncPhase::Fetching, url = %url);
        let response = self.fetcher.fetch(&url).await?;

        tracing::debug!(feed = %report.feed_name, phase = %SyncPhase::Parsing, bytes = response.text.len());
        let parsed = parse_feed(&response.text)?;
        let cached_title = parsed
            .title
            .clone()
            .unwrap_or_else(|| report.feed_name.clone());
        self.cache_metadata(&url, &parsed, &cached_title);

        tracing::debug!(feed = %report.feed_name, phase = %SyncPhase::Filtering, items = parsed.items.len());
        for item in &parsed.items {
            let feed = self
                .state
                .feed(id)
                .ok_or_else(|| SyncError::UnknownFeed(id.to_string()))?;
            let link = match evaluate(item, feed) {
                FilterOutcome::Skip(reason) => {
                    tracing::debug!(
                        feed = %report.feed_name,
                        link = item.link.as_deref().unwrap_or(""),
                        reason = ?reason,
                        "Skipping item"
                    );
                    report.skipped += 1;
                    continue;
                }
                FilterOutcome::ImportUnparsedDate(warning) => {
                    tracing::warn!(
                        feed = %report.feed_name,
                        link = %warning.link,
                        field = ?warning.field,
                        value = %warning.value,
                        "Unparseable date, importing anyway"
                    );
                    let link = warning.link.clone();
                    report.date_warnings.push(warning);
                    link
                }
                FilterOutcome::Import => match item.link.as_deref() {
                    Some(link) => link.to_string(),
                    None => continue,
                },
            };

            tracing::debug!(feed = %report.feed_name, phase = %SyncPhase::Writing, link = %link);
            match self.write_note(feed, item, &link).await {
                Ok(note) => {
                    if let Some(feed) = self.state.feed_mut(id) {
                        feed.fetched_links.record(link);
                    }
                    report.imported += 1;
                    report.written.push(note.path);
                    if let Err(e) = self.persist() {
                        tracing::warn!(feed = %report.feed_name, error = %e, "Failed to persist after write");
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        feed = %report.feed_name,
                        link = %link,
                        error = %error,
                        "Failed to write note"
                    );
                    report.failures.push(ItemFailure {
                        link,
                        title: item.title.clone(),
                        error,
                    });
                }
            }
        }

        tracing::debug!(feed = %report.feed_name, phase = %SyncPhase::PersistingState);
        // Notes already on disk stay counted
        if let Err(e) = self.persist() {
            tracing::warn!(feed = %report.feed_name, error = %e, "Failed to persist state");
        }

        tracing::info!(
            feed = %report.feed_name,
            imported = report.imported,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Feed synced"
        );
        Ok(report)
    }

    /// Renders `item` and writes it to a fresh path in the feed's folder.
    async fn write_note(
        &self,
        feed: &FeedConfig,
        item: &FeedItem,
        link: &str,
    ) -> Result<RenderedNote, FilesystemError> {
        let body = render_note(&self.state, feed, item, link);
        let path =
            resolve_note_path(&self.vault, self.state.target_folder(feed), &item.title).await?;
        self.vault.create_file(&path, &body).await?;
        Ok(RenderedNote { path, body })
    }
}

/// Note body for `item`: cleaned content in the configured format, substituted
/// into the feed's template.
pub fn render_note(state: &GlobalConfig, feed: &FeedConfig, item: &FeedItem, link: &str) -> String {
    let content = format_content(&item.content, state.content_format);
    let fields = NoteFields {
        title: &item.title,
        author: &item.author,
        link,
        pub_date: &item.pub_date,
        feed_name: &feed.name,
        content: &content,
    };
    render(state.template_for(feed), &fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ContentFormat;
    use pretty_assertions::assert_eq;

    fn item() -> FeedItem {
        FeedItem {
            link: Some("https://e.com/1".to_string()),
            title: "Hello".to_string(),
            author: "Ann".to_string(),
            pub_date: "2024-03-05".to_string(),
            content: "<p>Body</p>".to_string(),
        }
    }

    #[test]
    fn test_render_note_uses_global_template() {
        let mut state = GlobalConfig::default();
        state.template = "{{title}} by {{author}} in {{feedName}}\n{{content}}".to_string();
        let feed = FeedConfig::new("https://e.com/rss", "Example");

        assert_eq!(
            render_note(&state, &feed, &item(), "https://e.com/1"),
            "Hello by Ann in Example\n<p>Body</p>"
        );
    }

    #[test]
    fn test_render_note_per_feed_override_and_format() {
        let mut state = GlobalConfig::default();
        state.use_per_feed_templates = true;
        state.content_format = ContentFormat::HtmlBlock;
        let mut feed = FeedConfig::new("https://e.com/rss", "Example");
        feed.template_override = "[{{link}}] {{content}}".to_string();

        assert_eq!(
            render_note(&state, &feed, &item(), "https://e.com/1"),
            "[https://e.com/1] ```html\n<p>Body</p>\n```"
        );
    }

    #[test]
    fn test_default_template_front_matter() {
        let state = GlobalConfig::default();
        let feed = FeedConfig::new("https://e.com/rss", "Example");

        assert_eq!(
            render_note(&state, &feed, &item(), "https://e.com/1"),
            "---\ntitle: \"Hello\"\nauthor: \"Ann\"\nsource: \"https://e.com/1\"\ndate: \"2024-03-05\"\nfeed: \"Example\"\n---\n\n<p>Body</p>"
        );
    }

    #[test]
    fn test_batch_summary_texts() {
        let mut batch = BatchReport::default();
        assert_eq!(batch.summary(), "No feeds configured");

        batch.feeds = 2;
        batch.imported = 3;
        assert_eq!(
            batch.summary(),
            "RSS import complete: 3 new items across 2 feeds."
        );

        batch.errors.push(FeedFailure {
            feed_id: "x".to_string(),
            feed_name: "Broken".to_string(),
            error: SyncError::Fetch(FetchError::HttpStatus(500)),
        });
        assert_eq!(
            batch.summary(),
            "RSS import complete: 3 new items across 2 feeds. 1 failed: Broken: HTTP error: status 500"
        );
    }
}
