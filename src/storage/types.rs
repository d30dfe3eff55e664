use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::ConfigError;
use crate::note::DEFAULT_TEMPLATE;

/// Current persisted schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Smallest accepted custom auto-fetch interval.
pub const MIN_CUSTOM_INTERVAL_MINUTES: u32 = 5;

const DEFAULT_FOLDER: &str = "RSS Notes";

// ============================================================================
// Enums
// ============================================================================

/// Whether all feeds write into one folder or each into its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderStructure {
    #[default]
    Shared,
    Separate,
}

impl FromStr for FolderStructure {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(Self::Shared),
            "separate" => Ok(Self::Separate),
            other => Err(ConfigError::InvalidValue(format!(
                "folder structure '{}' (expected shared or separate)",
                other
            ))),
        }
    }
}

/// How item content is embedded in the note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentFormat {
    /// Cleaned HTML inline.
    #[default]
    #[serde(rename = "html")]
    Html,
    /// Cleaned HTML inside an ```html fence.
    #[serde(rename = "htmlBlock")]
    HtmlBlock,
    /// Cleaned HTML fenced inside a `[!note]` callout.
    #[serde(rename = "htmlCallout")]
    HtmlCallout,
}

impl FromStr for ContentFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(Self::Html),
            "htmlBlock" => Ok(Self::HtmlBlock),
            "htmlCallout" => Ok(Self::HtmlCallout),
            other => Err(ConfigError::InvalidValue(format!(
                "content format '{}' (expected html, htmlBlock or htmlCallout)",
                other
            ))),
        }
    }
}

/// Auto-fetch schedule.
///
/// Serialized as `"manual"`, `"10min"`, `"30min"`, `"hour"` or
/// `{"custom": <minutes>}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchInterval {
    #[default]
    #[serde(rename = "manual")]
    Manual,
    #[serde(rename = "10min")]
    TenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "hour")]
    Hour,
    #[serde(rename = "custom")]
    Custom(u32),
}

impl FetchInterval {
    /// A custom interval; rejects anything under five minutes.
    pub fn custom(minutes: u32) -> Result<Self, ConfigError> {
        if minutes < MIN_CUSTOM_INTERVAL_MINUTES {
            return Err(ConfigError::InvalidInterval(minutes));
        }
        Ok(Self::Custom(minutes))
    }

    /// Time between automatic runs; `None` for manual.
    pub fn period(&self) -> Option<Duration> {
        let minutes = match *self {
            Self::Manual => return None,
            Self::TenMinutes => 10,
            Self::ThirtyMinutes => 30,
            Self::Hour => 60,
            // Hand-edited state may hold a smaller value
            Self::Custom(m) => m.max(MIN_CUSTOM_INTERVAL_MINUTES),
        };
        Some(Duration::from_secs(u64::from(minutes) * 60))
    }
}

impl FromStr for FetchInterval {
    type Err = ConfigError;

    /// Accepts the preset names, `custom:<minutes>` or a bare minute count.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "10min" => Ok(Self::TenMinutes),
            "30min" => Ok(Self::ThirtyMinutes),
            "hour" => Ok(Self::Hour),
            other => {
                let minutes = other.strip_prefix("custom:").unwrap_or(other);
                let minutes: u32 = minutes.trim().parse().map_err(|_| {
                    ConfigError::InvalidValue(format!(
                        "fetch interval '{}' (expected manual, 10min, 30min, hour or minutes)",
                        other
                    ))
                })?;
                Self::custom(minutes)
            }
        }
    }
}

impl fmt::Display for FetchInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::TenMinutes => write!(f, "every 10 minutes"),
            Self::ThirtyMinutes => write!(f, "every 30 minutes"),
            Self::Hour => write!(f, "every hour"),
            Self::Custom(m) => write!(f, "every {} minutes", m),
        }
    }
}

// ============================================================================
// Dedup ledger
// ============================================================================

/// Links already imported for one feed, in import order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct FetchedLinks {
    links: Vec<String>,
    index: HashSet<String>,
}

impl FetchedLinks {
    pub fn contains(&self, link: &str) -> bool {
        self.index.contains(link)
    }

    /// Appends `link`; returns `false` if it was already present.
    pub fn record(&mut self, link: impl Into<String>) -> bool {
        let link = link.into();
        if self.index.contains(&link) {
            return false;
        }
        self.index.insert(link.clone());
        self.links.push(link);
        true
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for FetchedLinks {
    fn from(links: Vec<String>) -> Self {
        let mut ledger = Self::default();
        for link in links {
            ledger.record(link);
        }
        ledger
    }
}

impl From<FetchedLinks> for Vec<String> {
    fn from(ledger: FetchedLinks) -> Self {
        ledger.links
    }
}

// ============================================================================
// Feed + global state
// ============================================================================

/// One configured subscription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedConfig {
    pub id: String,
    pub url: String,
    pub name: String,
    /// Target folder, used in `separate` mode only.
    pub folder: String,
    /// Inclusive lower bound on publish date; empty = no filter.
    pub start_date: String,
    pub fetched_links: FetchedLinks,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_sync: Option<DateTime<Utc>>,
    pub template_override: String,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            name: name.into(),
            folder: DEFAULT_FOLDER.to_string(),
            ..Self::default()
        }
    }

    pub fn start_date(&self) -> Option<&str> {
        let s = self.start_date.trim();
        (!s.is_empty()).then_some(s)
    }

    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// One-line status, e.g. `3 items imported. Never synced.`
    pub fn status_line(&self) -> String {
        let mut status = format!("{} items imported.", self.fetched_links.len());
        match self.last_sync {
            Some(at) => status.push_str(&format!(
                " Last synced: {}.",
                at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
            )),
            None => status.push_str(" Never synced."),
        }
        status
    }
}

/// Diagnostic metadata from the most recent fetch of a feed URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedMetadata {
    pub title: String,
    pub item_count: usize,
    #[serde(default)]
    pub last_build_date: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_checked: DateTime<Utc>,
}

/// The whole persisted state: feeds, global settings and the metadata cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalConfig {
    pub schema_version: u32,
    pub feeds: Vec<FeedConfig>,
    pub folder_structure: FolderStructure,
    pub shared_folder: String,
    pub template: String,
    pub use_per_feed_templates: bool,
    pub content_format: ContentFormat,
    pub fetch_interval: FetchInterval,
    /// Keyed by feed URL.
    pub feed_cache: BTreeMap<String, FeedMetadata>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            feeds: Vec::new(),
            folder_structure: FolderStructure::Shared,
            shared_folder: DEFAULT_FOLDER.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
            use_per_feed_templates: false,
            content_format: ContentFormat::Html,
            fetch_interval: FetchInterval::Manual,
            feed_cache: BTreeMap::new(),
        }
    }
}

impl GlobalConfig {
    pub fn feed(&self, id: &str) -> Option<&FeedConfig> {
        self.feeds.iter().find(|f| f.id == id)
    }

    pub fn feed_mut(&mut self, id: &str) -> Option<&mut FeedConfig> {
        self.feeds.iter_mut().find(|f| f.id == id)
    }

    /// Resolves an operator-supplied reference to a feed id.
    ///
    /// Tries an exact id, then an exact name, then a 1-based position.
    pub fn resolve_feed(&self, key: &str) -> Result<String, ConfigError> {
        if let Some(feed) = self.feeds.iter().find(|f| f.id == key) {
            return Ok(feed.id.clone());
        }
        if let Some(feed) = self.feeds.iter().find(|f| f.name == key) {
            return Ok(feed.id.clone());
        }
        key.parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.feeds.get(i))
            .map(|f| f.id.clone())
            .ok_or_else(|| ConfigError::UnknownFeed(key.to_string()))
    }

    /// Adds a subscription with a fresh id; `name` defaults to `Feed <n>`.
    pub fn add_feed(&mut self, url: &str, name: Option<&str>) -> &mut FeedConfig {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("Feed {}", self.feeds.len() + 1));
        self.feeds.push(FeedConfig::new(url.trim(), name));
        let last = self.feeds.len() - 1;
        &mut self.feeds[last]
    }

    /// Removes a feed and, when no other feed shares its URL, its cached metadata.
    pub fn remove_feed(&mut self, id: &str) -> Result<FeedConfig, ConfigError> {
        let pos = self
            .feeds
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| ConfigError::UnknownFeed(id.to_string()))?;
        let removed = self.feeds.remove(pos);
        if !self.feeds.iter().any(|f| f.url == removed.url) {
            self.feed_cache.remove(&removed.url);
        }
        Ok(removed)
    }

    /// Re-import reset: forgets every link imported for the feed.
    pub fn clear_history(&mut self, id: &str) -> Result<&FeedConfig, ConfigError> {
        let feed = self
            .feed_mut(id)
            .ok_or_else(|| ConfigError::UnknownFeed(id.to_string()))?;
        feed.fetched_links.clear();
        Ok(feed)
    }

    /// Template for notes of `feed`: its override when per-feed templates are
    /// enabled and the override is set, the global template otherwise.
    pub fn template_for<'a>(&'a self, feed: &'a FeedConfig) -> &'a str {
        if self.use_per_feed_templates && !feed.template_override.is_empty() {
            &feed.template_override
        } else {
            &self.template
        }
    }

    /// Destination folder for notes of `feed`.
    pub fn target_folder<'a>(&'a self, feed: &'a FeedConfig) -> &'a str {
        match self.folder_structure {
            FolderStructure::Separate if !feed.folder.trim().is_empty() => &feed.folder,
            FolderStructure::Separate => &feed.name,
            FolderStructure::Shared => &self.shared_folder,
        }
    }

    /// Gives every feed a non-empty id unique within this state.
    ///
    /// Returns `true` if any id was (re)assigned.
    pub fn ensure_unique_ids(&mut self) -> bool {
        let mut seen = HashSet::new();
        let mut changed = false;
        for feed in &mut self.feeds {
            if feed.id.trim().is_empty() || !seen.insert(feed.id.clone()) {
                feed.id = uuid::Uuid::new_v4().to_string();
                seen.insert(feed.id.clone());
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_deduplicates() {
        let mut ledger = FetchedLinks::from(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.record("b"));
        assert!(ledger.record("c"));
        assert_eq!(ledger.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);

        ledger.clear();
        assert!(ledger.is_empty());
        assert!(!ledger.contains("a"));
    }

    #[test]
    fn test_ledger_serializes_as_array() {
        let ledger = FetchedLinks::from(vec!["x".to_string(), "y".to_string()]);
        assert_eq!(serde_json::to_string(&ledger).unwrap(), r#"["x","y"]"#);
        let back: FetchedLinks = serde_json::from_str(r#"["x","x","y"]"#).unwrap();
        assert_eq!(back, ledger);
    }

    #[test]
    fn test_fetch_interval_serde_shape() {
        assert_eq!(
            serde_json::to_string(&FetchInterval::TenMinutes).unwrap(),
            r#""10min""#
        );
        assert_eq!(
            serde_json::to_string(&FetchInterval::Custom(45)).unwrap(),
            r#"{"custom":45}"#
        );
        let parsed: FetchInterval = serde_json::from_str(r#"{"custom":45}"#).unwrap();
        assert_eq!(parsed, FetchInterval::Custom(45));
    }

    #[test]
    fn test_fetch_interval_parse_and_period() {
        assert_eq!("manual".parse::<FetchInterval>().unwrap().period(), None);
        assert_eq!(
            "hour".parse::<FetchInterval>().unwrap().period(),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            "custom:15".parse::<FetchInterval>().unwrap(),
            FetchInterval::Custom(15)
        );
        assert_eq!("45".parse::<FetchInterval>().unwrap(), FetchInterval::Custom(45));
        assert!(matches!(
            "4".parse::<FetchInterval>(),
            Err(ConfigError::InvalidInterval(4))
        ));
        assert!("soon".parse::<FetchInterval>().is_err());
        assert_eq!(
            FetchInterval::Custom(1).period(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_template_selection() {
        let mut config = GlobalConfig::default();
        let mut feed = FeedConfig::new("https://e.com/rss", "E");
        feed.template_override = "{{title}}".to_string();

        assert_eq!(config.template_for(&feed), DEFAULT_TEMPLATE);
        config.use_per_feed_templates = true;
        assert_eq!(config.template_for(&feed), "{{title}}");
        feed.template_override.clear();
        assert_eq!(config.template_for(&feed), DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_target_folder() {
        let mut config = GlobalConfig::default();
        let mut feed = FeedConfig::new("https://e.com/rss", "Example");
        feed.folder = "Per Feed".to_string();

        assert_eq!(config.target_folder(&feed), "RSS Notes");
        config.folder_structure = FolderStructure::Separate;
        assert_eq!(config.target_folder(&feed), "Per Feed");
        feed.folder.clear();
        assert_eq!(config.target_folder(&feed), "Example");
    }

    #[test]
    fn test_add_resolve_remove() {
        let mut config = GlobalConfig::default();
        let id = config.add_feed(" https://a.example/rss ", None).id.clone();
        config.add_feed("https://b.example/rss", Some("Bee"));

        assert_eq!(config.feeds[0].name, "Feed 1");
        assert_eq!(config.feeds[0].url, "https://a.example/rss");
        assert_eq!(config.resolve_feed(&id).unwrap(), id);
        assert_eq!(config.resolve_feed("Bee").unwrap(), config.feeds[1].id);
        assert_eq!(config.resolve_feed("1").unwrap(), id);
        assert!(config.resolve_feed("0").is_err());
        assert!(config.resolve_feed("nope").is_err());

        config.feed_cache.insert(
            "https://a.example/rss".to_string(),
            FeedMetadata {
                title: "A".to_string(),
                item_count: 1,
                last_build_date: None,
                last_checked: Utc::now(),
            },
        );
        let removed = config.remove_feed(&id).unwrap();
        assert_eq!(removed.name, "Feed 1");
        assert!(config.feed_cache.is_empty());
        assert_eq!(config.feeds.len(), 1);
    }

    #[test]
    fn test_clear_history() {
        let mut config = GlobalConfig::default();
        let id = config.add_feed("https://a.example/rss", None).id.clone();
        config.feeds[0].fetched_links.record("https://a.example/1");

        let feed = config.clear_history(&id).unwrap();
        assert!(feed.fetched_links.is_empty());
        assert!(matches!(
            config.clear_history("missing"),
            Err(ConfigError::UnknownFeed(_))
        ));
    }

    #[test]
    fn test_ensure_unique_ids() {
        let mut config = GlobalConfig::default();
        config.feeds.push(FeedConfig {
            id: "same".to_string(),
            ..FeedConfig::default()
        });
        config.feeds.push(FeedConfig {
            id: "same".to_string(),
            ..FeedConfig::default()
        });
        config.feeds.push(FeedConfig::default());

        assert!(config.ensure_unique_ids());
        let ids: HashSet<_> = config.feeds.iter().map(|f| f.id.clone()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(config.feeds[0].id, "same");
        assert!(!config.ensure_unique_ids());
    }

    #[test]
    fn test_status_line() {
        let mut feed = FeedConfig::new("https://e.com/rss", "E");
        assert_eq!(feed.status_line(), "0 items imported. Never synced.");
        feed.fetched_links.record("x");
        feed.last_sync = Some(Utc::now());
        assert!(feed.status_line().starts_with("1 items imported. Last synced: "));
    }
}
