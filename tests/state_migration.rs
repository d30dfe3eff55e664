//! Loading a `data.json` written by the unversioned plugin layout and
//! carrying on from it: migration, ledger dedup and no re-imports.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use feednote::feed::Fetcher;
use feednote::notify::MemoryNotifier;
use feednote::storage::{
    ContentFormat, FetchInterval, FolderStructure, FsVault, StateStore, CURRENT_SCHEMA_VERSION,
};
use feednote::sync::Syncer;

fn legacy_blob(url: &str) -> String {
    format!(
        r#"{{
  "feeds": [
    {{
      "id": "1700000000000",
      "url": "{url}",
      "name": "Legacy",
      "folder": "Old Notes",
      "startDate": "",
      "fetchedLinks": ["https://e.com/1", "https://e.com/1"]
    }},
    {{
      "url": "",
      "name": "Feed 2",
      "folder": "RSS Notes",
      "startDate": "",
      "fetchedLinks": []
    }}
  ],
  "folderStructure": "separate",
  "sharedFolder": "RSS Notes",
  "fetchInterval": "custom",
  "customIntervalMinutes": 15,
  "contentFormat": "markdown",
  "template": "{{{{title}}}}",
  "downloadImages": true,
  "imageFolder": "attachments"
}}"#
    )
}

#[test]
fn test_legacy_state_loads_with_defaults_filled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    std::fs::write(&path, legacy_blob("https://e.com/rss")).unwrap();

    let state = StateStore::new(&path).load().unwrap();

    assert_eq!(state.schema_version, CURRENT_SCHEMA_VERSION);
    assert_eq!(state.folder_structure, FolderStructure::Separate);
    assert_eq!(state.content_format, ContentFormat::Html);
    assert_eq!(state.fetch_interval, FetchInterval::Custom(15));
    assert_eq!(state.template, "{{title}}");
    assert!(!state.use_per_feed_templates);
    assert!(state.feed_cache.is_empty());

    assert_eq!(state.feeds[0].id, "1700000000000");
    assert_eq!(state.feeds[0].fetched_links.len(), 1);
    assert_eq!(state.feeds[0].last_sync, None);
    assert!(!state.feeds[1].id.is_empty());
    assert_ne!(state.feeds[0].id, state.feeds[1].id);

    // Rewritten in the current layout
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["fetchInterval"], serde_json::json!({"custom": 15}));
    assert!(saved.get("imageFolder").is_none());

    // Loading again is a no-op
    assert_eq!(StateStore::new(&path).load().unwrap(), state);
}

#[tokio::test]
async fn test_migrated_ledger_still_prevents_reimport() {
    let server = MockServer::start().await;
    let feed = r#"<rss><channel><title>Legacy</title>
        <item><title>Seen</title><link>https://e.com/1</link></item>
        <item><title>Fresh</title><link>https://e.com/2</link></item>
        </channel></rss>"#;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    std::fs::write(&path, legacy_blob(&format!("{}/rss", server.uri()))).unwrap();
    let store = StateStore::new(&path);
    let state = store.load().unwrap();

    let mut syncer = Syncer::new(
        Fetcher::with_client(reqwest::Client::new()),
        FsVault::new(dir.path().join("vault")),
        Arc::new(MemoryNotifier::new()),
        store,
        state,
    );
    let batch = syncer.fetch_all().await;

    assert_eq!(batch.feeds, 1);
    assert_eq!(batch.imported, 1);
    assert_eq!(batch.reports[0].written, vec!["Old Notes/Fresh.md"]);
    let body = std::fs::read_to_string(dir.path().join("vault/Old Notes/Fresh.md")).unwrap();
    assert_eq!(body, "Fresh");
}
