//! Versioned migrations for the persisted state blob.
//!
//! Each step takes the raw JSON object from version `n` to `n + 1`. A blob
//! without `schemaVersion` is version 0 (the unversioned `data.json` layout).
//! Migrations run once at load, in order, before the blob is deserialized.

use serde_json::{Map, Value};

use super::types::{CURRENT_SCHEMA_VERSION, MIN_CUSTOM_INTERVAL_MINUTES};
use crate::config::ConfigError;

type Migration = fn(&mut Map<String, Value>);

/// `MIGRATIONS[n]` upgrades version `n` to `n + 1`.
const MIGRATIONS: [Migration; CURRENT_SCHEMA_VERSION as usize] = [v0_to_v1, v1_to_v2];

/// Custom interval assumed when a legacy blob selected `custom` without a
/// usable minute count.
const LEGACY_CUSTOM_MINUTES: u64 = 30;

/// Brings `value` up to [`CURRENT_SCHEMA_VERSION`].
///
/// Returns the version the blob started at. Fails on non-object blobs and on
/// blobs written by a newer schema.
pub fn migrate(value: &mut Value) -> Result<u32, ConfigError> {
    let obj = value
        .as_object_mut()
        .ok_or_else(|| ConfigError::Malformed("state is not a JSON object".to_string()))?;

    let found = match obj.get("schemaVersion") {
        None | Some(Value::Null) => 0,
        Some(v) => v.as_u64().ok_or_else(|| {
            ConfigError::Malformed(format!("schemaVersion is not a number: {}", v))
        })?,
    };
    if found > u64::from(CURRENT_SCHEMA_VERSION) {
        return Err(ConfigError::UnsupportedVersion {
            found,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }

    let from = found as u32;
    for (version, step) in MIGRATIONS.iter().enumerate().skip(from as usize) {
        tracing::info!(from = version, to = version + 1, "Migrating state schema");
        step(obj);
    }
    obj.insert(
        "schemaVersion".to_string(),
        Value::from(CURRENT_SCHEMA_VERSION),
    );
    Ok(from)
}

fn feeds_mut<'a>(
    obj: &'a mut Map<String, Value>,
) -> impl Iterator<Item = &'a mut Map<String, Value>> + 'a {
    obj.get_mut("feeds")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}

/// Legacy normalization: fill per-feed fields, add late global settings,
/// retire the markdown content format and the image-download keys.
fn v0_to_v1(obj: &mut Map<String, Value>) {
    for feed in feeds_mut(obj) {
        let has_id = feed
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.trim().is_empty());
        if !has_id {
            feed.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        feed.entry("lastSync").or_insert(Value::Null);
        feed.entry("templateOverride")
            .or_insert_with(|| Value::String(String::new()));
    }

    obj.entry("usePerFeedTemplates")
        .or_insert(Value::Bool(false));
    obj.entry("feedCache")
        .or_insert_with(|| Value::Object(Map::new()));

    if obj.get("contentFormat").and_then(Value::as_str) == Some("markdown") {
        obj.insert("contentFormat".to_string(), Value::from("html"));
    }

    obj.remove("downloadImages");
    obj.remove("imageFolder");
}

/// Folds `fetchInterval` + `customIntervalMinutes` into one value and
/// de-duplicates every ledger.
fn v1_to_v2(obj: &mut Map<String, Value>) {
    let custom = obj.remove("customIntervalMinutes");
    if obj.get("fetchInterval").and_then(Value::as_str) == Some("custom") {
        let minutes = custom
            .as_ref()
            .and_then(|v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .filter(|m| *m > 0)
            .unwrap_or(LEGACY_CUSTOM_MINUTES)
            .clamp(u64::from(MIN_CUSTOM_INTERVAL_MINUTES), u64::from(u32::MAX));
        let mut folded = Map::new();
        folded.insert("custom".to_string(), Value::from(minutes));
        obj.insert("fetchInterval".to_string(), Value::Object(folded));
    }

    for feed in feeds_mut(obj) {
        if let Some(Value::Array(links)) = feed.get_mut("fetchedLinks") {
            let mut seen = std::collections::HashSet::new();
            links.retain(|link| seen.insert(link.to_string()));
        }
    }
}
