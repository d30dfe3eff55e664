use std::io::Write;
use std::path::{Path, PathBuf};

use super::migrate::migrate;
use super::types::GlobalConfig;
use crate::config::ConfigError;

/// Loads and saves the single [`GlobalConfig`] blob.
///
/// Saves replace the file wholesale: the blob goes to a fresh temporary file
/// in the same directory, is synced, then renamed over the target.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Upper bound on the state file we are willing to read (64 MiB).
    const MAX_FILE_SIZE: u64 = 64 * 1_048_576;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads, migrates and deserializes the state blob.
    ///
    /// - Missing or empty file → defaults
    /// - Invalid JSON or wrong shape → file moved to `<path>.corrupt-<ts>`, defaults
    /// - Newer schema → `Err(ConfigError::UnsupportedVersion)`
    ///
    /// A blob that needed migration or id repair is saved back immediately so
    /// obsolete keys do not linger on disk.
    pub fn load(&self) -> Result<GlobalConfig, ConfigError> {
        let content = match std::fs::metadata(&self.path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "State file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Ok(_) => match std::fs::read_to_string(&self.path) {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(ConfigError::Io(e)),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %self.path.display(), "No saved state, using defaults");
            return Ok(GlobalConfig::default());
        }

        let (mut state, from_version) = match Self::decode(&content) {
            Ok(decoded) => decoded,
            Err(e @ ConfigError::UnsupportedVersion { .. }) => return Err(e),
            Err(e) => {
                let backup = self.quarantine()?;
                tracing::warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "State file unreadable, moved aside and starting from defaults"
                );
                return Ok(GlobalConfig::default());
            }
        };

        let repaired = state.ensure_unique_ids();
        if from_version < state.schema_version || repaired {
            self.save(&state)?;
        }

        tracing::info!(
            path = %self.path.display(),
            feeds = state.feeds.len(),
            "Loaded state"
        );
        Ok(state)
    }

    fn decode(content: &str) -> Result<(GlobalConfig, u32), ConfigError> {
        let mut raw: serde_json::Value = serde_json::from_str(content)?;
        let from_version = migrate(&mut raw)?;
        let state: GlobalConfig = serde_json::from_value(raw)?;
        Ok((state, from_version))
    }

    /// Renames the current file to `<path>.corrupt-<unix ts>`.
    fn quarantine(&self) -> Result<PathBuf, ConfigError> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{}", chrono::Utc::now().timestamp()));
        let backup = PathBuf::from(name);
        std::fs::rename(&self.path, &backup)?;
        Ok(backup)
    }

    /// Atomically replaces the state file with `state`.
    pub fn save(&self, state: &GlobalConfig) -> Result<(), ConfigError> {
        let json = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Unpredictable temp name; create_new refuses to follow a planted file
        let suffix = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(format!(".tmp.{:016x}", suffix));
        let temp_path = PathBuf::from(temp_name);

        let write = || -> std::io::Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
            std::fs::rename(&temp_path, &self.path)
        };

        write().map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            ConfigError::Io(e)
        })?;

        tracing::debug!(path = %self.path.display(), bytes = json.len(), "Saved state");
        Ok(())
    }
}
