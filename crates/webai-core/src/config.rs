//! Persisted configuration store.
//!
//! JSON on disk, one file, atomic writes (temp + rename). Concurrent writers
//! (admin updates, the cookie rotation persister) serialize through a single
//! async mutex so read-modify-write cycles never lose updates.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub const CONFIG_PATH_ENV: &str = "WEBAI_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Application configuration as persisted on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Master switch for the upstream client.
    pub gemini_enabled: bool,
    /// Allow falling back to browser-derived cookies when no credentials are configured.
    pub browser_cookie_fallback: bool,
    /// Persisted session cookie: `__Secure-1PSID`.
    pub cookie_1psid: String,
    /// Persisted session cookie: `__Secure-1PSIDTS` (rotated by the upstream).
    pub cookie_1psidts: String,
    /// Outbound proxy URL; empty string means direct connection.
    pub http_proxy: String,
    /// Default model name used when a request omits one.
    pub default_model: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_enabled: true,
            browser_cookie_fallback: true,
            cookie_1psid: String::new(),
            cookie_1psidts: String::new(),
            http_proxy: String::new(),
            default_model: "gemini-3.0-flash".to_string(),
        }
    }
}

impl AppConfig {
    /// Proxy URL, with empty string normalized to "no proxy".
    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        let trimmed = self.http_proxy.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }
}

/// File-backed configuration store with serialized writers.
pub struct ConfigStore {
    path: PathBuf,
    inner: Mutex<AppConfig>,
}

impl ConfigStore {
    /// Load the store from `path`, creating defaults when the file is missing.
    pub async fn load(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let config = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| AppError::Config(format!("Failed to parse {}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Config file {} not found, using defaults", path.display());
                AppConfig::default()
            },
            Err(e) => return Err(AppError::Io(e)),
        };
        Ok(Self { path, inner: Mutex::new(config) })
    }

    /// Resolve the config path from `WEBAI_CONFIG_PATH` or the default location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var(CONFIG_PATH_ENV) {
            if !p.trim().is_empty() {
                return PathBuf::from(p);
            }
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration snapshot.
    pub async fn snapshot(&self) -> AppConfig {
        self.inner.lock().await.clone()
    }

    /// Read-modify-write under the store lock, then persist with one atomic write.
    pub async fn update<F>(&self, updater: F) -> AppResult<AppConfig>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self.inner.lock().await;
        updater(&mut guard);
        let snapshot = guard.clone();
        atomic_write(&self.path, &snapshot).await?;
        Ok(snapshot)
    }
}

/// Atomic write: serialize to a temp file next to the target, then rename.
async fn atomic_write(path: &Path, config: &AppConfig) -> AppResult<()> {
    let content = serde_json::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, content).await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::load(dir.path().join("config.json")).await.expect("load");
        let cfg = store.snapshot().await;
        assert!(cfg.gemini_enabled);
        assert_eq!(cfg.default_model, "gemini-3.0-flash");
        assert_eq!(cfg.proxy(), None);
    }

    #[tokio::test]
    async fn test_update_persists_and_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");

        {
            let store = ConfigStore::load(&path).await.expect("load");
            store
                .update(|cfg| {
                    cfg.cookie_1psid = "psid-value".to_string();
                    cfg.http_proxy = "socks5://127.0.0.1:1080".to_string();
                })
                .await
                .expect("update");
        }

        let reloaded = ConfigStore::load(&path).await.expect("reload");
        let cfg = reloaded.snapshot().await;
        assert_eq!(cfg.cookie_1psid, "psid-value");
        assert_eq!(cfg.proxy(), Some("socks5://127.0.0.1:1080"));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{not json").await.expect("write");
        assert!(ConfigStore::load(&path).await.is_err());
    }
}
