// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const ENV_CONFIG_DIR: &str = "HERALD_CONFIG_DIR";
const DEFAULT_CONFIG_DIR: &str = "config";

/// Static per-feed configuration. Immutable after load; owned by the
/// scheduler for the life of the process.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub feed_id: String,
    /// Poll interval in seconds. Zero is rejected at registration.
    pub interval_secs: u64,
    pub source: SourceParams,
    pub destination: Destination,
}

impl FeedConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Platform-specific fetch parameters, tagged by `platform` in the document.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum SourceParams {
    Youtube {
        channel_id: String,
        api_key: String,
    },
    Tiktok {
        username: String,
    },
    TwitchStream {
        broadcaster_login: String,
        client_id: String,
        client_secret: String,
    },
    TwitchClips {
        broadcaster_login: String,
        client_id: String,
        client_secret: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Discord,
    Telegram,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Destination {
    pub transport: TransportKind,
    /// Channel id, chat id or webhook URL, depending on the transport.
    pub channel: String,
}

/// Load one feed config document. Format is chosen by extension.
pub fn load_feed_config(path: &Path) -> Result<FeedConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "json" => serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        "toml" => toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Load every `*.json` / `*.toml` document in a directory, one feed each.
/// A schema error in any file fails the whole load, naming the file.
pub fn load_feed_dir(dir: &Path) -> Result<Vec<FeedConfig>, ConfigError> {
    let mut feeds = Vec::new();
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|s| s.to_str()),
                Some("json") | Some("toml")
            )
        })
        .collect();
    paths.sort();
    for path in paths {
        feeds.push(load_feed_config(&path)?);
    }
    Ok(feeds)
}

/// Config directory: $HERALD_CONFIG_DIR, falling back to `config/`.
pub fn default_config_dir() -> PathBuf {
    std::env::var(ENV_CONFIG_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR))
}
