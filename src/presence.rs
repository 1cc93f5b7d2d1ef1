// src/presence.rs
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::PersistenceError;

/// Downstream target with its own "already told" flag. Targets transition
/// independently and must never share a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyTarget {
    Discord,
    Telegram,
}

/// Shared live/offline state for one stream source. Persisted after every
/// transition; fields default so old documents load cleanly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StreamPresence {
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub discord_notified: bool,
    #[serde(default)]
    pub telegram_notified: bool,
}

impl StreamPresence {
    pub fn notified(&self, target: NotifyTarget) -> bool {
        match target {
            NotifyTarget::Discord => self.discord_notified,
            NotifyTarget::Telegram => self.telegram_notified,
        }
    }

    fn set_notified(&mut self, target: NotifyTarget) {
        match target {
            NotifyTarget::Discord => self.discord_notified = true,
            NotifyTarget::Telegram => self.telegram_notified = true,
        }
    }
}

/// One presence document shared by every poller watching the same source.
/// Updates are field-level under the store lock: a Discord poller setting its
/// flag can never clobber the Telegram poller's.
pub struct PresenceStore {
    path: PathBuf,
    inner: Mutex<Option<StreamPresence>>,
}

impl PresenceStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(None),
        }
    }

    /// Has this target already announced the current live episode?
    pub async fn target_notified(&self, target: NotifyTarget) -> Result<bool, PersistenceError> {
        let mut inner = self.inner.lock().await;
        let state = load_if_needed(&self.path, &mut inner).await?;
        Ok(state.notified(target))
    }

    pub async fn is_live(&self) -> Result<bool, PersistenceError> {
        let mut inner = self.inner.lock().await;
        let state = load_if_needed(&self.path, &mut inner).await?;
        Ok(state.is_live)
    }

    /// OFFLINE -> LIVE for one target: set `is_live` and only that target's
    /// flag, then persist. Call only after the "started" send succeeded.
    pub async fn mark_started(&self, target: NotifyTarget) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().await;
        let state = load_if_needed(&self.path, &mut inner).await?;
        state.is_live = true;
        state.set_notified(target);
        let snapshot = *state;
        persist(&self.path, &snapshot).await?;
        info!(?target, "stream marked live");
        Ok(())
    }

    /// LIVE -> OFFLINE: reset every flag together, priming the machine for
    /// the next episode, then persist.
    pub async fn mark_offline(&self) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().await;
        let state = load_if_needed(&self.path, &mut inner).await?;
        *state = StreamPresence::default();
        let snapshot = *state;
        persist(&self.path, &snapshot).await?;
        info!("stream marked offline");
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<StreamPresence, PersistenceError> {
        let mut inner = self.inner.lock().await;
        let state = load_if_needed(&self.path, &mut inner).await?;
        Ok(*state)
    }
}

async fn load_if_needed<'a>(
    path: &Path,
    inner: &'a mut Option<StreamPresence>,
) -> Result<&'a mut StreamPresence, PersistenceError> {
    if inner.is_none() {
        let state = match tokio::fs::read(path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Corrupt {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no presence file, starting offline");
                StreamPresence::default()
            }
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        *inner = Some(state);
    }
    Ok(inner.as_mut().unwrap())
}

async fn persist(path: &Path, state: &StreamPresence) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(state).map_err(|e| PersistenceError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| PersistenceError::Write {
                path: path.to_path_buf(),
                source,
            })?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|source| PersistenceError::Write {
            path: tmp.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| PersistenceError::Write {
            path: path.to_path_buf(),
            source,
        })
}
