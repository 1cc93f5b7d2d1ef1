// src/dedup.rs
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::PersistenceError;

/// On-disk form: one document per feed. Every field defaults so documents
/// written by older versions load without error.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct FeedStateDoc {
    #[serde(default)]
    seen_item_ids: Vec<String>,
    #[serde(default)]
    messages: Vec<MessageRecord>,
}

/// Audit record tying an announced item to the message it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub item_id: String,
    pub message_id: String,
    #[serde(default)]
    pub first_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct FeedState {
    seen: HashSet<String>,
    messages: Vec<MessageRecord>,
}

impl FeedState {
    fn from_doc(doc: FeedStateDoc) -> Self {
        Self {
            seen: doc.seen_item_ids.into_iter().collect(),
            messages: doc.messages,
        }
    }

    fn to_doc(&self) -> FeedStateDoc {
        let mut ids: Vec<String> = self.seen.iter().cloned().collect();
        ids.sort();
        FeedStateDoc {
            seen_item_ids: ids,
            messages: self.messages.clone(),
        }
    }
}

/// Durable record of which items have already been announced, one JSON file
/// per feed under a state directory. Append-only; records are never removed.
///
/// All mutation goes through one async lock, so overlapping ticks of
/// different feeds can never interleave a read-modify-write on the same file.
pub struct DedupStore {
    dir: PathBuf,
    inner: Mutex<HashMap<String, FeedState>>,
}

impl DedupStore {
    /// Open a store rooted at `dir`. Feed files load lazily on first touch.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn feed_path(&self, feed_id: &str) -> PathBuf {
        self.dir.join(format!("{feed_id}.json"))
    }

    /// Pure lookup: has this item already been announced for this feed?
    pub async fn is_new(&self, feed_id: &str, item_id: &str) -> Result<bool, PersistenceError> {
        let mut inner = self.inner.lock().await;
        let state = self.load_feed(&mut inner, feed_id).await?;
        Ok(!state.seen.contains(item_id))
    }

    /// Append a record and persist the feed document before returning.
    /// Call this only after the corresponding send has returned success.
    pub async fn record_announced(
        &self,
        feed_id: &str,
        item_id: &str,
        message_id: &str,
    ) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().await;
        let state = self.load_feed(&mut inner, feed_id).await?;
        if !state.seen.insert(item_id.to_string()) {
            // Already recorded; nothing to persist.
            return Ok(());
        }
        state.messages.push(MessageRecord {
            item_id: item_id.to_string(),
            message_id: message_id.to_string(),
            first_seen_at: Some(Utc::now()),
        });
        let doc = state.to_doc();
        let path = self.feed_path(feed_id);
        write_doc(&path, &doc).await
    }

    /// Number of recorded items for a feed. Used by tests and status logs.
    pub async fn seen_count(&self, feed_id: &str) -> Result<usize, PersistenceError> {
        let mut inner = self.inner.lock().await;
        let state = self.load_feed(&mut inner, feed_id).await?;
        Ok(state.seen.len())
    }

    async fn load_feed<'a>(
        &self,
        inner: &'a mut HashMap<String, FeedState>,
        feed_id: &str,
    ) -> Result<&'a mut FeedState, PersistenceError> {
        if !inner.contains_key(feed_id) {
            let path = self.feed_path(feed_id);
            let state = match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let doc: FeedStateDoc = serde_json::from_slice(&bytes).map_err(|e| {
                        // A corrupt document must not silently become an empty
                        // one: that would re-announce the entire history.
                        PersistenceError::Corrupt {
                            path: path.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    FeedState::from_doc(doc)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(feed = feed_id, "no persisted state, starting empty");
                    FeedState::default()
                }
                Err(source) => return Err(PersistenceError::Read { path, source }),
            };
            inner.insert(feed_id.to_string(), state);
        }
        Ok(inner.get_mut(feed_id).unwrap())
    }
}

/// Write the document via a temp file and rename, so a crash mid-write can
/// never leave a truncated state file behind.
async fn write_doc(path: &Path, doc: &FeedStateDoc) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(doc).map_err(|e| PersistenceError::Corrupt {
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
