// src/adapters/mod.rs
pub mod tiktok;
pub mod twitch;
pub mod youtube;

use crate::error::FetchError;

/// One candidate item returned by a platform API, newest first.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub link: Option<String>,
    pub media_url: Option<String>,
}

/// Snapshot of a live stream, present only while the source is on air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStatus {
    pub title: String,
    pub game: String,
    pub viewer_count: u64,
    pub thumbnail_url: Option<String>,
}

/// Capability: fetch the latest candidate items for one feed.
#[async_trait::async_trait]
pub trait FeedAdapter: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<FeedItem>, FetchError>;
    fn name(&self) -> &'static str;
}

/// Capability: report whether a stream source is currently live.
#[async_trait::async_trait]
pub trait PresenceAdapter: Send + Sync {
    async fn fetch_status(&self) -> Result<Option<StreamStatus>, FetchError>;
    fn name(&self) -> &'static str;
}
