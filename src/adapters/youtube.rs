// src/adapters/youtube.rs
use reqwest::Client;
use serde::Deserialize;

use super::{FeedAdapter, FeedItem};
use crate::error::FetchError;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const MAX_RESULTS: u8 = 5;

/// Latest uploads of one channel via the YouTube Data API v3 search endpoint,
/// newest first.
pub struct YoutubeAdapter {
    client: Client,
    base_url: String,
    channel_id: String,
    api_key: String,
}

impl YoutubeAdapter {
    pub fn new(client: Client, channel_id: String, api_key: String) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            channel_id,
            api_key,
        }
    }

    /// Point the adapter at a mock server in tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait::async_trait]
impl FeedAdapter for YoutubeAdapter {
    async fn fetch_latest(&self) -> Result<Vec<FeedItem>, FetchError> {
        let url = format!("{}/search", self.base_url);
        let max_results = MAX_RESULTS.to_string();
        let rsp = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("channelId", self.channel_id.as_str()),
                ("part", "snippet,id"),
                ("order", "date"),
                ("maxResults", max_results.as_str()),
            ])
            .send()
            .await?;
        if !rsp.status().is_success() {
            return Err(FetchError::Status {
                provider: self.name(),
                status: rsp.status().as_u16(),
            });
        }
        let body: SearchResponse = rsp.json().await?;

        let items = body
            .items
            .into_iter()
            .filter_map(|item| {
                // Search also returns playlists and channels; keep videos.
                let video_id = match item.id {
                    SearchId {
                        kind,
                        video_id: Some(id),
                    } if kind == "youtube#video" => id,
                    _ => return None,
                };
                let media_url = item
                    .snippet
                    .thumbnails
                    .and_then(|t| t.high)
                    .map(|t| t.url);
                Some(FeedItem {
                    link: Some(format!("https://www.youtube.com/watch?v={video_id}")),
                    id: video_id,
                    title: item.snippet.title,
                    media_url,
                })
            })
            .collect();
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "youtube"
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: Snippet,
}

#[derive(Deserialize)]
struct SearchId {
    kind: String,
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct Snippet {
    title: String,
    thumbnails: Option<Thumbnails>,
}

#[derive(Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}
