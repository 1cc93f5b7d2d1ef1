// src/adapters/tiktok.rs
use reqwest::Client;
use serde::Deserialize;

use super::{FeedAdapter, FeedItem};
use crate::error::FetchError;

const DEFAULT_BASE_URL: &str = "https://www.tikwm.com/api";

/// Latest posts of one TikTok account via the TikWM mirror API.
pub struct TiktokAdapter {
    client: Client,
    base_url: String,
    username: String,
}

impl TiktokAdapter {
    pub fn new(client: Client, username: String) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            username,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait::async_trait]
impl FeedAdapter for TiktokAdapter {
    async fn fetch_latest(&self) -> Result<Vec<FeedItem>, FetchError> {
        let url = format!("{}/user/posts", self.base_url);
        let rsp = self
            .client
            .get(&url)
            .query(&[("unique_id", self.username.as_str())])
            .send()
            .await?;
        if !rsp.status().is_success() {
            return Err(FetchError::Status {
                provider: self.name(),
                status: rsp.status().as_u16(),
            });
        }
        let body: PostsResponse = rsp.json().await?;
        // TikWM signals failure in the body, not the HTTP status.
        if body.code != 0 {
            return Err(FetchError::Malformed {
                provider: self.name(),
                message: format!("code {}: {}", body.code, body.msg),
            });
        }

        let items = body
            .data
            .map(|d| d.videos)
            .unwrap_or_default()
            .into_iter()
            .map(|v| FeedItem {
                link: Some(format!(
                    "https://www.tiktok.com/@{}/video/{}",
                    self.username, v.video_id
                )),
                id: v.video_id,
                title: v.title,
                media_url: Some(v.cover),
            })
            .collect();
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "tiktok"
    }
}

#[derive(Deserialize)]
struct PostsResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<PostsData>,
}

#[derive(Deserialize)]
struct PostsData {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Deserialize)]
struct Video {
    video_id: String,
    title: String,
    cover: String,
}
