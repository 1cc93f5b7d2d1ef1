// src/adapters/twitch.rs
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::OnceCell;

use super::{FeedAdapter, FeedItem, PresenceAdapter, StreamStatus};
use crate::error::{AuthError, FetchError};
use crate::token::{Token, TokenExchanger, TokenManager};

const DEFAULT_HELIX_URL: &str = "https://api.twitch.tv/helix";
const DEFAULT_OAUTH_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Client-credentials exchange against the Twitch id service.
pub struct TwitchTokenExchanger {
    client: Client,
    oauth_url: String,
    client_id: String,
    client_secret: String,
}

impl TwitchTokenExchanger {
    pub fn new(client: Client, client_id: String, client_secret: String) -> Self {
        Self {
            client,
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            client_id,
            client_secret,
        }
    }

    pub fn with_oauth_url(mut self, url: impl Into<String>) -> Self {
        self.oauth_url = url.into();
        self
    }
}

#[async_trait::async_trait]
impl TokenExchanger for TwitchTokenExchanger {
    async fn exchange(&self) -> Result<Token, AuthError> {
        let rsp = self
            .client
            .post(&self.oauth_url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        let status = rsp.status();
        let body: TokenResponse = rsp.json().await?;
        match body.access_token {
            Some(tok) => Ok(Token::new(tok)),
            None => Err(AuthError::Rejected {
                provider: self.client_id.clone(),
                message: format!("HTTP {status}: {}", body.message.unwrap_or_default()),
            }),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    message: Option<String>,
}

/// Shared Helix plumbing: authenticated GET with 401 -> invalidate + retryable
/// error, so the next tick re-exchanges.
///
/// Tokens are keyed by `client_id`: a bearer token is only valid together
/// with the Client-ID of the app that minted it, so feeds configured with
/// different Twitch apps must never share a cache entry.
struct HelixClient {
    client: Client,
    base_url: String,
    client_id: String,
    tokens: Arc<TokenManager>,
}

impl HelixClient {
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        provider: &'static str,
        path_and_query: &str,
    ) -> Result<T, FetchError> {
        let token = self.tokens.get(&self.client_id).await?;
        let url = format!("{}/{path_and_query}", self.base_url);
        let rsp = self
            .client
            .get(&url)
            .header("Client-ID", &self.client_id)
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        if rsp.status() == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate(&self.client_id).await;
            return Err(FetchError::Unauthorized { provider });
        }
        if !rsp.status().is_success() {
            return Err(FetchError::Status {
                provider,
                status: rsp.status().as_u16(),
            });
        }
        Ok(rsp.json().await?)
    }
}

/// Live status of one broadcaster via `helix/streams`.
pub struct TwitchStreamAdapter {
    helix: HelixClient,
    broadcaster_login: String,
}

impl TwitchStreamAdapter {
    pub fn new(
        client: Client,
        tokens: Arc<TokenManager>,
        client_id: String,
        broadcaster_login: String,
    ) -> Self {
        Self {
            helix: HelixClient {
                client,
                base_url: DEFAULT_HELIX_URL.to_string(),
                client_id,
                tokens,
            },
            broadcaster_login,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.helix.base_url = url.into();
        self
    }
}

#[async_trait::async_trait]
impl PresenceAdapter for TwitchStreamAdapter {
    async fn fetch_status(&self) -> Result<Option<StreamStatus>, FetchError> {
        let body: DataEnvelope<Stream> = self
            .helix
            .get_json(
                self.name(),
                &format!("streams?user_login={}", self.broadcaster_login),
            )
            .await?;
        Ok(body.data.into_iter().next().map(|s| StreamStatus {
            title: s.title,
            game: s.game_name,
            viewer_count: s.viewer_count,
            thumbnail_url: Some(expand_thumbnail(&s.thumbnail_url)),
        }))
    }

    fn name(&self) -> &'static str {
        "twitch-streams"
    }
}

/// Recent clips of one broadcaster via `helix/clips`. The broadcaster id is
/// resolved once from the login and cached for the life of the adapter.
pub struct TwitchClipsAdapter {
    helix: HelixClient,
    broadcaster_login: String,
    broadcaster_id: OnceCell<String>,
}

impl TwitchClipsAdapter {
    pub fn new(
        client: Client,
        tokens: Arc<TokenManager>,
        client_id: String,
        broadcaster_login: String,
    ) -> Self {
        Self {
            helix: HelixClient {
                client,
                base_url: DEFAULT_HELIX_URL.to_string(),
                client_id,
                tokens,
            },
            broadcaster_login,
            broadcaster_id: OnceCell::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.helix.base_url = url.into();
        self
    }

    async fn broadcaster_id(&self) -> Result<&str, FetchError> {
        self.broadcaster_id
            .get_or_try_init(|| async {
                let body: DataEnvelope<User> = self
                    .helix
                    .get_json(
                        self.name(),
                        &format!("users?login={}", self.broadcaster_login),
                    )
                    .await?;
                body.data
                    .into_iter()
                    .next()
                    .map(|u| u.id)
                    .ok_or_else(|| FetchError::Malformed {
                        provider: self.name(),
                        message: format!("no user for login {}", self.broadcaster_login),
                    })
            })
            .await
            .map(String::as_str)
    }
}

#[async_trait::async_trait]
impl FeedAdapter for TwitchClipsAdapter {
    async fn fetch_latest(&self) -> Result<Vec<FeedItem>, FetchError> {
        let broadcaster_id = self.broadcaster_id().await?;
        let body: DataEnvelope<Clip> = self
            .helix
            .get_json(
                self.name(),
                &format!("clips?broadcaster_id={broadcaster_id}&first=5"),
            )
            .await?;
        Ok(body
            .data
            .into_iter()
            .map(|c| FeedItem {
                id: c.id,
                title: c.title,
                link: Some(c.url),
                media_url: Some(c.thumbnail_url),
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "twitch-clips"
    }
}

/// Helix thumbnail URLs carry literal `{width}`/`{height}` placeholders.
fn expand_thumbnail(template: &str) -> String {
    template
        .replace("{width}", "1280")
        .replace("{height}", "720")
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct Stream {
    title: String,
    game_name: String,
    viewer_count: u64,
    thumbnail_url: String,
}

#[derive(Deserialize)]
struct User {
    id: String,
}

#[derive(Deserialize)]
struct Clip {
    id: String,
    title: String,
    url: String,
    thumbnail_url: String,
}
