// src/transports/discord.rs
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::dispatch::{RenderedMessage, Transport};
use crate::error::DeliveryError;

/// Delivers through a Discord webhook. The destination is the webhook URL;
/// `?wait=true` makes Discord return the created message so we get its id.
#[derive(Clone)]
pub struct DiscordTransport {
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[async_trait::async_trait]
impl Transport for DiscordTransport {
    async fn send(
        &self,
        destination: &str,
        message: &RenderedMessage,
    ) -> Result<String, DeliveryError> {
        let payload = WebhookPayload::from_message(message);
        let url = format!("{destination}?wait=true");

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) if rsp.status().is_success() => {
                    let created: WebhookResponse =
                        rsp.json().await.map_err(|source| DeliveryError::Network {
                            transport: self.name(),
                            source,
                        })?;
                    return created
                        .id
                        .ok_or(DeliveryError::MissingMessageId {
                            transport: self.name(),
                        });
                }
                Ok(rsp) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(DeliveryError::Status {
                        transport: self.name(),
                        status: rsp.status().as_u16(),
                    });
                }
                Err(source) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(DeliveryError::Network {
                        transport: self.name(),
                        source,
                    });
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Serialize)]
struct Embed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage>,
}

#[derive(Serialize)]
struct EmbedImage {
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl WebhookPayload {
    fn from_message(message: &RenderedMessage) -> Self {
        Self {
            content: None,
            embeds: vec![Embed {
                title: message.title.clone(),
                description: message.body.clone(),
                url: message.link.clone(),
                image: message
                    .media_url
                    .clone()
                    .map(|url| EmbedImage { url }),
            }],
        }
    }
}

#[derive(Deserialize)]
struct WebhookResponse {
    id: Option<String>,
}
