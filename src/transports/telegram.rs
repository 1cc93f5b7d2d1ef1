// src/transports/telegram.rs
use reqwest::Client;
use serde::Deserialize;

use crate::dispatch::{RenderedMessage, Transport};
use crate::error::DeliveryError;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Delivers through the Telegram Bot API. The destination is the chat id.
pub struct TelegramTransport {
    client: Client,
    base_url: String,
    bot_token: String,
}

impl TelegramTransport {
    pub fn new(client: Client, bot_token: String) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            bot_token,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn render_html(message: &RenderedMessage) -> String {
        let mut text = format!("<b>{}</b>", html_escape::encode_text(&message.title));
        if !message.body.is_empty() {
            text.push_str("\n\n");
            text.push_str(&html_escape::encode_text(&message.body));
        }
        if let Some(media) = &message.media_url {
            text.push_str(&format!(
                "\n<a href=\"{}\">Preview</a>",
                html_escape::encode_double_quoted_attribute(media)
            ));
        }
        if let Some(link) = &message.link {
            text.push_str(&format!(
                "\n<a href=\"{}\">Watch</a>",
                html_escape::encode_double_quoted_attribute(link)
            ));
        }
        text
    }
}

#[async_trait::async_trait]
impl Transport for TelegramTransport {
    async fn send(
        &self,
        destination: &str,
        message: &RenderedMessage,
    ) -> Result<String, DeliveryError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let body = serde_json::json!({
            "chat_id": destination,
            "text": Self::render_html(message),
            "parse_mode": "HTML",
            "disable_web_page_preview": false,
        });

        let rsp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| DeliveryError::Network {
                transport: self.name(),
                source,
            })?;
        if !rsp.status().is_success() {
            return Err(DeliveryError::Status {
                transport: self.name(),
                status: rsp.status().as_u16(),
            });
        }
        let sent: SendMessageResponse =
            rsp.json().await.map_err(|source| DeliveryError::Network {
                transport: self.name(),
                source,
            })?;
        sent.result
            .map(|r| r.message_id.to_string())
            .ok_or(DeliveryError::MissingMessageId {
                transport: self.name(),
            })
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[derive(Deserialize)]
struct SendMessageResponse {
    result: Option<SentMessage>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}
