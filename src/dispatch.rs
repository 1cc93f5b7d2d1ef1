// src/dispatch.rs
use metrics::counter;
use tracing::debug;

use crate::error::DeliveryError;

/// Discord embed titles cap at 256; Telegram is far above that, so one limit
/// serves both.
pub const MAX_TITLE_LEN: usize = 256;
const ELLIPSIS: char = '…';

/// Normalized notification content, platform-agnostic. Rendering decides how
/// each field lands on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyPayload {
    pub title: String,
    pub body: String,
    pub media_url: Option<String>,
    pub link: Option<String>,
}

/// What a transport actually delivers: truncated title, body, attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
    pub media_url: Option<String>,
    pub link: Option<String>,
}

/// Proof of delivery, carrying the remote message id for record-keeping.
#[derive(Debug, Clone)]
pub struct DeliveryHandle {
    pub message_id: String,
}

/// Capability: deliver one rendered message to one destination and return
/// the remote message id.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        destination: &str,
        message: &RenderedMessage,
    ) -> Result<String, DeliveryError>;
    fn name(&self) -> &'static str;
}

/// Renders payloads and delivers them through a transport. At-least-once from
/// the caller's perspective: a returned handle means the remote accepted the
/// message; an error means the item must stay eligible for retry.
pub struct Dispatcher {
    transport: Box<dyn Transport>,
}

impl Dispatcher {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn dispatch(
        &self,
        destination: &str,
        payload: &NotifyPayload,
    ) -> Result<DeliveryHandle, DeliveryError> {
        let message = render(payload);
        match self.transport.send(destination, &message).await {
            Ok(message_id) => {
                counter!("notify_sent_total").increment(1);
                debug!(
                    transport = self.transport.name(),
                    message_id, "notification delivered"
                );
                Ok(DeliveryHandle { message_id })
            }
            Err(e) => {
                counter!("notify_errors_total").increment(1);
                Err(e)
            }
        }
    }
}

fn render(payload: &NotifyPayload) -> RenderedMessage {
    RenderedMessage {
        title: truncate_title(&payload.title, MAX_TITLE_LEN),
        body: payload.body.clone(),
        media_url: payload.media_url.clone(),
        link: payload.link.clone(),
    }
}

/// Overlong titles are truncated with an ellipsis, never rejected.
pub fn truncate_title(title: &str, max: usize) -> String {
    if title.chars().count() <= max {
        return title.to_string();
    }
    let mut out: String = title.chars().take(max.saturating_sub(1)).collect();
    out.push(ELLIPSIS);
    out
}
