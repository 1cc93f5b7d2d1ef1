// src/poller.rs
use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use crate::adapters::{FeedAdapter, FeedItem, PresenceAdapter, StreamStatus};
use crate::dedup::DedupStore;
use crate::dispatch::{Dispatcher, NotifyPayload};
use crate::error::TickError;
use crate::presence::{NotifyTarget, PresenceStore};
use crate::scheduler::PollTask;

/// Announces items a feed has not produced before.
///
/// Tick: fetch -> drop already-seen -> dispatch oldest-first, recording each
/// item durably right after its send succeeds. A delivery or persistence
/// failure stops the tick; unsent items stay new and are retried next tick.
pub struct ItemPoller {
    feed_id: String,
    adapter: Arc<dyn FeedAdapter>,
    store: Arc<DedupStore>,
    dispatcher: Arc<Dispatcher>,
    destination: String,
}

impl ItemPoller {
    pub fn new(
        feed_id: impl Into<String>,
        adapter: Arc<dyn FeedAdapter>,
        store: Arc<DedupStore>,
        dispatcher: Arc<Dispatcher>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            feed_id: feed_id.into(),
            adapter,
            store,
            dispatcher,
            destination: destination.into(),
        }
    }

    fn payload(item: &FeedItem) -> NotifyPayload {
        NotifyPayload {
            title: item.title.clone(),
            body: item
                .link
                .clone()
                .map(|l| format!("Watch now: {l}"))
                .unwrap_or_default(),
            media_url: item.media_url.clone(),
            link: item.link.clone(),
        }
    }
}

#[async_trait::async_trait]
impl PollTask for ItemPoller {
    async fn tick(&self) -> Result<(), TickError> {
        let items = self.adapter.fetch_latest().await?;

        let mut fresh = Vec::new();
        for item in items {
            if self.store.is_new(&self.feed_id, &item.id).await? {
                fresh.push(item);
            } else {
                counter!("dedup_hits_total").increment(1);
            }
        }
        if fresh.is_empty() {
            return Ok(());
        }

        // APIs return newest first; deliver oldest first so channel history
        // reads chronologically.
        for item in fresh.iter().rev() {
            let handle = self
                .dispatcher
                .dispatch(&self.destination, &Self::payload(item))
                .await?;
            self.store
                .record_announced(&self.feed_id, &item.id, &handle.message_id)
                .await?;
            info!(feed = %self.feed_id, item = %item.id, "item announced");
        }
        Ok(())
    }

    fn feed_id(&self) -> &str {
        &self.feed_id
    }
}

/// Drives the live/offline machine for one downstream target.
pub struct PresencePoller {
    feed_id: String,
    adapter: Arc<dyn PresenceAdapter>,
    presence: Arc<PresenceStore>,
    dispatcher: Arc<Dispatcher>,
    destination: String,
    target: NotifyTarget,
    stream_url: String,
    /// Only one of the pollers sharing a source announces stream end.
    announce_end: bool,
}

impl PresencePoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feed_id: impl Into<String>,
        adapter: Arc<dyn PresenceAdapter>,
        presence: Arc<PresenceStore>,
        dispatcher: Arc<Dispatcher>,
        destination: impl Into<String>,
        target: NotifyTarget,
        stream_url: impl Into<String>,
        announce_end: bool,
    ) -> Self {
        Self {
            feed_id: feed_id.into(),
            adapter,
            presence,
            dispatcher,
            destination: destination.into(),
            target,
            stream_url: stream_url.into(),
            announce_end,
        }
    }

    fn started_payload(&self, status: &StreamStatus) -> NotifyPayload {
        NotifyPayload {
            title: status.title.clone(),
            body: format!(
                "Live now: {} · {} viewers\n{}",
                status.game, status.viewer_count, self.stream_url
            ),
            media_url: status.thumbnail_url.clone(),
            link: Some(self.stream_url.clone()),
        }
    }

    fn ended_payload(&self) -> NotifyPayload {
        NotifyPayload {
            title: "Stream ended".to_string(),
            body: self.stream_url.clone(),
            media_url: None,
            link: Some(self.stream_url.clone()),
        }
    }
}

#[async_trait::async_trait]
impl PollTask for PresencePoller {
    async fn tick(&self) -> Result<(), TickError> {
        match self.adapter.fetch_status().await? {
            Some(status) => {
                // Same episode, already told this target: nothing to do.
                if self.presence.target_notified(self.target).await? {
                    return Ok(());
                }
                let handle = self
                    .dispatcher
                    .dispatch(&self.destination, &self.started_payload(&status))
                    .await?;
                self.presence.mark_started(self.target).await?;
                info!(
                    feed = %self.feed_id,
                    message_id = %handle.message_id,
                    "stream start announced"
                );
            }
            None => {
                if !self.presence.is_live().await? {
                    return Ok(());
                }
                if self.announce_end {
                    // Best effort, not flag-gated: a missed "ended" notice is
                    // acceptable, a stuck LIVE state is not.
                    if let Err(e) = self
                        .dispatcher
                        .dispatch(&self.destination, &self.ended_payload())
                        .await
                    {
                        warn!(feed = %self.feed_id, error = ?e, "stream end notice failed");
                    }
                }
                self.presence.mark_offline().await?;
            }
        }
        Ok(())
    }

    fn feed_id(&self) -> &str {
        &self.feed_id
    }
}
