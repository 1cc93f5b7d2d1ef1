// tests/presence_flow.rs
// Live/offline transition behavior: per-target debounce, shared state across
// pollers, reset on stream end, and retry when the "started" send fails.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use feed_herald::adapters::{PresenceAdapter, StreamStatus};
use feed_herald::dispatch::RenderedMessage;
use feed_herald::{
    DeliveryError, Dispatcher, FetchError, NotifyTarget, PollTask, PresencePoller, PresenceStore,
    Transport,
};

struct ScriptedStatus {
    live: AtomicBool,
}

impl ScriptedStatus {
    fn new(live: bool) -> Arc<Self> {
        Arc::new(Self {
            live: AtomicBool::new(live),
        })
    }

    fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl PresenceAdapter for ScriptedStatus {
    async fn fetch_status(&self) -> Result<Option<StreamStatus>, FetchError> {
        Ok(self.live.load(Ordering::SeqCst).then(|| StreamStatus {
            title: "Speedrun".to_string(),
            game: "Tetris".to_string(),
            viewer_count: 42,
            thumbnail_url: None,
        }))
    }
    fn name(&self) -> &'static str {
        "scripted-status"
    }
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<RenderedMessage>>,
    fail_remaining: AtomicUsize,
    next_id: AtomicUsize,
}

impl RecordingTransport {
    fn titles(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.title.clone()).collect()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        _destination: &str,
        message: &RenderedMessage,
    ) -> Result<String, DeliveryError> {
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(DeliveryError::Status {
                transport: "recording",
                status: 502,
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
    fn name(&self) -> &'static str {
        "recording"
    }
}

struct ArcTransport(Arc<RecordingTransport>);

#[async_trait::async_trait]
impl Transport for ArcTransport {
    async fn send(
        &self,
        destination: &str,
        message: &RenderedMessage,
    ) -> Result<String, DeliveryError> {
        self.0.send(destination, message).await
    }
    fn name(&self) -> &'static str {
        self.0.name()
    }
}

fn poller(
    feed_id: &str,
    adapter: Arc<ScriptedStatus>,
    presence: Arc<PresenceStore>,
    transport: Arc<RecordingTransport>,
    target: NotifyTarget,
    announce_end: bool,
) -> PresencePoller {
    PresencePoller::new(
        feed_id,
        adapter,
        presence,
        Arc::new(Dispatcher::new(Box::new(ArcTransport(transport)))),
        "chan",
        target,
        "https://twitch.tv/pika_dev",
        announce_end,
    )
}

#[tokio::test]
async fn repeated_live_polls_notify_once_per_target() {
    let dir = tempfile::tempdir().unwrap();
    let status = ScriptedStatus::new(true);
    let presence = Arc::new(PresenceStore::open(dir.path().join("p.json")));
    let transport = Arc::new(RecordingTransport::default());
    let p = poller(
        "twitch-discord",
        status,
        presence,
        transport.clone(),
        NotifyTarget::Discord,
        true,
    );

    for _ in 0..5 {
        p.tick().await.unwrap();
    }
    assert_eq!(transport.titles(), vec!["Speedrun"]);
}

#[tokio::test]
async fn offline_then_live_again_notifies_once_more() {
    let dir = tempfile::tempdir().unwrap();
    let status = ScriptedStatus::new(true);
    let presence = Arc::new(PresenceStore::open(dir.path().join("p.json")));
    let transport = Arc::new(RecordingTransport::default());
    let p = poller(
        "twitch-discord",
        status.clone(),
        presence,
        transport.clone(),
        NotifyTarget::Discord,
        true,
    );

    p.tick().await.unwrap();
    status.set_live(false);
    p.tick().await.unwrap();
    status.set_live(true);
    p.tick().await.unwrap();

    assert_eq!(
        transport.titles(),
        vec!["Speedrun", "Stream ended", "Speedrun"]
    );
}

#[tokio::test]
async fn targets_share_state_but_flag_independently() {
    let dir = tempfile::tempdir().unwrap();
    let status = ScriptedStatus::new(true);
    let presence = Arc::new(PresenceStore::open(dir.path().join("p.json")));
    let discord_tx = Arc::new(RecordingTransport::default());
    let telegram_tx = Arc::new(RecordingTransport::default());
    let discord = poller(
        "twitch-discord",
        status.clone(),
        presence.clone(),
        discord_tx.clone(),
        NotifyTarget::Discord,
        true,
    );
    let telegram = poller(
        "twitch-telegram",
        status.clone(),
        presence.clone(),
        telegram_tx.clone(),
        NotifyTarget::Telegram,
        false,
    );

    // Discord notices first; the Telegram poller still owes its channel one.
    discord.tick().await.unwrap();
    assert_eq!(discord_tx.titles().len(), 1);
    assert_eq!(telegram_tx.titles().len(), 0);

    telegram.tick().await.unwrap();
    assert_eq!(telegram_tx.titles().len(), 1);

    // Both settled for this episode.
    discord.tick().await.unwrap();
    telegram.tick().await.unwrap();
    assert_eq!(discord_tx.titles().len(), 1);
    assert_eq!(telegram_tx.titles().len(), 1);

    // Stream ends: only the end-announcing poller posts, both flags reset.
    status.set_live(false);
    discord.tick().await.unwrap();
    telegram.tick().await.unwrap();
    assert_eq!(discord_tx.titles(), vec!["Speedrun", "Stream ended"]);
    assert_eq!(telegram_tx.titles().len(), 1);

    status.set_live(true);
    telegram.tick().await.unwrap();
    assert_eq!(telegram_tx.titles().len(), 2);
}

#[tokio::test]
async fn failed_start_notice_is_retried_next_tick() {
    let dir = tempfile::tempdir().unwrap();
    let status = ScriptedStatus::new(true);
    let presence = Arc::new(PresenceStore::open(dir.path().join("p.json")));
    let transport = Arc::new(RecordingTransport::default());
    let p = poller(
        "twitch-discord",
        status,
        presence.clone(),
        transport.clone(),
        NotifyTarget::Discord,
        true,
    );

    transport.fail_remaining.store(1, Ordering::SeqCst);
    assert!(p.tick().await.is_err());
    // Flag must not be set after a failed send.
    assert!(!presence.target_notified(NotifyTarget::Discord).await.unwrap());

    p.tick().await.unwrap();
    assert_eq!(transport.titles(), vec!["Speedrun"]);
}

#[tokio::test]
async fn failed_end_notice_still_resets_state() {
    let dir = tempfile::tempdir().unwrap();
    let status = ScriptedStatus::new(true);
    let presence = Arc::new(PresenceStore::open(dir.path().join("p.json")));
    let transport = Arc::new(RecordingTransport::default());
    let p = poller(
        "twitch-discord",
        status.clone(),
        presence.clone(),
        transport.clone(),
        NotifyTarget::Discord,
        true,
    );

    p.tick().await.unwrap();
    status.set_live(false);
    transport.fail_remaining.store(1, Ordering::SeqCst);
    // Best effort: the tick itself succeeds and the machine goes offline.
    p.tick().await.unwrap();
    assert!(!presence.is_live().await.unwrap());

    status.set_live(true);
    p.tick().await.unwrap();
    assert_eq!(transport.titles(), vec!["Speedrun", "Speedrun"]);
}
