// tests/poller_pipeline.rs
// End-to-end properties of the item pipeline: oldest-first ordering, durable
// dedup across ticks and restarts, and retry after failed delivery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use feed_herald::adapters::{FeedAdapter, FeedItem};
use feed_herald::dispatch::RenderedMessage;
use feed_herald::{
    DedupStore, DeliveryError, Dispatcher, FetchError, ItemPoller, PollTask, TickError, Transport,
};

struct ScriptedFeed {
    items: Mutex<Vec<FeedItem>>,
}

impl ScriptedFeed {
    fn new(items: Vec<FeedItem>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(items),
        })
    }

    fn set(&self, items: Vec<FeedItem>) {
        *self.items.lock().unwrap() = items;
    }
}

#[async_trait::async_trait]
impl FeedAdapter for ScriptedFeed {
    async fn fetch_latest(&self) -> Result<Vec<FeedItem>, FetchError> {
        Ok(self.items.lock().unwrap().clone())
    }
    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct RecordingTransport {
    sent: Mutex<Vec<(String, RenderedMessage)>>,
    calls: AtomicUsize,
    fail_call: AtomicUsize,
    fail_remaining: AtomicUsize,
    next_id: AtomicUsize,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            fail_call: AtomicUsize::new(usize::MAX),
            fail_remaining: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl RecordingTransport {
    fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Fail exactly the `n`th send (zero-based), once.
    fn fail_on_call(&self, n: usize) {
        self.fail_call.store(n, Ordering::SeqCst);
    }

    fn sent_titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.title.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        destination: &str,
        message: &RenderedMessage,
    ) -> Result<String, DeliveryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let fail_this = call == self.fail_call.load(Ordering::SeqCst)
            || self
                .fail_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if fail_this {
            return Err(DeliveryError::Status {
                transport: "recording",
                status: 503,
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), message.clone()));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("msg-{id}"))
    }
    fn name(&self) -> &'static str {
        "recording"
    }
}

fn item(id: &str, title: &str) -> FeedItem {
    FeedItem {
        id: id.to_string(),
        title: title.to_string(),
        link: Some(format!("https://example.test/{id}")),
        media_url: None,
    }
}

struct Rig {
    feed: Arc<ScriptedFeed>,
    transport: Arc<RecordingTransport>,
    poller: ItemPoller,
    _dir: tempfile::TempDir,
}

fn rig(items: Vec<FeedItem>) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let feed = ScriptedFeed::new(items);
    let transport = Arc::new(RecordingTransport::default());
    let store = Arc::new(DedupStore::open(dir.path()));
    let poller = ItemPoller::new(
        "feed-x",
        feed.clone(),
        store,
        Arc::new(Dispatcher::new(Box::new(ArcTransport(transport.clone())))),
        "chan-1",
    );
    Rig {
        feed,
        transport,
        poller,
        _dir: dir,
    }
}

// Dispatcher owns its transport; keep a handle for assertions.
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

#[tokio::test]
async fn unseen_items_dispatch_oldest_first() {
    // API order: A newest, C oldest.
    let r = rig(vec![item("a", "A"), item("b", "B"), item("c", "C")]);
    r.poller.tick().await.unwrap();
    assert_eq!(r.transport.sent_titles(), vec!["C", "B", "A"]);
}

#[tokio::test]
async fn second_tick_announces_nothing_new() {
    let r = rig(vec![item("a", "A"), item("b", "B")]);
    r.poller.tick().await.unwrap();
    r.poller.tick().await.unwrap();
    assert_eq!(r.transport.sent_titles().len(), 2);
}

#[tokio::test]
async fn only_fresh_items_announce_when_feed_grows() {
    let r = rig(vec![item("a", "A")]);
    r.poller.tick().await.unwrap();
    r.feed.set(vec![item("b", "B"), item("a", "A")]);
    r.poller.tick().await.unwrap();
    assert_eq!(r.transport.sent_titles(), vec!["A", "B"]);
}

#[tokio::test]
async fn failed_delivery_leaves_item_eligible_for_retry() {
    let r = rig(vec![item("a", "A")]);
    r.transport.fail_next(1);
    let err = r.poller.tick().await.unwrap_err();
    assert!(matches!(err, TickError::Delivery(_)));
    assert!(r.transport.sent_titles().is_empty());

    // Transient failure cleared: item is still new and goes out.
    r.poller.tick().await.unwrap();
    assert_eq!(r.transport.sent_titles(), vec!["A"]);
}

#[tokio::test]
async fn delivery_failure_mid_batch_keeps_unsent_items_new() {
    let r = rig(vec![item("a", "A"), item("b", "B"), item("c", "C")]);
    // Oldest (C) succeeds, then the send for B fails; the tick stops there.
    r.transport.fail_on_call(1);
    let err = r.poller.tick().await.unwrap_err();
    assert!(matches!(err, TickError::Delivery(_)));
    assert_eq!(r.transport.sent_titles(), vec!["C"]);

    // Next tick re-delivers only the unrecorded items, still oldest first.
    r.poller.tick().await.unwrap();
    assert_eq!(r.transport.sent_titles(), vec!["C", "B", "A"]);
}

#[tokio::test]
async fn restart_does_not_reannounce_recorded_items() {
    let dir = tempfile::tempdir().unwrap();
    let feed = ScriptedFeed::new(vec![item("a", "A"), item("b", "B")]);
    let transport = Arc::new(RecordingTransport::default());
    {
        let store = Arc::new(DedupStore::open(dir.path()));
        let poller = ItemPoller::new(
            "feed-x",
            feed.clone(),
            store,
            Arc::new(Dispatcher::new(Box::new(ArcTransport(transport.clone())))),
            "chan-1",
        );
        poller.tick().await.unwrap();
    }
    // Fresh process, same state directory.
    let store = Arc::new(DedupStore::open(dir.path()));
    let poller = ItemPoller::new(
        "feed-x",
        feed,
        store,
        Arc::new(Dispatcher::new(Box::new(ArcTransport(transport.clone())))),
        "chan-1",
    );
    poller.tick().await.unwrap();
    assert_eq!(transport.sent_titles().len(), 2);
}

#[tokio::test]
async fn destination_is_passed_through_to_the_transport() {
    let r = rig(vec![item("a", "A")]);
    r.poller.tick().await.unwrap();
    let sent = r.transport.sent.lock().unwrap();
    assert_eq!(sent[0].0, "chan-1");
}
