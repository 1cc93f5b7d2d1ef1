//! feed-herald — Binary Entrypoint
//! Loads feed configs, wires adapters, stores and transports, then runs the
//! poller scheduler until ctrl-c.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_herald::adapters::twitch::{TwitchClipsAdapter, TwitchStreamAdapter, TwitchTokenExchanger};
use feed_herald::adapters::{tiktok::TiktokAdapter, youtube::YoutubeAdapter};
use feed_herald::transports::{DiscordTransport, TelegramTransport};
use feed_herald::{
    DedupStore, Dispatcher, FeedConfig, ItemPoller, NotifyTarget, PresencePoller, PresenceStore,
    ReadyGate, Scheduler, SourceParams, TokenManager, TransportKind,
};

const ENV_STATE_DIR: &str = "HERALD_STATE_DIR";
const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_herald=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn state_dir() -> PathBuf {
    std::env::var(ENV_STATE_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn notify_target(kind: TransportKind) -> NotifyTarget {
    match kind {
        TransportKind::Discord => NotifyTarget::Discord,
        TransportKind::Telegram => NotifyTarget::Telegram,
    }
}

fn build_scheduler(feeds: Vec<FeedConfig>, state_dir: &Path) -> anyhow::Result<Scheduler> {
    let client = reqwest::Client::new();
    let dedup = Arc::new(DedupStore::open(state_dir.join("feeds")));
    let discord = DiscordTransport::new(client.clone());
    let telegram_token = std::env::var(ENV_TELEGRAM_TOKEN).ok();

    // One token cache entry per Twitch app: a token is only valid with the
    // Client-ID it was minted for, so each distinct client_id gets its own
    // exchanger.
    let mut manager = TokenManager::new();
    for feed in &feeds {
        if let SourceParams::TwitchStream {
            client_id,
            client_secret,
            ..
        }
        | SourceParams::TwitchClips {
            client_id,
            client_secret,
            ..
        } = &feed.source
        {
            manager.register(
                client_id.clone(),
                Arc::new(TwitchTokenExchanger::new(
                    client.clone(),
                    client_id.clone(),
                    client_secret.clone(),
                )),
            );
        }
    }
    let tokens = Arc::new(manager);

    // One presence document per stream source, shared across its pollers.
    let mut presence_stores: std::collections::HashMap<String, Arc<PresenceStore>> =
        std::collections::HashMap::new();

    let mut scheduler = Scheduler::new();
    for feed in feeds {
        let dispatcher = Arc::new(match feed.destination.transport {
            TransportKind::Discord => Dispatcher::new(Box::new(discord.clone())),
            TransportKind::Telegram => {
                let token = telegram_token.clone().with_context(|| {
                    format!(
                        "feed `{}` targets Telegram but {ENV_TELEGRAM_TOKEN} is not set",
                        feed.feed_id
                    )
                })?;
                Dispatcher::new(Box::new(TelegramTransport::new(client.clone(), token)))
            }
        });
        let destination = feed.destination.channel.clone();

        match &feed.source {
            SourceParams::Youtube {
                channel_id,
                api_key,
            } => {
                let adapter = Arc::new(YoutubeAdapter::new(
                    client.clone(),
                    channel_id.clone(),
                    api_key.clone(),
                ));
                scheduler.register(
                    feed.interval(),
                    Arc::new(ItemPoller::new(
                        &feed.feed_id,
                        adapter,
                        dedup.clone(),
                        dispatcher,
                        destination,
                    )),
                )?;
            }
            SourceParams::Tiktok { username } => {
                let adapter = Arc::new(TiktokAdapter::new(client.clone(), username.clone()));
                scheduler.register(
                    feed.interval(),
                    Arc::new(ItemPoller::new(
                        &feed.feed_id,
                        adapter,
                        dedup.clone(),
                        dispatcher,
                        destination,
                    )),
                )?;
            }
            SourceParams::TwitchClips {
                broadcaster_login,
                client_id,
                ..
            } => {
                let adapter = Arc::new(TwitchClipsAdapter::new(
                    client.clone(),
                    tokens.clone(),
                    client_id.clone(),
                    broadcaster_login.clone(),
                ));
                scheduler.register(
                    feed.interval(),
                    Arc::new(ItemPoller::new(
                        &feed.feed_id,
                        adapter,
                        dedup.clone(),
                        dispatcher,
                        destination,
                    )),
                )?;
            }
            SourceParams::TwitchStream {
                broadcaster_login,
                client_id,
                ..
            } => {
                let adapter = Arc::new(TwitchStreamAdapter::new(
                    client.clone(),
                    tokens.clone(),
                    client_id.clone(),
                    broadcaster_login.clone(),
                ));
                let presence = presence_stores
                    .entry(broadcaster_login.clone())
                    .or_insert_with(|| {
                        Arc::new(PresenceStore::open(
                            state_dir.join(format!("presence_{broadcaster_login}.json")),
                        ))
                    })
                    .clone();
                let target = notify_target(feed.destination.transport);
                scheduler.register(
                    feed.interval(),
                    Arc::new(PresencePoller::new(
                        &feed.feed_id,
                        adapter,
                        presence,
                        dispatcher,
                        destination,
                        target,
                        format!("https://twitch.tv/{broadcaster_login}"),
                        // Only the Discord poller posts the "ended" notice so
                        // shared sources do not announce it twice.
                        target == NotifyTarget::Discord,
                    )),
                )?;
            }
        }
    }
    Ok(scheduler)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config_dir = feed_herald::config::default_config_dir();
    let feeds = feed_herald::config::load_feed_dir(&config_dir)
        .with_context(|| format!("loading feed configs from {}", config_dir.display()))?;
    if feeds.is_empty() {
        bail!("no feed configs found in {}", config_dir.display());
    }
    info!(feeds = feeds.len(), "feed configs loaded");

    let state_dir = state_dir();
    let scheduler = build_scheduler(feeds, &state_dir)?;

    let gate = ReadyGate::new();
    let handle = scheduler.run(&gate);
    // Transports here are plain HTTP; there is no gateway session to wait
    // for, so the gate flips as soon as wiring is complete.
    gate.set_ready();
    info!("feed-herald running, ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("shutting down, letting in-flight ticks finish");
    handle.shutdown().await;
    Ok(())
}
