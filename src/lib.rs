// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod adapters;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod poller;
pub mod presence;
pub mod scheduler;
pub mod token;
pub mod transports;

// ---- Re-exports for stable public API ----
pub use crate::config::{Destination, FeedConfig, SourceParams, TransportKind};
pub use crate::dedup::DedupStore;
pub use crate::dispatch::{DeliveryHandle, Dispatcher, NotifyPayload, Transport};
pub use crate::error::{
    AuthError, ConfigError, DeliveryError, FetchError, PersistenceError, TickError,
};
pub use crate::poller::{ItemPoller, PresencePoller};
pub use crate::presence::{NotifyTarget, PresenceStore, StreamPresence};
pub use crate::scheduler::{PollTask, ReadyGate, Scheduler, SchedulerHandle};
pub use crate::token::{Token, TokenExchanger, TokenManager};
