// src/error.rs
use std::path::PathBuf;

use thiserror::Error;

/// Fatal at load/registration time. A feed with a bad config never starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("feed `{0}` is already registered")]
    DuplicateFeed(String),
    #[error("feed `{0}` has a zero poll interval")]
    BadInterval(String),
    #[error("reading feed config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing feed config {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("feed config {path}: unsupported extension (expected .json or .toml)")]
    UnsupportedFormat { path: PathBuf },
}

/// Transient fetch failure; the tick aborts and is retried next interval.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected response from {provider}: {message}")]
    Malformed {
        provider: &'static str,
        message: String,
    },
    #[error("{provider} rejected the request with status {status}")]
    Status {
        provider: &'static str,
        status: u16,
    },
    #[error("{provider} rejected the cached credential")]
    Unauthorized { provider: &'static str },
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Credential exchange failure.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token exchange request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("token exchange for `{provider}` returned no access token: {message}")]
    Rejected { provider: String, message: String },
    #[error("no token exchanger registered for provider `{0}`")]
    UnknownProvider(String),
}

/// Delivery failure; the item stays un-recorded and eligible for retry.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request to {transport} failed: {source}")]
    Network {
        transport: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{transport} returned HTTP {status}")]
    Status {
        transport: &'static str,
        status: u16,
    },
    #[error("{transport} response carried no message id")]
    MissingMessageId { transport: &'static str },
}

/// The send already succeeded but record-keeping failed. Serious: risks one
/// duplicate on the next run. Never retried, never fatal to the process.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("writing state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("reading state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Everything a single poller tick can fail with. The scheduler maps each
/// variant to its log severity; no variant stops future ticks.
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
