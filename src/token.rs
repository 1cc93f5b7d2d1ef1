// src/token.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::AuthError;

/// A bearer credential as handed out by a provider's token endpoint.
/// Lives in memory only; never written to disk.
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: String,
    pub fetched_at: DateTime<Utc>,
}

impl Token {
    pub fn new(access_token: String) -> Self {
        Self {
            access_token,
            fetched_at: Utc::now(),
        }
    }
}

/// Capability: perform the actual credential exchange for one provider.
#[async_trait::async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self) -> Result<Token, AuthError>;
}

/// Lazily acquires and caches one token per provider. Shared by every poller
/// that talks to the same provider; safe under concurrent get/invalidate.
pub struct TokenManager {
    exchangers: HashMap<String, Arc<dyn TokenExchanger>>,
    cache: RwLock<HashMap<String, Token>>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self {
            exchangers: HashMap::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&mut self, provider_id: impl Into<String>, ex: Arc<dyn TokenExchanger>) {
        self.exchangers.insert(provider_id.into(), ex);
    }

    /// Cached token if present, otherwise exchange and cache.
    pub async fn get(&self, provider_id: &str) -> Result<Token, AuthError> {
        if let Some(tok) = self.cache.read().await.get(provider_id) {
            return Ok(tok.clone());
        }
        let ex = self
            .exchangers
            .get(provider_id)
            .ok_or_else(|| AuthError::UnknownProvider(provider_id.to_string()))?;
        let tok = ex.exchange().await?;
        info!(provider = provider_id, "acquired fresh token");
        self.cache
            .write()
            .await
            .insert(provider_id.to_string(), tok.clone());
        Ok(tok)
    }

    /// Drop the cached entry so the next `get` re-exchanges. Called by
    /// adapters when the provider rejects the cached credential.
    pub async fn invalidate(&self, provider_id: &str) {
        if self.cache.write().await.remove(provider_id).is_some() {
            debug!(provider = provider_id, "token invalidated");
        }
    }
}

impl Default for TokenManager {
    fn default() -> Self {
        Self::new()
    }
}
