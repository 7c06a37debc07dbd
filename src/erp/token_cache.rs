//! Storage for the ERP access token.
//!
//! The client never keeps the token itself; it asks an injected [`TokenCache`]
//! so that tests (or a shared store) can control the token lifetime.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Usable at `now` if it does not expire within `margin`.
    pub fn is_fresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

#[async_trait::async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self) -> Option<CachedToken>;
    async fn set(&self, token: CachedToken);
    async fn clear(&self);
}

/// Process-local token slot.
#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    slot: RwLock<Option<CachedToken>>,
}

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get(&self) -> Option<CachedToken> {
        self.slot.read().await.clone()
    }

    async fn set(&self, token: CachedToken) {
        *self.slot.write().await = Some(token);
    }

    async fn clear(&self) {
        self.slot.write().await.take();
    }
}
