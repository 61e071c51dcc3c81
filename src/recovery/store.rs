use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{ResetToken, TokenState};
use crate::error::Result;
use crate::token::{hash_token, ConsumeOutcome};

/// Where reset tokens live.
///
/// Redemption is two-phase: [`ResetTokenStore::begin_redeem`] atomically
/// claims an active token, and [`ResetTokenStore::finish_redeem`] either
/// consumes it or returns it to the active state.
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    async fn save(&self, token: &ResetToken) -> Result<()>;

    async fn lookup(&self, value: &str) -> Result<Option<ResetToken>>;

    async fn begin_redeem(&self, value: &str) -> Result<ConsumeOutcome>;

    async fn finish_redeem(&self, value: &str, succeeded: bool) -> Result<()>;

    async fn purge_expired(&self, now: i64) -> Result<usize>;
}

#[derive(Debug, Default)]
pub struct MemoryResetTokenStore {
    tokens: Mutex<HashMap<Vec<u8>, ResetToken>>,
}

impl MemoryResetTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResetTokenStore for MemoryResetTokenStore {
    async fn save(&self, token: &ResetToken) -> Result<()> {
        self.tokens
            .lock()
            .await
            .insert(hash_token(&token.value), token.clone());
        Ok(())
    }

    async fn lookup(&self, value: &str) -> Result<Option<ResetToken>> {
        Ok(self.tokens.lock().await.get(&hash_token(value)).cloned())
    }

    async fn begin_redeem(&self, value: &str) -> Result<ConsumeOutcome> {
        let mut tokens = self.tokens.lock().await;
        let outcome = match tokens.get_mut(&hash_token(value)) {
            None => ConsumeOutcome::Missing,
            Some(token) if token.state != TokenState::Active => ConsumeOutcome::AlreadyConsumed,
            Some(token) => {
                token.state = TokenState::Redeeming;
                ConsumeOutcome::Consumed
            }
        };
        Ok(outcome)
    }

    async fn finish_redeem(&self, value: &str, succeeded: bool) -> Result<()> {
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = tokens.get_mut(&hash_token(value)) {
            if token.state == TokenState::Redeeming {
                token.state = if succeeded {
                    TokenState::Consumed
                } else {
                    TokenState::Active
                };
            }
        }
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<usize> {
        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, token| !token.is_expired(now));
        Ok(before - tokens.len())
    }
}
