//! Ticket storage seam.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::Ticket;
use crate::error::Result;
use crate::token::{hash_token, ConsumeOutcome};

/// Where tickets live. Implementations must make [`TicketStore::mark_consumed`]
/// a single atomic check-and-set.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn save(&self, ticket: &Ticket) -> Result<()>;

    async fn lookup(&self, value: &str) -> Result<Option<Ticket>>;

    /// Flip `consumed` from false to true.
    async fn mark_consumed(&self, value: &str) -> Result<ConsumeOutcome>;

    /// Returns whether a ticket was removed.
    async fn remove(&self, value: &str) -> Result<bool>;

    /// Drop every ticket whose expiry is at or before `now`.
    async fn purge_expired(&self, now: i64) -> Result<usize>;
}

/// Process-local ticket store keyed by the SHA-256 of the ticket value.
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    tickets: Mutex<HashMap<Vec<u8>, Ticket>>,
}

impl MemoryTicketStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tickets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.lock().await.is_empty()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn save(&self, ticket: &Ticket) -> Result<()> {
        self.tickets
            .lock()
            .await
            .insert(hash_token(&ticket.value), ticket.clone());
        Ok(())
    }

    async fn lookup(&self, value: &str) -> Result<Option<Ticket>> {
        Ok(self.tickets.lock().await.get(&hash_token(value)).cloned())
    }

    async fn mark_consumed(&self, value: &str) -> Result<ConsumeOutcome> {
        let mut tickets = self.tickets.lock().await;
        let outcome = match tickets.get_mut(&hash_token(value)) {
            None => ConsumeOutcome::Missing,
            Some(ticket) if ticket.consumed => ConsumeOutcome::AlreadyConsumed,
            Some(ticket) => {
                ticket.consumed = true;
                ConsumeOutcome::Consumed
            }
        };
        Ok(outcome)
    }

    async fn remove(&self, value: &str) -> Result<bool> {
        Ok(self.tickets.lock().await.remove(&hash_token(value)).is_some())
    }

    async fn purge_expired(&self, now: i64) -> Result<usize> {
        let mut tickets = self.tickets.lock().await;
        let before = tickets.len();
        tickets.retain(|_, ticket| !ticket.is_expired(now));
        Ok(before - tickets.len())
    }
}
