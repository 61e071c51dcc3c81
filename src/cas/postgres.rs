//! Postgres-backed ticket store, for running more than one instance.
//!
//! Only SHA-256 hashes of ticket values are stored. See `sql/schema.sql`.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};

use super::{Ticket, TicketKind, TicketStore};
use crate::error::{Error, Result};
use crate::token::{hash_token, ConsumeOutcome};

#[derive(Clone, Debug)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn span(operation: &'static str, statement: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn save(&self, ticket: &Ticket) -> Result<()> {
        let query = r"
            INSERT INTO tickets
                (value_hash, kind, uid, service, issued_at, expires_at, renewed, granted_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        sqlx::query(query)
            .bind(hash_token(&ticket.value))
            .bind(ticket.kind.as_str())
            .bind(&ticket.uid)
            .bind(&ticket.service)
            .bind(ticket.issued_at)
            .bind(ticket.expires_at)
            .bind(ticket.renewed)
            .bind(ticket.granted_by.as_deref())
            .execute(&self.pool)
            .instrument(span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn lookup(&self, value: &str) -> Result<Option<Ticket>> {
        let query = r"
            SELECT kind, uid, service, issued_at, expires_at, renewed, granted_by,
                   consumed_at IS NOT NULL AS consumed
            FROM tickets
            WHERE value_hash = $1
        ";
        let row = sqlx::query(query)
            .bind(hash_token(value))
            .fetch_optional(&self.pool)
            .instrument(span("SELECT", query))
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let kind: String = row.get("kind");
        let kind = TicketKind::parse(&kind)
            .ok_or_else(|| Error::Internal(format!("unknown ticket kind {kind}")))?;
        Ok(Some(Ticket {
            kind,
            value: value.to_string(),
            uid: row.get("uid"),
            service: row.get("service"),
            issued_at: row.get("issued_at"),
            expires_at: row.get("expires_at"),
            renewed: row.get("renewed"),
            consumed: row.get("consumed"),
            granted_by: row.get("granted_by"),
        }))
    }

    async fn mark_consumed(&self, value: &str) -> Result<ConsumeOutcome> {
        // The WHERE clause is the compare-and-swap: only one UPDATE can match.
        let query = r"
            UPDATE tickets
            SET consumed_at = EXTRACT(EPOCH FROM now())::BIGINT
            WHERE value_hash = $1 AND consumed_at IS NULL
        ";
        let hash = hash_token(value);
        let updated = sqlx::query(query)
            .bind(&hash)
            .execute(&self.pool)
            .instrument(span("UPDATE", query))
            .await?
            .rows_affected();
        if updated == 1 {
            return Ok(ConsumeOutcome::Consumed);
        }

        let query = "SELECT 1 FROM tickets WHERE value_hash = $1";
        let exists = sqlx::query(query)
            .bind(&hash)
            .fetch_optional(&self.pool)
            .instrument(span("SELECT", query))
            .await?
            .is_some();
        Ok(if exists {
            ConsumeOutcome::AlreadyConsumed
        } else {
            ConsumeOutcome::Missing
        })
    }

    async fn remove(&self, value: &str) -> Result<bool> {
        let query = "DELETE FROM tickets WHERE value_hash = $1";
        let removed = sqlx::query(query)
            .bind(hash_token(value))
            .execute(&self.pool)
            .instrument(span("DELETE", query))
            .await?
            .rows_affected();
        Ok(removed > 0)
    }

    async fn purge_expired(&self, now: i64) -> Result<usize> {
        let query = "DELETE FROM tickets WHERE expires_at <= $1";
        let removed = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(span("DELETE", query))
            .await?
            .rows_affected();
        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }
}
