use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};

use super::{ResetToken, ResetTokenStore, TokenState};
use crate::error::{Error, Result};
use crate::token::{hash_token, ConsumeOutcome};

#[derive(Clone, Debug)]
pub struct PgResetTokenStore {
    pool: PgPool,
}

impl PgResetTokenStore {
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
impl ResetTokenStore for PgResetTokenStore {
    async fn save(&self, token: &ResetToken) -> Result<()> {
        let query = r"
            INSERT INTO reset_tokens
                (value_hash, uid, email, mobile, issued_at, expires_at, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        sqlx::query(query)
            .bind(hash_token(&token.value))
            .bind(&token.uid)
            .bind(&token.email)
            .bind(&token.mobile)
            .bind(token.issued_at)
            .bind(token.expires_at)
            .bind(token.state.as_str())
            .execute(&self.pool)
            .instrument(span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn lookup(&self, value: &str) -> Result<Option<ResetToken>> {
        let query = r"
            SELECT uid, email, mobile, issued_at, expires_at, state
            FROM reset_tokens
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
        let state: String = row.get("state");
        let state = TokenState::parse(&state)
            .ok_or_else(|| Error::Internal(format!("unknown reset token state {state}")))?;
        Ok(Some(ResetToken {
            value: value.to_string(),
            uid: row.get("uid"),
            email: row.get("email"),
            mobile: row.get("mobile"),
            issued_at: row.get("issued_at"),
            expires_at: row.get("expires_at"),
            state,
        }))
    }

    async fn begin_redeem(&self, value: &str) -> Result<ConsumeOutcome> {
        let query = r"
            UPDATE reset_tokens
            SET state = 'redeeming'
            WHERE value_hash = $1 AND state = 'active'
        ";
        let hash = hash_token(value);
        let claimed = sqlx::query(query)
            .bind(&hash)
            .execute(&self.pool)
            .instrument(span("UPDATE", query))
            .await?
            .rows_affected();
        if claimed == 1 {
            return Ok(ConsumeOutcome::Consumed);
        }

        let query = "SELECT 1 FROM reset_tokens WHERE value_hash = $1";
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

    async fn finish_redeem(&self, value: &str, succeeded: bool) -> Result<()> {
        let query = r"
            UPDATE reset_tokens
            SET state = $2
            WHERE value_hash = $1 AND state = 'redeeming'
        ";
        let next = if succeeded {
            TokenState::Consumed
        } else {
            TokenState::Active
        };
        sqlx::query(query)
            .bind(hash_token(value))
            .bind(next.as_str())
            .execute(&self.pool)
            .instrument(span("UPDATE", query))
            .await?;
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<usize> {
        let query = "DELETE FROM reset_tokens WHERE expires_at <= $1";
        let removed = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(span("DELETE", query))
            .await?
            .rows_affected();
        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }
}
