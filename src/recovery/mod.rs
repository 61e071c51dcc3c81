//! Password recovery tokens.
//!
//! The web layer confirms that the submitted email and mobile match the
//! profile on file, then asks [`PasswordRecovery::issue`] for a token and
//! mails a link carrying it. Opening the link only [`verify`]s the token;
//! submitting the new password [`redeem`]s it. A token is single use and is
//! spent only once the directory accepted the new password.
//!
//! [`verify`]: PasswordRecovery::verify
//! [`redeem`]: PasswordRecovery::redeem

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::directory::DirectoryStore;
use crate::error::{Error, Result};
use crate::token::{generate_token, Clock, ConsumeOutcome, SystemClock};

pub mod postgres;
mod store;

pub use store::{MemoryResetTokenStore, ResetTokenStore};

const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 30 * 60;
const TOKEN_PREFIX: &str = "RT";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
    Active,
    /// Claimed by a redemption whose password write has not finished.
    Redeeming,
    Consumed,
}

impl TokenState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Redeeming => "redeeming",
            Self::Consumed => "consumed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "redeeming" => Some(Self::Redeeming),
            "consumed" => Some(Self::Consumed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResetToken {
    pub value: String,
    pub uid: String,
    /// Address the token was sent to.
    pub email: String,
    pub mobile: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub state: TokenState,
}

impl ResetToken {
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

pub struct PasswordRecovery {
    store: Arc<dyn ResetTokenStore>,
    directory: Arc<DirectoryStore>,
    clock: Arc<dyn Clock>,
    ttl_seconds: i64,
}

impl PasswordRecovery {
    pub fn new(store: Arc<dyn ResetTokenStore>, directory: Arc<DirectoryStore>) -> Self {
        Self {
            store,
            directory,
            clock: Arc::new(SystemClock),
            ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Mint a token for a user whose email and mobile were already matched.
    #[instrument(skip(self, verified_email, verified_mobile))]
    pub async fn issue(
        &self,
        uid: &str,
        verified_email: &str,
        verified_mobile: &str,
    ) -> Result<ResetToken> {
        let now = self.clock.now_unix();
        let token = ResetToken {
            value: generate_token(TOKEN_PREFIX)?,
            uid: uid.to_string(),
            email: verified_email.to_string(),
            mobile: verified_mobile.to_string(),
            issued_at: now,
            expires_at: now.saturating_add(self.ttl_seconds),
            state: TokenState::Active,
        };
        self.store.save(&token).await?;
        info!("issued password reset token for {uid}");
        Ok(token)
    }

    /// Resolve a token to its uid without spending it.
    pub async fn verify(&self, token: &str) -> Result<String> {
        let Some(record) = self.store.lookup(token).await? else {
            return Err(Error::NotFound);
        };
        if record.is_expired(self.clock.now_unix()) {
            return Err(Error::Expired);
        }
        match record.state {
            TokenState::Active => Ok(record.uid),
            TokenState::Redeeming | TokenState::Consumed => Err(Error::AlreadyConsumed),
        }
    }

    /// Set a new password with a token, spending it only if the write lands.
    #[instrument(skip(self, token, new_password))]
    pub async fn redeem(&self, uid: &str, token: &str, new_password: &str) -> Result<()> {
        let owner = self.verify(token).await?;
        if owner != uid {
            warn!("reset token for {owner} presented for {uid}");
            return Err(Error::ValidationFailed(
                "token does not belong to this user".to_string(),
            ));
        }
        if new_password.is_empty() {
            return Err(Error::ValidationFailed("empty password".to_string()));
        }

        match self.store.begin_redeem(token).await? {
            ConsumeOutcome::Consumed => {}
            ConsumeOutcome::AlreadyConsumed => return Err(Error::AlreadyConsumed),
            ConsumeOutcome::Missing => return Err(Error::NotFound),
        }

        match self.directory.reset_password(uid, new_password).await {
            Ok(()) => {
                self.store.finish_redeem(token, true).await?;
                info!("password reset with token for {uid}");
                Ok(())
            }
            Err(err) => {
                // Hand the token back so the user can retry.
                self.store.finish_redeem(token, false).await?;
                Err(err)
            }
        }
    }

    pub async fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired(self.clock.now_unix()).await
    }
}
