use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{Ticket, TicketKind, TicketStore};
use crate::error::{Error, Result};
use crate::token::{fingerprint, generate_token, Clock, ConsumeOutcome, SystemClock};

const DEFAULT_TGT_TTL_SECONDS: i64 = 8 * 60 * 60;
const DEFAULT_ST_TTL_SECONDS: i64 = 5 * 60;

#[derive(Clone, Copy, Debug)]
pub struct TicketConfig {
    tgt_ttl_seconds: i64,
    st_ttl_seconds: i64,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tgt_ttl_seconds: DEFAULT_TGT_TTL_SECONDS,
            st_ttl_seconds: DEFAULT_ST_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_tgt_ttl_seconds(mut self, seconds: i64) -> Self {
        self.tgt_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_st_ttl_seconds(mut self, seconds: i64) -> Self {
        self.st_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn tgt_ttl_seconds(&self) -> i64 {
        self.tgt_ttl_seconds
    }

    #[must_use]
    pub fn st_ttl_seconds(&self) -> i64 {
        self.st_ttl_seconds
    }
}

/// Tickets minted by a fresh password login.
#[derive(Clone, Debug)]
pub struct LoginGrant {
    pub tgt: Ticket,
    pub st: Option<Ticket>,
}

pub struct TicketAuthority {
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
    config: TicketConfig,
}

impl TicketAuthority {
    pub fn new(store: Arc<dyn TicketStore>, config: TicketConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &TicketConfig {
        &self.config
    }

    /// Mint a TGT for a user whose credentials were just verified.
    #[instrument(skip(self))]
    pub async fn issue_tgt(&self, uid: &str) -> Result<Ticket> {
        let now = self.clock.now_unix();
        let ticket = Ticket {
            kind: TicketKind::Tgt,
            value: generate_token(TicketKind::Tgt.as_str())?,
            uid: uid.to_string(),
            service: String::new(),
            issued_at: now,
            expires_at: now.saturating_add(self.config.tgt_ttl_seconds),
            renewed: false,
            consumed: false,
            granted_by: None,
        };
        self.store.save(&ticket).await?;
        info!("issued TGT for {uid}");
        Ok(ticket)
    }

    /// Resolve a presented TGT. Expired ones are dropped on sight.
    pub async fn validate_tgt(&self, value: &str) -> Result<Ticket> {
        let ticket = match self.store.lookup(value).await? {
            Some(ticket) if ticket.kind == TicketKind::Tgt => ticket,
            _ => return Err(Error::NotFound),
        };
        if ticket.is_expired(self.clock.now_unix()) {
            self.store.remove(value).await?;
            debug!("TGT for {} expired", ticket.uid);
            return Err(Error::Expired);
        }
        Ok(ticket)
    }

    /// Mint an ST for `service` from an existing TGT (single sign-on).
    #[instrument(skip(self, tgt))]
    pub async fn issue_st(&self, tgt: &str, service: &str) -> Result<Ticket> {
        let granting = self.validate_tgt(tgt).await?;
        self.grant_service(&granting, service, true).await
    }

    /// Mint a TGT, and an ST when a service asked for the login.
    #[instrument(skip(self))]
    pub async fn login(&self, uid: &str, service: Option<&str>) -> Result<LoginGrant> {
        if let Some(service) = service {
            validate_service(service)?;
        }
        let tgt = self.issue_tgt(uid).await?;
        let st = match service {
            Some(service) => Some(self.grant_service(&tgt, service, false).await?),
            None => None,
        };
        Ok(LoginGrant { tgt, st })
    }

    /// Redeem an ST once, returning the user it was issued to.
    #[instrument(skip(self, value))]
    pub async fn redeem_st(&self, value: &str, service: &str) -> Result<String> {
        let ticket = match self.store.lookup(value).await? {
            Some(ticket) if ticket.kind == TicketKind::St => ticket,
            _ => return Err(Error::NotFound),
        };
        if ticket.service != service {
            warn!(
                "ST for {} presented by {service}, issued for {}",
                ticket.uid, ticket.service
            );
            return Err(Error::ServiceMismatch);
        }
        if ticket.is_expired(self.clock.now_unix()) {
            return Err(Error::Expired);
        }
        if ticket.consumed {
            warn!("replayed ST for {} at {service}", ticket.uid);
            return Err(Error::AlreadyConsumed);
        }
        match self.store.mark_consumed(value).await? {
            ConsumeOutcome::Consumed => {
                info!("ST redeemed for {} at {service}", ticket.uid);
                Ok(ticket.uid)
            }
            ConsumeOutcome::AlreadyConsumed => {
                warn!("concurrent ST redemption for {} at {service}", ticket.uid);
                Err(Error::AlreadyConsumed)
            }
            ConsumeOutcome::Missing => Err(Error::NotFound),
        }
    }

    /// Logout. STs already minted from this TGT stay valid until they expire.
    #[instrument(skip(self, value))]
    pub async fn revoke_tgt(&self, value: &str) -> Result<()> {
        match self.store.lookup(value).await? {
            Some(ticket) if ticket.kind == TicketKind::Tgt => {
                if self.store.remove(value).await? {
                    info!("TGT revoked for {}", ticket.uid);
                }
            }
            Some(ticket) => debug!("logout ignored a {} value", ticket.kind.as_str()),
            None => {}
        }
        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired(self.clock.now_unix()).await
    }

    async fn grant_service(&self, tgt: &Ticket, service: &str, renewed: bool) -> Result<Ticket> {
        validate_service(service)?;
        let now = self.clock.now_unix();
        let ticket = Ticket {
            kind: TicketKind::St,
            value: generate_token(TicketKind::St.as_str())?,
            uid: tgt.uid.clone(),
            service: service.to_string(),
            issued_at: now,
            expires_at: now.saturating_add(self.config.st_ttl_seconds),
            renewed,
            consumed: false,
            granted_by: Some(fingerprint(&tgt.value)),
        };
        self.store.save(&ticket).await?;
        info!("issued ST for {} to {service}", ticket.uid);
        Ok(ticket)
    }
}

/// Services are absolute http(s) URLs.
fn validate_service(service: &str) -> Result<()> {
    match Url::parse(service) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(()),
        _ => Err(Error::ValidationFailed(format!("invalid service: {service}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::MemoryTicketStore;
    use crate::token::ManualClock;

    fn authority(clock: Arc<ManualClock>) -> TicketAuthority {
        TicketAuthority::new(
            Arc::new(MemoryTicketStore::new()),
            TicketConfig::new()
                .with_tgt_ttl_seconds(3600)
                .with_st_ttl_seconds(60),
        )
        .with_clock(clock)
    }

    #[tokio::test]
    async fn st_redeems_exactly_once() -> Result<()> {
        let authority = authority(Arc::new(ManualClock::new(1_000)));
        let tgt = authority.issue_tgt("alice").await?;
        let st = authority.issue_st(&tgt.value, "https://a.example").await?;

        assert!(st.renewed);
        assert_eq!(st.granted_by.as_deref(), Some(fingerprint(&tgt.value).as_str()));
        assert_eq!(
            authority.redeem_st(&st.value, "https://a.example").await?,
            "alice"
        );
        assert!(matches!(
            authority.redeem_st(&st.value, "https://a.example").await,
            Err(Error::AlreadyConsumed)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn st_rejects_other_service() -> Result<()> {
        let authority = authority(Arc::new(ManualClock::new(1_000)));
        let tgt = authority.issue_tgt("alice").await?;
        let st = authority.issue_st(&tgt.value, "https://a.example").await?;
        assert!(matches!(
            authority.redeem_st(&st.value, "https://b.example").await,
            Err(Error::ServiceMismatch)
        ));
        // The rightful service can still redeem it.
        assert_eq!(
            authority.redeem_st(&st.value, "https://a.example").await?,
            "alice"
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_and_wrong_kind_values_are_not_found() -> Result<()> {
        let authority = authority(Arc::new(ManualClock::new(1_000)));
        let tgt = authority.issue_tgt("alice").await?;
        assert!(matches!(
            authority.redeem_st("ST-nope", "https://a.example").await,
            Err(Error::NotFound)
        ));
        assert!(matches!(
            authority.redeem_st(&tgt.value, "").await,
            Err(Error::NotFound)
        ));
        assert!(matches!(
            authority.issue_st("TGT-nope", "https://a.example").await,
            Err(Error::NotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn expired_tickets_fail() -> Result<()> {
        let clock = Arc::new(ManualClock::new(1_000));
        let authority = authority(Arc::clone(&clock));
        let tgt = authority.issue_tgt("alice").await?;
        let st = authority.issue_st(&tgt.value, "https://a.example").await?;

        clock.advance(60);
        assert!(matches!(
            authority.redeem_st(&st.value, "https://a.example").await,
            Err(Error::Expired)
        ));

        clock.advance(3600);
        assert!(matches!(
            authority.issue_st(&tgt.value, "https://a.example").await,
            Err(Error::Expired)
        ));
        // Dropped lazily on the first expired lookup.
        assert!(matches!(
            authority.validate_tgt(&tgt.value).await,
            Err(Error::NotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn revoking_tgt_leaves_issued_sts_valid() -> Result<()> {
        let authority = authority(Arc::new(ManualClock::new(1_000)));
        let tgt = authority.issue_tgt("alice").await?;
        let st = authority.issue_st(&tgt.value, "https://a.example").await?;

        authority.revoke_tgt(&tgt.value).await?;
        assert!(matches!(
            authority.issue_st(&tgt.value, "https://a.example").await,
            Err(Error::NotFound)
        ));
        assert_eq!(
            authority.redeem_st(&st.value, "https://a.example").await?,
            "alice"
        );
        // Revoking twice is harmless.
        authority.revoke_tgt(&tgt.value).await?;
        Ok(())
    }

    #[tokio::test]
    async fn login_with_service_issues_fresh_st() -> Result<()> {
        let authority = authority(Arc::new(ManualClock::new(1_000)));
        let grant = authority.login("alice", Some("https://svc")).await?;
        let Some(st) = grant.st else {
            panic!("service login should mint an ST");
        };
        assert!(!st.renewed);
        assert_eq!(st.uid, "alice");
        assert_eq!(authority.validate_tgt(&grant.tgt.value).await?.uid, "alice");

        let without = authority.login("alice", None).await?;
        assert!(without.st.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn login_rejects_non_url_service() {
        let authority = authority(Arc::new(ManualClock::new(1_000)));
        assert!(matches!(
            authority.login("alice", Some("javascript:alert(1)")).await,
            Err(Error::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn purge_removes_only_expired() -> Result<()> {
        let clock = Arc::new(ManualClock::new(1_000));
        let authority = authority(Arc::clone(&clock));
        let tgt = authority.issue_tgt("alice").await?;
        authority.issue_st(&tgt.value, "https://a.example").await?;
        clock.advance(120);
        assert_eq!(authority.purge_expired().await?, 1);
        assert!(authority.validate_tgt(&tgt.value).await.is_ok());
        Ok(())
    }
}
