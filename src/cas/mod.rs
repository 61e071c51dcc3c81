//! Single sign-on tickets.
//!
//! A browser that logs in receives a ticket-granting ticket (TGT) in a cookie.
//! Each dependent service the user visits afterwards gets a service ticket
//! (ST) minted from that TGT and passed back as `?ticket=`. The service then
//! redeems the ST exactly once to learn who the user is.
//!
//! Revoking a TGT (logout) does not reach into the STs already minted from
//! it: those remain redeemable until their own short expiry. STs are
//! capabilities, not children of the TGT.

use serde::{Deserialize, Serialize};
use std::fmt;

mod authority;
pub mod postgres;
mod store;

pub use authority::{LoginGrant, TicketAuthority, TicketConfig};
pub use store::{MemoryTicketStore, TicketStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketKind {
    #[serde(rename = "TGT")]
    Tgt,
    #[serde(rename = "ST")]
    St,
}

impl TicketKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tgt => "TGT",
            Self::St => "ST",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "TGT" => Some(Self::Tgt),
            "ST" => Some(Self::St),
            _ => None,
        }
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub kind: TicketKind,
    pub value: String,
    pub uid: String,
    /// Target service; empty for a TGT.
    pub service: String,
    pub issued_at: i64,
    pub expires_at: i64,
    /// Minted from an existing TGT rather than a fresh password entry.
    pub renewed: bool,
    pub consumed: bool,
    /// Fingerprint of the TGT an ST was minted from.
    pub granted_by: Option<String>,
}

impl Ticket {
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// `{service}?ticket={value}`, or `&ticket=` when the service URL already
/// carries a query.
#[must_use]
pub fn service_redirect(service: &str, ticket: &str) -> String {
    let separator = if service.contains('?') { '&' } else { '?' };
    format!("{service}{separator}ticket={ticket}")
}
