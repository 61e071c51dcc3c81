//! # Staffio (Staff Directory & Single Sign-On)
//!
//! `staffio` sits in front of an LDAP-style staff directory. It authenticates
//! people, keeps their directory records in sync with submitted profiles, and
//! lets one login authorize access to many dependent web services.
//!
//! ## Single sign-on
//!
//! A successful login mints a **ticket-granting ticket** (TGT) kept in an
//! `HttpOnly` cookie. Each dependent service gets a short-lived **service
//! ticket** (ST) appended to its URL as `?ticket=`; the service redeems it
//! exactly once through `/serviceValidate`.
//!
//! ## Directory writes
//!
//! Profile writes are reconciled against the stored record first: a missing
//! record becomes one insert, an existing one becomes one modify carrying only
//! the attributes that changed. Fields the caller left blank are never cleared.
//!
//! ## Password recovery
//!
//! Reset tokens are single use, expire after 30 minutes by default, and are
//! spent only once the directory accepted the new password.

pub mod cas;
pub mod cli;
pub mod directory;
pub mod error;
pub mod notify;
pub mod recovery;
pub mod staffio;
pub mod token;

pub use error::{Error, Result};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
