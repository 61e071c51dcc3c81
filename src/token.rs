//! Opaque token values, hashing, and the clock used for lazy expiry.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

const TOKEN_BYTES: usize = 32;

/// Create a new unguessable token value, e.g. `ST-<43 url-safe chars>`.
///
/// The raw value is only handed to the client; stores keep a hash.
pub fn generate_token(prefix: &str) -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| Error::Internal(format!("failed to generate token: {err}")))?;
    Ok(format!(
        "{prefix}-{}",
        Base64UrlUnpadded::encode_string(&bytes)
    ))
}

/// Hash a token so raw values never touch persistent storage.
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Hex form of [`hash_token`], used as an audit reference between tickets.
pub fn fingerprint(token: &str) -> String {
    hash_token(token)
        .iter()
        .fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}

/// Result of an atomic check-and-mark on a single-use value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// This caller flipped the flag; it owns the redemption.
    Consumed,
    /// Someone else got there first.
    AlreadyConsumed,
    Missing,
}

/// Wall-clock source in unix seconds.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
            })
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
