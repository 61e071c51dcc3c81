use thiserror::Error;

use crate::directory::BackendError;

/// Errors surfaced by the directory store, the ticket authority and the
/// password recovery flow.
///
/// Callers match on the variant, never on the message. Only
/// [`Error::BackendUnavailable`] and [`Error::Internal`] are meant to be shown
/// as a generic "try again"; every other kind maps to a field-specific message.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("already used")]
    AlreadyConsumed,
    #[error("expired")]
    Expired,
    #[error("service mismatch")]
    ServiceMismatch,
    #[error("directory unavailable: {0}")]
    BackendUnavailable(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code, used in JSON error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AlreadyConsumed => "ALREADY_CONSUMED",
            Self::Expired => "EXPIRED",
            Self::ServiceMismatch => "SERVICE_MISMATCH",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the error should be logged verbosely and hidden behind a
    /// generic message.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::Internal(_))
    }
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound => Self::NotFound,
            BackendError::InvalidCredentials => Self::InvalidCredentials,
            BackendError::Unavailable(message) => Self::BackendUnavailable(message),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(format!("ticket store: {err}"))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
