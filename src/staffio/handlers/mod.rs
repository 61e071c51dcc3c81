pub mod health;
pub mod password;
pub mod profile;
pub mod sso;
pub mod staff;

// common functions for the handlers
use crate::{error::Error, staffio::AppState, staffio::WebConfig};
use axum::{
    http::{header::COOKIE, header::InvalidHeaderValue, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{debug, error};
use utoipa::ToSchema;

pub const TGT_COOKIE_NAME: &str = "staffio_tgc";

/// Plain success body.
#[derive(ToSchema, Serialize, Debug)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Json<Self> {
        Json(Self { ok: true })
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct FieldError {
    pub code: String,
    pub message: String,
    /// Form field the message belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct Failure {
    pub ok: bool,
    pub error: FieldError,
}

pub(crate) fn failure(
    status: StatusCode,
    code: &str,
    message: &str,
    field: Option<&str>,
) -> Response {
    let body = Failure {
        ok: false,
        error: FieldError {
            code: code.to_string(),
            message: message.to_string(),
            field: field.map(str::to_string),
        },
    };
    (status, Json(body)).into_response()
}

pub(crate) fn invalid(message: &str, field: &str) -> Response {
    failure(
        StatusCode::BAD_REQUEST,
        "VALIDATION_FAILED",
        message,
        Some(field),
    )
}

/// Map a domain error to a response. Transient failures are logged and
/// hidden behind a generic message.
pub(crate) fn error_response(err: &Error, field: Option<&str>) -> Response {
    if err.is_transient() {
        error!("{err}");
        let status = match err {
            Error::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return failure(
            status,
            err.code(),
            "Service temporarily unavailable, please try again later",
            None,
        );
    }

    let status = match err {
        Error::NotFound => StatusCode::NOT_FOUND,
        Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
        Error::AlreadyConsumed => StatusCode::CONFLICT,
        Error::Expired => StatusCode::GONE,
        _ => StatusCode::BAD_REQUEST,
    };
    let message = match err {
        Error::InvalidCredentials => "Invalid username or password".to_string(),
        Error::AlreadyConsumed => "This link or ticket has already been used".to_string(),
        Error::Expired => "This link or ticket has expired".to_string(),
        other => other.to_string(),
    };
    failure(status, err.code(), &message, field)
}

pub(crate) fn tgt_cookie(
    config: &WebConfig,
    token: &str,
    ttl_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{TGT_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_tgt_cookie(config: &WebConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{TGT_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_tgt(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next().unwrap_or_default().trim();
            let val = parts.next().unwrap_or_default().trim();
            if key == TGT_COOKIE_NAME && !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}

/// The uid behind the request's TGT cookie, or a 401.
pub(crate) async fn session_uid(state: &AppState, headers: &HeaderMap) -> Result<String, Response> {
    let Some(tgt) = extract_tgt(headers) else {
        return Err(failure(
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "Login required",
            None,
        ));
    };
    match state.tickets.validate_tgt(&tgt).await {
        Ok(ticket) => Ok(ticket.uid),
        Err(err) if err.is_transient() => Err(error_response(&err, None)),
        Err(err) => {
            debug!("rejected TGT cookie: {err}");
            Err(failure(
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Login required",
                None,
            ))
        }
    }
}

/// Like [`session_uid`], but the user must also be a configured admin.
pub(crate) async fn admin_uid(state: &AppState, headers: &HeaderMap) -> Result<String, Response> {
    let uid = session_uid(state, headers).await?;
    if state.config.is_admin(&uid) {
        Ok(uid)
    } else {
        Err(failure(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "Administrator access required",
            None,
        ))
    }
}
