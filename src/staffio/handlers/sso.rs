use crate::{
    cas::service_redirect,
    error::Error,
    staffio::{
        handlers::{
            clear_tgt_cookie, error_response, extract_tgt, invalid, tgt_cookie, Failure,
        },
        AppState, WebConfig,
    },
};
use axum::{
    extract::{Extension, Query},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct LoginQuery {
    /// Service URL asking for the login.
    service: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<String>,
}

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
    service: Option<String>,
    referer: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginResponse {
    ok: bool,
    /// Where the browser should go next.
    referer: String,
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct ValidateQuery {
    ticket: Option<String>,
    service: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct ValidateResponse {
    ok: bool,
    uid: String,
}

#[utoipa::path(
    get,
    path = "/login",
    params(LoginQuery),
    responses (
        (status = 200, description = "Login state for the current TGT cookie", body = LoginStatus),
        (status = 303, description = "Signed in already, redirected to the service with a ticket"),
    ),
    tag = "sso"
)]
#[instrument(skip(state, headers))]
pub async fn login_form(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Response {
    let service = query.service.filter(|service| !service.is_empty());

    if let Some(tgt) = extract_tgt(&headers) {
        match state.tickets.validate_tgt(&tgt).await {
            Ok(ticket) => {
                let Some(service) = service else {
                    return Json(LoginStatus {
                        ok: true,
                        uid: Some(ticket.uid),
                        service: None,
                    })
                    .into_response();
                };
                return match state.tickets.issue_st(&tgt, &service).await {
                    Ok(st) => Redirect::to(&service_redirect(&service, &st.value)).into_response(),
                    Err(err) => error_response(&err, Some("service")),
                };
            }
            Err(err) if err.is_transient() => return error_response(&err, None),
            Err(err) => debug!("TGT cookie not usable: {err}"),
        }
    }

    Json(LoginStatus {
        ok: false,
        uid: None,
        service,
    })
    .into_response()
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Signed in, TGT cookie set", body = LoginResponse, content_type = "application/json"),
        (status = 400, description = "Missing field or bad service URL", body = Failure),
        (status = 401, description = "Invalid username or password", body = Failure),
    ),
    tag = "sso"
)]
#[instrument(skip(state, payload))]
pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return invalid("Missing payload", "username");
    };

    let uid = request.username.trim();
    if uid.is_empty() {
        return invalid("Username is required", "username");
    }
    if request.password.is_empty() {
        return invalid("Password is required", "password");
    }

    if let Err(err) = state.directory.authenticate(uid, &request.password).await {
        warn!("login failed for {uid}");
        return error_response(&err, Some("password"));
    }

    let service = request.service.filter(|service| !service.is_empty());
    let grant = match state.tickets.login(uid, service.as_deref()).await {
        Ok(grant) => grant,
        Err(err) => return error_response(&err, Some("service")),
    };

    let referer = match (&grant.st, &service) {
        (Some(st), Some(service)) => service_redirect(service, &st.value),
        _ => safe_referer(&state.config, request.referer.as_deref()),
    };

    let ttl_seconds = state.tickets.config().tgt_ttl_seconds();
    let cookie = match tgt_cookie(&state.config, &grant.tgt.value, ttl_seconds) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build TGT cookie: {err}");
            return error_response(&Error::Internal("cookie".to_string()), None);
        }
    };

    (
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(LoginResponse { ok: true, referer }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/logout",
    responses (
        (status = 303, description = "TGT revoked, cookie cleared, redirected to /"),
    ),
    tag = "sso"
)]
#[instrument(skip(state, headers))]
pub async fn logout(Extension(state): Extension<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(tgt) = extract_tgt(&headers) {
        if let Err(err) = state.tickets.revoke_tgt(&tgt).await {
            error!("Failed to revoke TGT: {err}");
        }
    }

    match clear_tgt_cookie(&state.config) {
        Ok(cookie) => ([(SET_COOKIE, cookie)], Redirect::to("/")).into_response(),
        Err(err) => {
            error!("Failed to build TGT cookie: {err}");
            Redirect::to("/").into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/serviceValidate",
    params(ValidateQuery),
    responses (
        (status = 200, description = "Ticket redeemed", body = ValidateResponse, content_type = "application/json"),
        (status = 400, description = "Missing parameter or service mismatch", body = Failure),
        (status = 404, description = "Unknown ticket", body = Failure),
        (status = 409, description = "Ticket already used", body = Failure),
        (status = 410, description = "Ticket expired", body = Failure),
    ),
    tag = "sso"
)]
#[instrument(skip(state, query))]
pub async fn service_validate(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ValidateQuery>,
) -> Response {
    let Some(ticket) = query.ticket.filter(|ticket| !ticket.is_empty()) else {
        return invalid("Missing ticket", "ticket");
    };
    let Some(service) = query.service.filter(|service| !service.is_empty()) else {
        return invalid("Missing service", "service");
    };

    match state.tickets.redeem_st(&ticket, &service).await {
        Ok(uid) => Json(ValidateResponse { ok: true, uid }).into_response(),
        Err(err) => error_response(&err, Some("ticket")),
    }
}

/// Only same-site paths or URLs under the public base are followed.
fn safe_referer(config: &WebConfig, referer: Option<&str>) -> String {
    match referer {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        Some(url) if url.starts_with(&format!("{}/", config.base_url())) => url.to_string(),
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_referer_rejects_foreign_hosts() {
        let config = WebConfig::new("https://sso.example.com".to_string());
        assert_eq!(safe_referer(&config, None), "/");
        assert_eq!(safe_referer(&config, Some("/profile")), "/profile");
        assert_eq!(safe_referer(&config, Some("//evil.com")), "/");
        assert_eq!(safe_referer(&config, Some("https://evil.com/x")), "/");
        assert_eq!(
            safe_referer(&config, Some("https://sso.example.com/profile")),
            "https://sso.example.com/profile"
        );
    }
}
