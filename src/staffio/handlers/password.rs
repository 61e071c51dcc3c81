use crate::{
    error::Error,
    notify::{build_reset_url, ResetNotice},
    staffio::{
        handlers::{error_response, failure, invalid, Ack, Failure},
        AppState,
    },
};
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

#[derive(ToSchema, Deserialize)]
pub struct ChangePassword {
    username: String,
    old_password: String,
    new_password: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ForgotPassword {
    username: String,
    email: String,
    mobile: String,
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct ResetQuery {
    /// Reset token from the emailed link.
    rt: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct ResetStatus {
    ok: bool,
    uid: String,
}

#[derive(ToSchema, Deserialize)]
pub struct ResetPassword {
    rt: String,
    username: String,
    password: String,
    password_confirm: String,
}

#[utoipa::path(
    post,
    path = "/password/change",
    request_body = ChangePassword,
    responses (
        (status = 200, description = "Password changed", body = Ack),
        (status = 401, description = "Old password rejected", body = Failure),
    ),
    tag = "password"
)]
#[instrument(skip(state, payload))]
pub async fn change(
    Extension(state): Extension<Arc<AppState>>,
    payload: Option<Json<ChangePassword>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return invalid("Missing payload", "username");
    };

    let uid = request.username.trim();
    if uid.is_empty() {
        return invalid("Username is required", "username");
    }
    if request.new_password.is_empty() {
        return invalid("New password is required", "new_password");
    }
    if request.new_password == request.old_password {
        return invalid("New password must differ from the old one", "new_password");
    }

    match state
        .directory
        .change_password(uid, &request.old_password, &request.new_password)
        .await
    {
        Ok(()) => {
            info!("password changed for {uid}");
            Ack::ok().into_response()
        }
        Err(err @ Error::InvalidCredentials) => error_response(&err, Some("old_password")),
        Err(err) => error_response(&err, None),
    }
}

#[utoipa::path(
    post,
    path = "/password/forgot",
    request_body = ForgotPassword,
    responses (
        (status = 200, description = "Reset link sent", body = Ack),
        (status = 400, description = "Details do not match the profile on file", body = Failure),
    ),
    tag = "password"
)]
#[instrument(skip(state, payload))]
pub async fn forgot(
    Extension(state): Extension<Arc<AppState>>,
    payload: Option<Json<ForgotPassword>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return invalid("Missing payload", "username");
    };

    let uid = request.username.trim();
    if uid.is_empty() {
        return invalid("Username is required", "username");
    }

    let profile = match state.directory.get(uid).await {
        Ok(profile) => profile,
        Err(Error::NotFound | Error::ValidationFailed(_)) => {
            return invalid("No such user", "username");
        }
        Err(err) => return error_response(&err, None),
    };

    if profile.email.is_empty() || profile.email != request.email.trim() {
        warn!("password forgot email mismatch for {uid}");
        return invalid("Email does not match our records", "email");
    }
    if profile.mobile != request.mobile.trim() {
        warn!("password forgot mobile mismatch for {uid}");
        return invalid("Mobile does not match our records", "mobile");
    }

    let token = match state
        .recovery
        .issue(&profile.uid, &profile.email, &profile.mobile)
        .await
    {
        Ok(token) => token,
        Err(err) => return error_response(&err, None),
    };

    let notice = ResetNotice {
        uid: profile.uid.clone(),
        to_email: profile.email.clone(),
        reset_url: build_reset_url(state.config.base_url(), &token.value),
    };
    if let Err(err) = state.notifier.send(&notice) {
        error!("Failed to send reset notice for {uid}: {err:#}");
        return failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL",
            "Failed to send the reset link, please try again later",
            None,
        );
    }

    Ack::ok().into_response()
}

#[utoipa::path(
    get,
    path = "/password/reset",
    params(ResetQuery),
    responses (
        (status = 200, description = "Token is usable", body = ResetStatus),
        (status = 404, description = "Unknown token", body = Failure),
        (status = 409, description = "Token already used", body = Failure),
        (status = 410, description = "Token expired", body = Failure),
    ),
    tag = "password"
)]
#[instrument(skip(state, query))]
pub async fn reset_form(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ResetQuery>,
) -> Response {
    let Some(rt) = query.rt.filter(|rt| !rt.is_empty()) else {
        return invalid("Missing reset token", "rt");
    };

    match state.recovery.verify(&rt).await {
        Ok(uid) => Json(ResetStatus { ok: true, uid }).into_response(),
        Err(err) => error_response(&err, Some("rt")),
    }
}

#[utoipa::path(
    post,
    path = "/password/reset",
    request_body = ResetPassword,
    responses (
        (status = 200, description = "Password reset", body = Ack),
        (status = 400, description = "Passwords missing or not matching", body = Failure),
        (status = 409, description = "Token already used", body = Failure),
        (status = 410, description = "Token expired", body = Failure),
    ),
    tag = "password"
)]
#[instrument(skip(state, payload))]
pub async fn reset(
    Extension(state): Extension<Arc<AppState>>,
    payload: Option<Json<ResetPassword>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return invalid("Missing payload", "rt");
    };

    if request.rt.is_empty() {
        return invalid("Missing reset token", "rt");
    }
    if request.password.is_empty() {
        return invalid("Password is required", "password");
    }
    if request.password != request.password_confirm {
        return invalid("Passwords do not match", "password_confirm");
    }

    let uid = request.username.trim();
    match state.recovery.redeem(uid, &request.rt, &request.password).await {
        Ok(()) => Ack::ok().into_response(),
        Err(err @ Error::ValidationFailed(_)) => error_response(&err, Some("username")),
        Err(err @ (Error::NotFound | Error::Expired | Error::AlreadyConsumed)) => {
            error_response(&err, Some("rt"))
        }
        Err(err) => error_response(&err, None),
    }
}
