use crate::{
    directory::StaffProfile,
    error::Error,
    staffio::{
        handlers::{error_response, invalid, session_uid, Ack, Failure},
        AppState,
    },
};
use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
pub struct ProfileUpdate {
    /// Current password; the write runs bound as the user.
    password: String,
    profile: StaffProfile,
}

#[utoipa::path(
    get,
    path = "/profile",
    responses (
        (status = 200, description = "Profile of the signed-in user", body = StaffProfile),
        (status = 401, description = "No live session", body = Failure),
    ),
    tag = "profile"
)]
#[instrument(skip(state, headers))]
pub async fn profile(Extension(state): Extension<Arc<AppState>>, headers: HeaderMap) -> Response {
    let uid = match session_uid(&state, &headers).await {
        Ok(uid) => uid,
        Err(response) => return response,
    };

    match state.directory.get(&uid).await {
        Ok(profile) => Json(profile).into_response(),
        Err(err) => error_response(&err, None),
    }
}

#[utoipa::path(
    post,
    path = "/profile",
    request_body = ProfileUpdate,
    responses (
        (status = 200, description = "Profile saved", body = Ack),
        (status = 400, description = "Profile belongs to someone else", body = Failure),
        (status = 401, description = "No live session or wrong password", body = Failure),
    ),
    tag = "profile"
)]
#[instrument(skip(state, headers, payload))]
pub async fn update(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<ProfileUpdate>>,
) -> Response {
    let uid = match session_uid(&state, &headers).await {
        Ok(uid) => uid,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return invalid("Missing payload", "profile");
    };

    match state
        .directory
        .modify_profile(&uid, &request.password, &request.profile)
        .await
    {
        Ok(()) => {
            info!("profile updated by {uid}");
            Ack::ok().into_response()
        }
        Err(err @ Error::InvalidCredentials) => error_response(&err, Some("password")),
        Err(err @ Error::ValidationFailed(_)) => error_response(&err, Some("uid")),
        Err(err) => error_response(&err, None),
    }
}
