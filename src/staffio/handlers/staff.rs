use crate::{
    directory::StaffProfile,
    staffio::{
        handlers::{admin_uid, error_response, invalid, Ack, Failure},
        AppState,
    },
};
use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Debug)]
pub struct StaffList {
    ok: bool,
    total: usize,
    staffs: Vec<StaffProfile>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct StoreResult {
    ok: bool,
    /// Whether a new record was created.
    created: bool,
}

#[utoipa::path(
    get,
    path = "/staff",
    responses (
        (status = 200, description = "Every person in the directory", body = StaffList),
        (status = 401, description = "No live session", body = Failure),
        (status = 403, description = "Not an administrator", body = Failure),
    ),
    tag = "staff"
)]
#[instrument(skip(state, headers))]
pub async fn list(Extension(state): Extension<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(response) = admin_uid(&state, &headers).await {
        return response;
    }

    match state.directory.list_page().await {
        Ok(staffs) => Json(StaffList {
            ok: true,
            total: staffs.len(),
            staffs,
        })
        .into_response(),
        Err(err) => error_response(&err, None),
    }
}

#[utoipa::path(
    get,
    path = "/staff/{uid}",
    params(("uid" = String, Path, description = "Directory uid")),
    responses (
        (status = 200, description = "Profile", body = StaffProfile),
        (status = 404, description = "No such person", body = Failure),
    ),
    tag = "staff"
)]
#[instrument(skip(state, headers))]
pub async fn get(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> Response {
    if let Err(response) = admin_uid(&state, &headers).await {
        return response;
    }

    match state.directory.get(&uid).await {
        Ok(profile) => Json(profile).into_response(),
        Err(err) => error_response(&err, Some("uid")),
    }
}

#[utoipa::path(
    put,
    path = "/staff",
    request_body = StaffProfile,
    responses (
        (status = 200, description = "Existing record updated", body = StoreResult),
        (status = 201, description = "New record created", body = StoreResult),
        (status = 400, description = "Invalid profile", body = Failure),
    ),
    tag = "staff"
)]
#[instrument(skip(state, headers, payload))]
pub async fn store(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<StaffProfile>>,
) -> Response {
    let admin = match admin_uid(&state, &headers).await {
        Ok(uid) => uid,
        Err(response) => return response,
    };
    let Some(Json(profile)) = payload else {
        return invalid("Missing payload", "uid");
    };

    match state.directory.store_or_update(&profile).await {
        Ok(created) => {
            info!("staff {} stored by {admin} (created: {created})", profile.uid);
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(StoreResult { ok: true, created })).into_response()
        }
        Err(err) => error_response(&err, Some("uid")),
    }
}

#[utoipa::path(
    delete,
    path = "/staff/{uid}",
    params(("uid" = String, Path, description = "Directory uid")),
    responses (
        (status = 200, description = "Record deleted", body = Ack),
        (status = 404, description = "No such person", body = Failure),
    ),
    tag = "staff"
)]
#[instrument(skip(state, headers))]
pub async fn delete(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> Response {
    let admin = match admin_uid(&state, &headers).await {
        Ok(uid) => uid,
        Err(response) => return response,
    };

    match state.directory.delete(&uid).await {
        Ok(()) => {
            info!("staff {uid} deleted by {admin}");
            Ack::ok().into_response()
        }
        Err(err) => error_response(&err, Some("uid")),
    }
}
