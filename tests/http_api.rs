mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use common::{directory, seed_user};
use serde_json::{json, Value};
use staffio::cas::{MemoryTicketStore, TicketAuthority, TicketConfig};
use staffio::notify::{Notifier, ResetNotice};
use staffio::recovery::{MemoryResetTokenStore, PasswordRecovery};
use staffio::staffio::{router, AppState, WebConfig};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const BASE_URL: &str = "https://sso.example.org";

#[derive(Default)]
struct Outbox {
    notices: Mutex<Vec<ResetNotice>>,
}

impl Notifier for Outbox {
    fn send(&self, notice: &ResetNotice) -> anyhow::Result<()> {
        self.notices
            .lock()
            .map_err(|_| anyhow::anyhow!("outbox poisoned"))?
            .push(notice.clone());
        Ok(())
    }
}

impl Outbox {
    fn last_url(&self) -> Option<String> {
        self.notices
            .lock()
            .ok()
            .and_then(|notices| notices.last().map(|notice| notice.reset_url.clone()))
    }
}

async fn app() -> (Router, Arc<Outbox>) {
    let (backend, store) = directory().await;
    seed_user(&backend, "alice", "pw").await;
    seed_user(&backend, "root", "root-pw").await;

    let tickets = Arc::new(TicketAuthority::new(
        Arc::new(MemoryTicketStore::new()),
        TicketConfig::new(),
    ));
    let recovery = Arc::new(PasswordRecovery::new(
        Arc::new(MemoryResetTokenStore::new()),
        store.clone(),
    ));
    let outbox = Arc::new(Outbox::default());
    let state = Arc::new(AppState {
        directory: store,
        tickets,
        recovery,
        notifier: outbox.clone(),
        config: WebConfig::new(BASE_URL.to_string()).with_admins(vec!["root".to_string()]),
    });
    (router(state), outbox)
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    match app.clone().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap_or_default();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap_or_default()
}

fn send_json(method: &str, uri: &str, cookie: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(body.to_string()))
        .unwrap_or_default()
}

fn header_value(response: &Response, name: header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// `staffio_tgc=<value>` from a login response.
async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = send(
        app,
        send_json(
            "POST",
            "/login",
            None,
            &json!({ "username": username, "password": password }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    header_value(&response, header::SET_COOKIE)
        .split(';')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn health_reports_name_and_request_id() {
    let (app, _) = app().await;
    let response = send(&app, get("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!header_value(&response, header::HeaderName::from_static("x-request-id")).is_empty());
    let body = json_body(response).await;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
}

#[tokio::test]
async fn login_for_a_service_then_validate_once() {
    let (app, _) = app().await;
    let response = send(
        &app,
        send_json(
            "POST",
            "/login",
            None,
            &json!({ "username": "alice", "password": "pw", "service": "https://svc" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = header_value(&response, header::SET_COOKIE);
    assert!(cookie.starts_with("staffio_tgc=TGT-"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Secure"));

    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    let referer = body["referer"].as_str().unwrap_or_default().to_string();
    let ticket = referer
        .strip_prefix("https://svc?ticket=")
        .unwrap_or_default()
        .to_string();
    assert!(ticket.starts_with("ST-"));

    let uri = format!("/serviceValidate?ticket={ticket}&service=https%3A%2F%2Fsvc");
    let response = send(&app, get(&uri, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["uid"], "alice");

    let response = send(&app, get(&uri, None)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"]["code"], "ALREADY_CONSUMED");
}

#[tokio::test]
async fn wrong_password_is_reported_on_the_password_field() {
    let (app, _) = app().await;
    let response = send(
        &app,
        send_json(
            "POST",
            "/login",
            None,
            &json!({ "username": "alice", "password": "nope" }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(header_value(&response, header::SET_COOKIE).is_empty());
    let body = json_body(response).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["field"], "password");
}

#[tokio::test]
async fn signed_in_browser_is_sent_straight_to_the_service() {
    let (app, _) = app().await;
    let cookie = login(&app, "alice", "pw").await;

    let response = send(
        &app,
        get("/login?service=https%3A%2F%2Fwiki.example.org%2F", Some(&cookie)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(header_value(&response, header::LOCATION)
        .starts_with("https://wiki.example.org/?ticket=ST-"));
}

#[tokio::test]
async fn logout_clears_the_session() {
    let (app, _) = app().await;
    let cookie = login(&app, "alice", "pw").await;

    let response = send(&app, get("/logout", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(header_value(&response, header::LOCATION), "/");
    assert!(header_value(&response, header::SET_COOKIE).contains("Max-Age=0"));

    let response = send(&app, get("/login", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ok"], false);
}

#[tokio::test]
async fn forgot_and_reset_password() {
    let (app, outbox) = app().await;

    let response = send(
        &app,
        send_json(
            "POST",
            "/password/forgot",
            None,
            &json!({ "username": "alice", "email": "other@example.org", "mobile": "13800000000" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["field"], "email");
    assert!(outbox.last_url().is_none());

    let response = send(
        &app,
        send_json(
            "POST",
            "/password/forgot",
            None,
            &json!({ "username": "alice", "email": "alice@example.org", "mobile": "13800000000" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let url = outbox.last_url().unwrap_or_default();
    let prefix = format!("{BASE_URL}/password/reset?rt=");
    assert!(url.starts_with(&prefix));
    let rt = url.trim_start_matches(&prefix).to_string();

    let response = send(&app, get(&format!("/password/reset?rt={rt}"), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["uid"], "alice");

    let response = send(
        &app,
        send_json(
            "POST",
            "/password/reset",
            None,
            &json!({ "rt": rt, "username": "alice", "password": "n3w", "password_confirm": "other" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["field"], "password_confirm");

    let response = send(
        &app,
        send_json(
            "POST",
            "/password/reset",
            None,
            &json!({ "rt": rt, "username": "alice", "password": "n3w", "password_confirm": "n3w" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    login(&app, "alice", "n3w").await;

    let response = send(&app, get(&format!("/password/reset?rt={rt}"), None)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn change_password_reports_old_password_field() {
    let (app, _) = app().await;
    let response = send(
        &app,
        send_json(
            "POST",
            "/password/change",
            None,
            &json!({ "username": "alice", "old_password": "bad", "new_password": "n3w" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"]["field"], "old_password");
}

#[tokio::test]
async fn profile_requires_a_session() {
    let (app, _) = app().await;

    let response = send(&app, get("/profile", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cookie = login(&app, "alice", "pw").await;
    let response = send(&app, get("/profile", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["uid"], "alice");
    assert_eq!(body["email"], "alice@example.org");

    let response = send(
        &app,
        send_json(
            "POST",
            "/profile",
            Some(&cookie),
            &json!({ "password": "pw", "profile": { "uid": "root", "surname": "X", "given_name": "Y", "email": "x@example.org" } }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["field"], "uid");
}

#[tokio::test]
async fn staff_admin_is_gated() {
    let (app, _) = app().await;

    let response = send(&app, get("/staff", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let alice = login(&app, "alice", "pw").await;
    let response = send(&app, get("/staff", Some(&alice))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let root = login(&app, "root", "root-pw").await;
    let response = send(
        &app,
        send_json(
            "PUT",
            "/staff",
            Some(&root),
            &json!({ "uid": "bob", "surname": "Lee", "given_name": "Bob", "email": "bob@example.org" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["created"], true);

    let response = send(&app, get("/staff", Some(&root))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["total"], 3);

    let response = send(&app, get("/staff/bob", Some(&root))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["common_name"], "Bob Lee");

    let response = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/staff/bob")
            .header(header::COOKIE, &root)
            .body(Body::empty())
            .unwrap_or_default(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get("/staff/bob", Some(&root))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
