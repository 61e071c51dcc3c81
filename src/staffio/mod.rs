//! HTTP surface: SSO login, service validation, password flows, profile
//! self-service and staff administration.

use crate::{
    cas::TicketAuthority, directory::DirectoryStore, notify::Notifier,
    recovery::PasswordRecovery,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug, error, info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod handlers;
mod openapi;

pub use handlers::TGT_COOKIE_NAME;
pub use openapi::ApiDoc;

/// Web-facing settings that are not owned by the domain services.
#[derive(Clone, Debug)]
pub struct WebConfig {
    base_url: String,
    admins: Vec<String>,
}

impl WebConfig {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            admins: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_admins(mut self, admins: Vec<String>) -> Self {
        self.admins = admins;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Cookies carry `Secure` only when the public URL is HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    #[must_use]
    pub fn is_admin(&self, uid: &str) -> bool {
        self.admins.iter().any(|admin| admin == uid)
    }
}

/// Everything the handlers need, shared through an `Extension`.
pub struct AppState {
    pub directory: Arc<DirectoryStore>,
    pub tickets: Arc<TicketAuthority>,
    pub recovery: Arc<PasswordRecovery>,
    pub notifier: Arc<dyn Notifier>,
    pub config: WebConfig,
}

/// Build the application router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
        .route(
            "/login",
            get(handlers::sso::login_form).post(handlers::sso::login),
        )
        .route("/logout", get(handlers::sso::logout))
        .route("/serviceValidate", get(handlers::sso::service_validate))
        .route("/password/change", post(handlers::password::change))
        .route("/password/forgot", post(handlers::password::forgot))
        .route(
            "/password/reset",
            get(handlers::password::reset_form).post(handlers::password::reset),
        )
        .route(
            "/profile",
            get(handlers::profile::profile).post(handlers::profile::update),
        )
        .route(
            "/staff",
            get(handlers::staff::list).put(handlers::staff::store),
        )
        .route(
            "/staff/:uid",
            get(handlers::staff::get).delete(handlers::staff::delete),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(port: u16, state: Arc<AppState>, sweep_interval: Duration) -> Result<()> {
    let sweeper = spawn_sweeper(state.clone(), sweep_interval);

    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    sweeper.abort();

    Ok(())
}

/// Periodically drop expired tickets and reset tokens.
///
/// Expiry is enforced on every lookup regardless; the sweep only bounds
/// storage.
pub fn spawn_sweeper(state: Arc<AppState>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;

            match state.tickets.purge_expired().await {
                Ok(0) => {}
                Ok(count) => debug!("purged {count} expired tickets"),
                Err(err) => error!("ticket sweep failed: {err}"),
            }

            match state.recovery.purge_expired().await {
                Ok(0) => {}
                Ok(count) => debug!("purged {count} expired reset tokens"),
                Err(err) => error!("reset token sweep failed: {err}"),
            }
        }
    })
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
