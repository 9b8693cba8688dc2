//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Redirect to /stock or /auth/login
//! GET  /health                 - Health check
//!
//! # Auth
//! GET  /auth/login             - Login page
//! POST /auth/login             - Sign in
//! GET  /auth/register          - Register page
//! POST /auth/register          - Sign up
//! POST /auth/logout            - Sign out
//!
//! # Stock (requires a session)
//! GET  /stock                  - Stock grid
//! POST /stock                  - Add a row
//! POST /stock/selection        - Replace the delete selection (HTMX)
//! POST /stock/delete           - Confirm or perform a delete
//! POST /stock/{id}             - Commit an inline edit (returns row fragment)
//! ```

pub mod auth;
pub mod stock;

use std::time::Duration;

use axum::{
    Router,
    http::{Request, Response},
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::Session;
use tracing::{Span, warn};

use crate::middleware::{OptionalSession, create_session_layer};
use crate::models::{Flash, session_keys};
use crate::state::AppState;

/// Auth routes, nested under `/auth`.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
}

/// Stock grid routes, nested under `/stock`.
pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(stock::index).post(stock::create))
        .route("/selection", post(stock::select))
        .route("/delete", post(stock::delete))
        .route("/{id}", post(stock::edit))
}

/// Create all page routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .nest("/auth", auth_routes())
        .nest("/stock", stock_routes())
}

/// Build the complete application: routes, session layer and request tracing.
///
/// Sentry layers are added by the binary.
pub fn app(state: AppState) -> Router {
    let session_layer = create_session_layer(state.config());

    Router::new()
        .route("/health", get(health))
        .merge(routes())
        .layer(session_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

/// Liveness health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Send signed-in users to the grid and everyone else to the login page.
async fn home(current: OptionalSession) -> impl IntoResponse {
    if current.manager.current().is_some() {
        Redirect::to("/stock")
    } else {
        Redirect::to("/auth/login")
    }
}

/// Take the one-shot message stored by the previous request.
pub(crate) async fn take_flash(session: &Session) -> Option<Flash> {
    match session.remove::<Flash>(session_keys::FLASH).await {
        Ok(flash) => flash,
        Err(error) => {
            warn!(error = %error, "Failed to read flash message");
            None
        }
    }
}

/// Store a one-shot message for the next page.
pub(crate) async fn set_flash(session: &Session, flash: Flash) {
    if let Err(error) = session.insert(session_keys::FLASH, flash).await {
        warn!(error = %error, "Failed to store flash message");
    }
}
