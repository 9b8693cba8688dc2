//! Authentication extractors.
//!
//! Each request mounts its own [`SessionManager`] from the Supabase session
//! stored in the tower session. Mounting refreshes an expired access token;
//! the refreshed tokens are written back so the next request starts from
//! them. A session that cannot be restored is dropped.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use secrecy::ExposeSecret;
use stockroom_core::{Capability, Identity};
use tower_sessions::Session;

use crate::models::session_keys;
use crate::services::{AuthSession, SessionManager};
use crate::state::AppState;

/// Extractor that requires a signed-in session.
///
/// Redirects to the login page when nobody is signed in. HTMX requests get
/// `401` with an `HX-Redirect` header instead, so the whole page navigates.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(current: RequireSession) -> impl IntoResponse {
///     format!("Hello, {}!", current.identity.email)
/// }
/// ```
pub struct RequireSession {
    /// Session manager mounted for this request.
    pub manager: SessionManager,
    /// The signed-in identity.
    pub identity: Identity,
    /// Capability derived for this request.
    pub capability: Capability,
    /// The underlying tower session.
    pub session: Session,
}

/// Error returned when a session is required but nobody is signed in.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to login page (for page requests).
    RedirectToLogin,
    /// Unauthorized response that tells HTMX to navigate to the login page.
    Unauthorized,
    /// The session layer is missing or the session store failed.
    SessionUnavailable,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/auth/login").into_response(),
            Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, [("HX-Redirect", "/auth/login")]).into_response()
            }
            Self::SessionUnavailable => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Whether the request was issued by HTMX.
fn is_htmx(parts: &Parts) -> bool {
    parts.headers.contains_key("HX-Request")
}

/// Mount a session manager from the tower session and write back changes.
async fn mount(state: &AppState, session: &Session) -> Result<SessionManager, AuthRejection> {
    let stored: Option<AuthSession> = session
        .get(session_keys::AUTH_SESSION)
        .await
        .map_err(|_| AuthRejection::SessionUnavailable)?;
    let stored_token = stored
        .as_ref()
        .map(|s| s.access_token.expose_secret().to_owned());

    let manager = SessionManager::mount(state.auth(), stored).await;

    let mounted_token = manager
        .session()
        .map(|s| s.access_token.expose_secret().to_owned());
    if mounted_token != stored_token {
        persist_session(session, &manager)
            .await
            .map_err(|_| AuthRejection::SessionUnavailable)?;
    }

    Ok(manager)
}

impl FromRequestParts<AppState> for RequireSession {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AuthRejection::SessionUnavailable)?;

        let manager = mount(state, &session).await?;

        let Some(identity) = manager.current() else {
            return Err(if is_htmx(parts) {
                AuthRejection::Unauthorized
            } else {
                AuthRejection::RedirectToLogin
            });
        };
        let capability = state.policy().capability(&identity);

        Ok(Self {
            manager,
            identity,
            capability,
            session,
        })
    }
}

/// Extractor that mounts the session without requiring anyone signed in.
pub struct OptionalSession {
    /// Session manager mounted for this request.
    pub manager: SessionManager,
    /// The underlying tower session.
    pub session: Session,
}

impl FromRequestParts<AppState> for OptionalSession {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or(AuthRejection::SessionUnavailable)?;

        let manager = mount(state, &session).await?;

        Ok(Self { manager, session })
    }
}

/// Store the manager's current session in the tower session, or remove it
/// when nobody is signed in.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn persist_session(
    session: &Session,
    manager: &SessionManager,
) -> Result<(), tower_sessions::session::Error> {
    match manager.session() {
        Some(auth_session) => {
            session
                .insert(session_keys::AUTH_SESSION, auth_session)
                .await
        }
        None => {
            session
                .remove::<AuthSession>(session_keys::AUTH_SESSION)
                .await?;
            Ok(())
        }
    }
}
