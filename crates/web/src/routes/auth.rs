//! Authentication route handlers.
//!
//! Handles login, registration and logout against the Supabase auth API.
//! The signed-in Supabase session is kept in the tower session.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use secrecy::SecretString;
use serde::Deserialize;
use stockroom_core::Email;
use tracing::{instrument, warn};

use super::{set_flash, take_flash};
use crate::error::{AppError, set_sentry_user};
use crate::filters;
use crate::middleware::{OptionalSession, persist_session};
use crate::models::Flash;
use crate::services::{AuthError, Registration, SessionError};

/// Shown for every failed sign-in, whatever the provider said.
const SIGN_IN_FAILED: &str = "Incorrect email or password";

// =============================================================================
// Form Types
// =============================================================================

/// Login and registration form data.
#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    pub email: String,
    pub password: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub email: String,
    pub flash: Option<Flash>,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub email: String,
    pub flash: Option<Flash>,
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(current: OptionalSession) -> Response {
    if current.manager.current().is_some() {
        return Redirect::to("/stock").into_response();
    }

    LoginTemplate {
        email: String::new(),
        flash: take_flash(&current.session).await,
    }
    .into_response()
}

/// Handle login form submission.
///
/// On success the session id is cycled and the Supabase session stored.
#[instrument(skip(current, form), fields(email = %form.email))]
pub async fn login(
    current: OptionalSession,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    let Ok(email) = Email::parse(&form.email) else {
        return Ok(login_failed(form.email, SIGN_IN_FAILED));
    };
    let password = SecretString::from(form.password);

    match current.manager.sign_in(&email, &password).await {
        Ok(identity) => {
            current.session.cycle_id().await?;
            persist_session(&current.session, &current.manager).await?;
            set_sentry_user(&identity.account_id.to_string(), identity.email.as_str());
            Ok(Redirect::to("/stock").into_response())
        }
        Err(SessionError::Auth(AuthError::Rejected(message))) => {
            warn!(reason = %message, "Sign-in rejected");
            Ok(login_failed(form.email, SIGN_IN_FAILED))
        }
        Err(error) => {
            warn!(error = %error, "Sign-in failed");
            Ok(login_failed(
                form.email,
                "Sign-in is unavailable right now, please try again",
            ))
        }
    }
}

fn login_failed(email: String, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        LoginTemplate {
            email,
            flash: Some(Flash::error(message)),
        },
    )
        .into_response()
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(current: OptionalSession) -> Response {
    if current.manager.current().is_some() {
        return Redirect::to("/stock").into_response();
    }

    RegisterTemplate {
        email: String::new(),
        flash: take_flash(&current.session).await,
    }
    .into_response()
}

/// Handle registration form submission.
///
/// When the provider signs the new account in right away the user lands on
/// the grid; otherwise they are asked to confirm their email.
#[instrument(skip(current, form), fields(email = %form.email))]
pub async fn register(
    current: OptionalSession,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    let email = match Email::parse(&form.email) {
        Ok(email) => email,
        Err(error) => {
            return Ok(register_failed(form.email, error.to_string()));
        }
    };
    let password = SecretString::from(form.password);

    match current.manager.sign_up(&email, &password).await {
        Ok(Registration::SignedIn(identity)) => {
            current.session.cycle_id().await?;
            persist_session(&current.session, &current.manager).await?;
            set_sentry_user(&identity.account_id.to_string(), identity.email.as_str());
            Ok(Redirect::to("/stock").into_response())
        }
        Ok(Registration::ConfirmationSent) => Ok(RegisterTemplate {
            email: String::new(),
            flash: Some(Flash::notice(
                "Account created! Check your email, or sign in if email confirmation is disabled.",
            )),
        }
        .into_response()),
        Err(error) => {
            warn!(error = %error, "Sign-up failed");
            Ok(register_failed(form.email, error.to_string()))
        }
    }
}

fn register_failed(email: String, message: String) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        RegisterTemplate {
            email,
            flash: Some(Flash::error(message)),
        },
    )
        .into_response()
}

// =============================================================================
// Logout
// =============================================================================

/// Handle logout.
///
/// The local session is cleared even when the provider cannot be reached.
#[instrument(skip(current))]
pub async fn logout(current: OptionalSession) -> Result<Response, AppError> {
    if current.manager.current().is_some()
        && let Err(error) = current.manager.sign_out().await
    {
        warn!(error = %error, "Sign-out failed at the provider");
    }

    current.session.flush().await?;
    set_flash(&current.session, Flash::notice("Signed out")).await;

    Ok(Redirect::to("/auth/login").into_response())
}
