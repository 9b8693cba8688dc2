//! Auth provider seam.
//!
//! [`AuthProvider`] is what the session manager talks to. The production
//! implementation is [`crate::supabase::SupabaseClient`]; tests plug in
//! in-memory fakes.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use stockroom_core::{Email, Identity};
use thiserror::Error;

/// Errors reported by an auth provider.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The provider refused the request (bad credentials, expired refresh
    /// token, email already registered, ...). Carries the provider's message.
    #[error("{0}")]
    Rejected(String),

    /// The provider could not be reached.
    #[error("auth provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with something we could not interpret.
    #[error("unexpected auth response: {0}")]
    InvalidResponse(String),
}

/// An authenticated identity together with the tokens that back it.
///
/// Tokens are kept out of `Debug` output. They are serialized in clear so the
/// session can be stored server-side (web) or in the user's session file (CLI).
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Who the tokens belong to.
    pub identity: Identity,
    /// Bearer token for row store requests.
    #[serde(with = "secret_string")]
    pub access_token: SecretString,
    /// Token used to obtain a fresh access token.
    #[serde(with = "secret_string")]
    pub refresh_token: SecretString,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("identity", &self.identity)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

impl AuthSession {
    /// Whether the access token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.identity.is_expired_at(Utc::now())
    }
}

/// Result of a sign-up request.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// Email confirmation is disabled; the account is signed in right away.
    SignedIn(AuthSession),
    /// A confirmation email was sent; nobody is signed in yet.
    ConfirmationSent,
}

/// Operations the session manager needs from an auth provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchange email and password for a session.
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, AuthError>;

    /// Register a new account.
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<SignUpOutcome, AuthError>;

    /// Revoke the session's tokens on the provider side.
    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError>;

    /// Obtain a fresh session from a refresh token.
    async fn refresh_session(&self, refresh_token: &SecretString)
    -> Result<AuthSession, AuthError>;

    /// Bring a stored session back to life.
    ///
    /// An unexpired session is returned as is; an expired one is refreshed.
    async fn get_session(&self, stored: &AuthSession) -> Result<AuthSession, AuthError> {
        if stored.is_expired() {
            self.refresh_session(&stored.refresh_token).await
        } else {
            Ok(stored.clone())
        }
    }
}

/// Serde helpers that expose a [`SecretString`] only while (de)serializing.
mod secret_string {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(secret.expose_secret())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
        String::deserialize(deserializer).map(SecretString::from)
    }
}
