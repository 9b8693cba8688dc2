//! GoTrue (`/auth/v1`) endpoints.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use stockroom_core::{AccountId, Email, Identity};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{SupabaseClient, SupabaseError, check_status};
use crate::services::auth::{AuthError, AuthProvider, AuthSession, SignUpOutcome};

/// Lifetime assumed when GoTrue omits both `expires_at` and `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: Uuid,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoTrueSession {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: GoTrueUser,
}

impl GoTrueSession {
    fn into_auth_session(self, now: DateTime<Utc>) -> Result<AuthSession, SupabaseError> {
        let raw_email = self
            .user
            .email
            .ok_or_else(|| SupabaseError::Response("user has no email".to_string()))?;
        let email = Email::parse(&raw_email)
            .map_err(|e| SupabaseError::Response(format!("user email: {e}")))?;

        let expires_at = match self.expires_at.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
            Some(at) => at,
            None => {
                let lifetime = self.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
                Duration::try_seconds(lifetime)
                    .and_then(|d| now.checked_add_signed(d))
                    .ok_or_else(|| {
                        SupabaseError::Response(format!("token lifetime out of range: {lifetime}s"))
                    })?
            }
        };

        Ok(AuthSession {
            identity: Identity::new(AccountId::new(self.user.id), email, expires_at),
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
        })
    }
}

/// Interpret a sign-up response.
///
/// With email confirmation disabled GoTrue returns a full session; otherwise
/// it returns the bare user and sends a confirmation email.
fn parse_sign_up(body: serde_json::Value, now: DateTime<Utc>) -> Result<SignUpOutcome, SupabaseError> {
    if body.get("access_token").is_some() {
        let session: GoTrueSession =
            serde_json::from_value(body).map_err(|e| SupabaseError::Response(e.to_string()))?;
        return Ok(SignUpOutcome::SignedIn(session.into_auth_session(now)?));
    }
    Ok(SignUpOutcome::ConfirmationSent)
}

impl SupabaseClient {
    /// `POST /auth/v1/token?grant_type=...`
    async fn token_grant<B: Serialize + Sync>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> Result<AuthSession, SupabaseError> {
        let mut url = self.endpoint(&["auth", "v1", "token"])?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        let response = self
            .client
            .post(url)
            .header("apikey", self.anon_key())
            .json(body)
            .send()
            .await
            .map_err(|e| SupabaseError::Request(e.to_string()))?;

        let session: GoTrueSession = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| SupabaseError::Response(e.to_string()))?;

        session.into_auth_session(Utc::now())
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or GoTrue rejects the credentials.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn password_sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, SupabaseError> {
        let session = self
            .token_grant(
                "password",
                &PasswordCredentials {
                    email: email.as_str(),
                    password: password.expose_secret(),
                },
            )
            .await?;
        debug!(account_id = %session.identity.account_id, "Signed in");
        Ok(session)
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or GoTrue rejects the sign-up.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn password_sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<SignUpOutcome, SupabaseError> {
        let url = self.endpoint(&["auth", "v1", "signup"])?;

        let response = self
            .client
            .post(url)
            .header("apikey", self.anon_key())
            .json(&PasswordCredentials {
                email: email.as_str(),
                password: password.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| SupabaseError::Request(e.to_string()))?;

        let body: serde_json::Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| SupabaseError::Response(e.to_string()))?;

        parse_sign_up(body, Utc::now())
    }

    /// Exchange a refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the refresh token is no longer valid.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<AuthSession, SupabaseError> {
        self.token_grant(
            "refresh_token",
            &RefreshGrant {
                refresh_token: refresh_token.expose_secret(),
            },
        )
        .await
    }

    /// Revoke the session's refresh tokens.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or GoTrue rejects the token.
    #[instrument(skip_all, fields(account_id = %session.identity.account_id))]
    pub async fn logout(&self, session: &AuthSession) -> Result<(), SupabaseError> {
        let url = self.endpoint(&["auth", "v1", "logout"])?;

        let response = self
            .client
            .post(url)
            .header("apikey", self.anon_key())
            .bearer_auth(session.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| SupabaseError::Request(e.to_string()))?;

        check_status(response).await?;
        Ok(())
    }
}

impl From<SupabaseError> for AuthError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Api { message, .. } => Self::Rejected(message),
            SupabaseError::Request(msg) | SupabaseError::InvalidUrl(msg) => Self::Unavailable(msg),
            SupabaseError::Response(msg) => Self::InvalidResponse(msg),
        }
    }
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, AuthError> {
        Ok(self.password_sign_in(email, password).await?)
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<SignUpOutcome, AuthError> {
        Ok(self.password_sign_up(email, password).await?)
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError> {
        Ok(self.logout(session).await?)
    }

    async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, AuthError> {
        Ok(self.refresh(refresh_token).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;
    use serde_json::json;

    use super::*;

    fn session_body() -> serde_json::Value {
        json!({
            "access_token": "jwt-access",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "refresh_token": "refresh-1",
            "user": {
                "id": "7d0e4c5e-6b7a-4d4e-9d6f-3b7d1c2a9e10",
                "email": "Owner@Shop.test",
                "aud": "authenticated"
            }
        })
    }

    #[test]
    fn test_session_keeps_reported_email_case() {
        let session: GoTrueSession = serde_json::from_value(session_body()).unwrap();
        let session = session.into_auth_session(Utc::now()).unwrap();
        assert_eq!(session.identity.email.as_str(), "Owner@Shop.test");
        assert_eq!(session.access_token.expose_secret(), "jwt-access");
        assert_eq!(session.identity.expires_at.timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_session_expiry_falls_back_to_expires_in() {
        let mut body = session_body();
        body.as_object_mut().unwrap().remove("expires_at");
        let now = Utc::now();
        let session: GoTrueSession = serde_json::from_value(body).unwrap();
        let session = session.into_auth_session(now).unwrap();
        assert_eq!(session.identity.expires_at, now + Duration::seconds(3600));
    }

    #[test]
    fn test_session_with_out_of_range_lifetime_is_refused() {
        let mut body = session_body();
        body.as_object_mut().unwrap().remove("expires_at");
        body["expires_in"] = json!(i64::MAX);
        let session: GoTrueSession = serde_json::from_value(body).unwrap();
        assert!(matches!(
            session.into_auth_session(Utc::now()),
            Err(SupabaseError::Response(_))
        ));
    }

    #[test]
    fn test_session_without_email_is_rejected() {
        let mut body = session_body();
        body["user"].as_object_mut().unwrap().remove("email");
        let session: GoTrueSession = serde_json::from_value(body).unwrap();
        assert!(matches!(
            session.into_auth_session(Utc::now()),
            Err(SupabaseError::Response(_))
        ));
    }

    #[test]
    fn test_sign_up_with_session_signs_in() {
        let outcome = parse_sign_up(session_body(), Utc::now()).unwrap();
        assert!(matches!(outcome, SignUpOutcome::SignedIn(_)));
    }

    #[test]
    fn test_sign_up_without_session_needs_confirmation() {
        let body = json!({
            "id": "7d0e4c5e-6b7a-4d4e-9d6f-3b7d1c2a9e10",
            "email": "new@shop.test",
            "confirmation_sent_at": "2024-05-01T10:00:00Z"
        });
        let outcome = parse_sign_up(body, Utc::now()).unwrap();
        assert!(matches!(outcome, SignUpOutcome::ConfirmationSent));
    }

    #[test]
    fn test_error_mapping() {
        let err: AuthError = SupabaseError::Api {
            status: 400,
            message: "Invalid login credentials".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Invalid login credentials");

        let err: AuthError = SupabaseError::Request("connection refused".to_string()).into();
        assert!(matches!(err, AuthError::Unavailable(_)));
    }
}
