//! Session manager.
//!
//! Tracks which identity (if any) is signed in and publishes every change to
//! subscribers. The state lives in a [`tokio::sync::watch`] channel: a change
//! is stored before the mutating call returns, so every live subscription
//! observes it without further coordination.

use std::sync::Arc;

use secrecy::SecretString;
use stockroom_core::{AccessPolicy, Capability, Email, Identity};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use super::auth::{AuthError, AuthProvider, AuthSession, SignUpOutcome};

/// Errors from session operations.
///
/// A failed operation leaves the session state untouched.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The operation needs a signed-in session.
    #[error("not signed in")]
    NotSignedIn,

    /// The auth provider refused or failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// What happened after a sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The new account is signed in.
    SignedIn(Identity),
    /// A confirmation email was sent; still signed out.
    ConfirmationSent,
}

/// Live view of the session state.
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct SessionSubscription {
    receiver: watch::Receiver<Option<AuthSession>>,
}

impl SessionSubscription {
    /// The identity as last published.
    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.receiver
            .borrow()
            .as_ref()
            .map(|session| session.identity.clone())
    }

    /// Wait for the next change and return the new session.
    ///
    /// Returns `None` once the manager is gone and every change has been seen.
    pub async fn changed(&mut self) -> Option<Option<AuthSession>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

/// Owner of the current authenticated session.
pub struct SessionManager {
    auth: Arc<dyn AuthProvider>,
    state: watch::Sender<Option<AuthSession>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("identity", &self.current())
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager with nobody signed in.
    #[must_use]
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        let (state, _) = watch::channel(None);
        Self { auth, state }
    }

    /// Create a manager and check whether `stored` is still usable.
    ///
    /// This is the single existence check performed on start-up. Any failure
    /// means "no session"; it is logged and never retried.
    #[instrument(skip_all, fields(has_stored = stored.is_some()))]
    pub async fn mount(auth: Arc<dyn AuthProvider>, stored: Option<AuthSession>) -> Self {
        let manager = Self::new(auth);

        if let Some(stored) = stored {
            match manager.auth.get_session(&stored).await {
                Ok(session) => {
                    manager.state.send_replace(Some(session));
                }
                Err(error) => {
                    warn!(
                        account_id = %stored.identity.account_id,
                        error = %error,
                        "Stored session could not be restored"
                    );
                }
            }
        }

        manager
    }

    /// The signed-in identity, if any.
    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.state
            .borrow()
            .as_ref()
            .map(|session| session.identity.clone())
    }

    /// The full session including tokens, if any.
    #[must_use]
    pub fn session(&self) -> Option<AuthSession> {
        self.state.borrow().clone()
    }

    /// Subscribe to session changes.
    #[must_use]
    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            receiver: self.state.subscribe(),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.receiver_count()
    }

    /// Capability of the signed-in identity, recomputed on every call.
    #[must_use]
    pub fn capability(&self, policy: &AccessPolicy) -> Option<Capability> {
        self.current().map(|identity| policy.capability(&identity))
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Auth`] when the provider rejects the attempt.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Identity, SessionError> {
        let session = self.auth.sign_in_with_password(email, password).await?;
        let identity = session.identity.clone();
        self.state.send_replace(Some(session));
        info!(account_id = %identity.account_id, "Signed in");
        Ok(identity)
    }

    /// Register a new account.
    ///
    /// Signs the account in when the provider hands back a session right away.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Auth`] when the provider rejects the sign-up.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Registration, SessionError> {
        match self.auth.sign_up(email, password).await? {
            SignUpOutcome::SignedIn(session) => {
                let identity = session.identity.clone();
                self.state.send_replace(Some(session));
                info!(account_id = %identity.account_id, "Registered and signed in");
                Ok(Registration::SignedIn(identity))
            }
            SignUpOutcome::ConfirmationSent => {
                info!("Registered, confirmation email sent");
                Ok(Registration::ConfirmationSent)
            }
        }
    }

    /// Sign out of the current session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotSignedIn`] without a session, or
    /// [`SessionError::Auth`] when the provider fails.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let session = self.session().ok_or(SessionError::NotSignedIn)?;
        self.auth.sign_out(&session).await?;
        self.state.send_replace(None);
        info!(account_id = %session.identity.account_id, "Signed out");
        Ok(())
    }

    /// Rotate the current session's tokens.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotSignedIn`] without a session, or
    /// [`SessionError::Auth`] when the refresh token is refused.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Identity, SessionError> {
        let current = self.session().ok_or(SessionError::NotSignedIn)?;
        let session = self.auth.refresh_session(&current.refresh_token).await?;
        let identity = session.identity.clone();
        self.state.send_replace(Some(session));
        Ok(identity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use secrecy::ExposeSecret;
    use stockroom_core::AccountId;
    use uuid::Uuid;

    use super::*;

    fn session_for(email: &str, lifetime: Duration, token: &str) -> AuthSession {
        AuthSession {
            identity: Identity::new(
                AccountId::new(Uuid::new_v4()),
                Email::parse(email).unwrap(),
                Utc::now() + lifetime,
            ),
            access_token: SecretString::from(format!("access-{token}")),
            refresh_token: SecretString::from(format!("refresh-{token}")),
        }
    }

    /// Accepts `pw` for any email; refreshes only `refresh-ok`.
    #[derive(Default)]
    struct FakeAuth {
        confirm_sign_ups: bool,
        fail_sign_out: bool,
        refreshes: AtomicUsize,
        signed_out: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AuthProvider for FakeAuth {
        async fn sign_in_with_password(
            &self,
            email: &Email,
            password: &SecretString,
        ) -> Result<AuthSession, AuthError> {
            if password.expose_secret() == "pw" {
                Ok(session_for(email.as_str(), Duration::hours(1), "ok"))
            } else {
                Err(AuthError::Rejected("Invalid login credentials".to_string()))
            }
        }

        async fn sign_up(
            &self,
            email: &Email,
            _password: &SecretString,
        ) -> Result<SignUpOutcome, AuthError> {
            if self.confirm_sign_ups {
                Ok(SignUpOutcome::ConfirmationSent)
            } else {
                Ok(SignUpOutcome::SignedIn(session_for(
                    email.as_str(),
                    Duration::hours(1),
                    "ok",
                )))
            }
        }

        async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError> {
            if self.fail_sign_out {
                return Err(AuthError::Unavailable("offline".to_string()));
            }
            self.signed_out
                .lock()
                .unwrap()
                .push(session.identity.email.to_string());
            Ok(())
        }

        async fn refresh_session(
            &self,
            refresh_token: &SecretString,
        ) -> Result<AuthSession, AuthError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if refresh_token.expose_secret() == "refresh-ok" {
                Ok(session_for("owner@shop.test", Duration::hours(1), "rotated"))
            } else {
                Err(AuthError::Rejected("Invalid Refresh Token".to_string()))
            }
        }
    }

    fn owner() -> Email {
        Email::parse("owner@shop.test").unwrap()
    }

    fn pw(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[tokio::test]
    async fn test_new_manager_has_no_session() {
        let manager = SessionManager::new(Arc::new(FakeAuth::default()));
        assert!(manager.current().is_none());
        assert!(manager.session().is_none());
    }

    #[tokio::test]
    async fn test_mount_restores_unexpired_session_without_refresh() {
        let auth = Arc::new(FakeAuth::default());
        let stored = session_for("owner@shop.test", Duration::hours(1), "ok");
        let manager = SessionManager::mount(auth.clone(), Some(stored.clone())).await;

        assert_eq!(manager.current(), Some(stored.identity));
        assert_eq!(auth.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mount_refreshes_expired_session() {
        let auth = Arc::new(FakeAuth::default());
        let stored = session_for("owner@shop.test", Duration::hours(-1), "ok");
        let manager = SessionManager::mount(auth.clone(), Some(stored)).await;

        let session = manager.session().unwrap();
        assert_eq!(session.access_token.expose_secret(), "access-rotated");
        assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_existence_check_mounts_with_no_session() {
        let auth = Arc::new(FakeAuth::default());
        let stored = session_for("owner@shop.test", Duration::hours(-1), "revoked");
        let manager = SessionManager::mount(auth.clone(), Some(stored)).await;

        assert!(manager.current().is_none());
        assert_eq!(auth.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sign_in_publishes_to_subscribers() {
        let manager = SessionManager::new(Arc::new(FakeAuth::default()));
        let mut subscription = manager.subscribe();
        assert!(subscription.current().is_none());

        let identity = manager.sign_in(&owner(), &pw("pw")).await.unwrap();

        assert_eq!(subscription.current(), Some(identity.clone()));
        let published = subscription.changed().await.unwrap().unwrap();
        assert_eq!(published.identity, identity);
    }

    #[tokio::test]
    async fn test_failed_sign_in_leaves_no_session() {
        let manager = SessionManager::new(Arc::new(FakeAuth::default()));
        let err = manager.sign_in(&owner(), &pw("wrong")).await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_clears_and_publishes() {
        let auth = Arc::new(FakeAuth::default());
        let manager = SessionManager::new(auth.clone());
        manager.sign_in(&owner(), &pw("pw")).await.unwrap();
        let subscription = manager.subscribe();

        manager.sign_out().await.unwrap();

        assert!(manager.current().is_none());
        assert!(subscription.current().is_none());
        assert_eq!(*auth.signed_out.lock().unwrap(), vec!["owner@shop.test"]);
    }

    #[tokio::test]
    async fn test_failed_sign_out_keeps_session() {
        let auth = Arc::new(FakeAuth {
            fail_sign_out: true,
            ..FakeAuth::default()
        });
        let manager = SessionManager::new(auth);
        manager.sign_in(&owner(), &pw("pw")).await.unwrap();

        assert!(manager.sign_out().await.is_err());
        assert!(manager.current().is_some());
    }

    #[tokio::test]
    async fn test_sign_out_without_session() {
        let manager = SessionManager::new(Arc::new(FakeAuth::default()));
        assert!(matches!(
            manager.sign_out().await,
            Err(SessionError::NotSignedIn)
        ));
    }

    #[tokio::test]
    async fn test_sign_up_signs_in_when_session_returned() {
        let manager = SessionManager::new(Arc::new(FakeAuth::default()));
        let outcome = manager.sign_up(&owner(), &pw("pw")).await.unwrap();

        assert!(matches!(outcome, Registration::SignedIn(_)));
        assert!(manager.current().is_some());
    }

    #[tokio::test]
    async fn test_sign_up_with_confirmation_stays_signed_out() {
        let auth = Arc::new(FakeAuth {
            confirm_sign_ups: true,
            ..FakeAuth::default()
        });
        let manager = SessionManager::new(auth);
        let outcome = manager.sign_up(&owner(), &pw("pw")).await.unwrap();

        assert_eq!(outcome, Registration::ConfirmationSent);
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn test_refresh_rotates_tokens() {
        let manager = SessionManager::mount(
            Arc::new(FakeAuth::default()),
            Some(session_for("owner@shop.test", Duration::hours(1), "ok")),
        )
        .await;

        manager.refresh().await.unwrap();

        let session = manager.session().unwrap();
        assert_eq!(session.refresh_token.expose_secret(), "refresh-rotated");
    }

    #[tokio::test]
    async fn test_dropping_subscription_releases_it_once() {
        let manager = SessionManager::new(Arc::new(FakeAuth::default()));
        let first = manager.subscribe();
        let second = manager.subscribe();
        assert_eq!(manager.subscriber_count(), 2);

        drop(first);
        assert_eq!(manager.subscriber_count(), 1);

        drop(second);
        assert_eq!(manager.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_ends_after_manager_drops() {
        let manager = SessionManager::new(Arc::new(FakeAuth::default()));
        let mut subscription = manager.subscribe();
        manager.sign_in(&owner(), &pw("pw")).await.unwrap();
        drop(manager);

        assert!(subscription.changed().await.unwrap().is_some());
        assert!(subscription.changed().await.is_none());
    }

    #[tokio::test]
    async fn test_capability_is_derived_from_current_identity() {
        let policy = AccessPolicy::new(Email::parse("a@x.com").unwrap());
        let manager = SessionManager::new(Arc::new(FakeAuth::default()));
        assert_eq!(manager.capability(&policy), None);

        manager
            .sign_in(&Email::parse("a@x.com").unwrap(), &pw("pw"))
            .await
            .unwrap();
        assert_eq!(manager.capability(&policy), Some(Capability::Privileged));

        manager
            .sign_in(&Email::parse("A@x.com").unwrap(), &pw("pw"))
            .await
            .unwrap();
        assert_eq!(manager.capability(&policy), Some(Capability::ReadOnly));
    }
}
