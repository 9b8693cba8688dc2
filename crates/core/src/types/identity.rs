//! The authenticated principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::email::Email;

/// Account identifier assigned by the auth provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Wrap a provider-issued UUID.
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is logged in right now.
///
/// Created on successful authentication, replaced on token rotation and
/// dropped on sign-out or expiry. Bearer tokens are not part of
/// this type; they stay with the session that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique account identifier.
    pub account_id: AccountId,
    /// Email the account signed in with.
    pub email: Email,
    /// When the backing access token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new identity.
    #[must_use]
    pub const fn new(account_id: AccountId, email: Email, expires_at: DateTime<Utc>) -> Self {
        Self {
            account_id,
            email,
            expires_at,
        }
    }

    /// Whether the identity has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let identity = Identity::new(
            AccountId::new(Uuid::new_v4()),
            Email::parse("a@x.com").unwrap(),
            now,
        );
        assert!(identity.is_expired_at(now));
        assert!(!identity.is_expired_at(now - Duration::seconds(1)));
    }
}
