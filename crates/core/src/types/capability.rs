//! The authorization gate.
//!
//! A session is either privileged (may insert, edit, select and delete rows)
//! or read-only. The decision is a pure function of the identity and is
//! recomputed on every access; nothing here is cached or persisted.

use serde::{Deserialize, Serialize};

use super::email::Email;
use super::identity::Identity;

/// What the current session may do with stock rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Full access: insert, edit, select, delete.
    Privileged,
    /// View only.
    ReadOnly,
}

impl Capability {
    /// Whether mutations are allowed.
    #[must_use]
    pub const fn is_privileged(self) -> bool {
        matches!(self, Self::Privileged)
    }

    /// Short label for the mode badge.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Privileged => "ADMIN",
            Self::ReadOnly => "READER",
        }
    }
}

/// Single-administrator allow-list.
///
/// The comparison is an exact, case-sensitive string match with no
/// normalization. An administrator whose provider-reported email differs
/// only by case is read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    admin_email: Email,
}

impl AccessPolicy {
    /// Create a policy with the given administrator email.
    #[must_use]
    pub const fn new(admin_email: Email) -> Self {
        Self { admin_email }
    }

    /// The configured administrator email.
    #[must_use]
    pub const fn admin_email(&self) -> &Email {
        &self.admin_email
    }

    /// Derive the capability of an authenticated identity.
    #[must_use]
    pub fn capability(&self, identity: &Identity) -> Capability {
        if identity.email.as_str() == self.admin_email.as_str() {
            Capability::Privileged
        } else {
            Capability::ReadOnly
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::types::identity::AccountId;

    fn identity(email: &str) -> Identity {
        Identity::new(
            AccountId::new(Uuid::new_v4()),
            Email::parse(email).unwrap(),
            Utc::now(),
        )
    }

    fn policy() -> AccessPolicy {
        AccessPolicy::new(Email::parse("a@x.com").unwrap())
    }

    #[test]
    fn test_admin_email_is_privileged() {
        assert_eq!(policy().capability(&identity("a@x.com")), Capability::Privileged);
    }

    #[test]
    fn test_case_difference_is_read_only() {
        assert_eq!(policy().capability(&identity("A@x.com")), Capability::ReadOnly);
        assert_eq!(policy().capability(&identity("a@X.COM")), Capability::ReadOnly);
    }

    #[test]
    fn test_other_emails_are_read_only() {
        for email in ["b@x.com", "a@x.co", "a@x.com.evil", "xa@x.com"] {
            assert_eq!(
                policy().capability(&identity(email)),
                Capability::ReadOnly,
                "{email}"
            );
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(Capability::Privileged.label(), "ADMIN");
        assert_eq!(Capability::ReadOnly.label(), "READER");
        assert!(Capability::Privileged.is_privileged());
        assert!(!Capability::ReadOnly.is_privileged());
    }
}
