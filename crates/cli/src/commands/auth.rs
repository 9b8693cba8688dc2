//! Session commands.
//!
//! # Usage
//!
//! ```bash
//! stockroom auth login -e admin@example.com -p 'secret'
//! stockroom auth register -e new@example.com -p 'secret'
//! stockroom auth whoami
//! stockroom auth logout
//! ```

use secrecy::SecretString;
use stockroom_core::Email;
use stockroom_web::services::{AuthError, Registration, SessionError};
use tracing::{info, warn};

use super::{CliError, Context};

/// Sign in with email and password.
///
/// The provider's reason for a refusal is logged, not shown.
pub async fn login(context: &Context, email: &str, password: String) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let password = SecretString::from(password);

    let identity = match context.manager.sign_in(&email, &password).await {
        Ok(identity) => identity,
        Err(SessionError::Auth(AuthError::Rejected(reason))) => {
            warn!(reason = %reason, "Sign-in rejected");
            return Err(CliError::SignInFailed);
        }
        Err(error) => return Err(error.into()),
    };

    let capability = context.policy.capability(&identity);
    info!("Signed in as {} ({})", identity.email, capability.label());
    Ok(())
}

/// Create an account.
pub async fn register(context: &Context, email: &str, password: String) -> Result<(), CliError> {
    let email = Email::parse(email)?;
    let password = SecretString::from(password);

    match context.manager.sign_up(&email, &password).await? {
        Registration::SignedIn(identity) => {
            let capability = context.policy.capability(&identity);
            info!(
                "Account created, signed in as {} ({})",
                identity.email,
                capability.label()
            );
        }
        Registration::ConfirmationSent => {
            info!(
                "Account created! Check your email, or sign in if email confirmation is disabled."
            );
        }
    }
    Ok(())
}

/// Sign out.
///
/// When the provider cannot be reached the stored session is kept.
pub async fn logout(context: &Context) -> Result<(), CliError> {
    match context.manager.sign_out().await {
        Ok(()) => info!("Signed out"),
        Err(SessionError::NotSignedIn) => info!("Not signed in"),
        Err(error) => return Err(error.into()),
    }
    Ok(())
}

/// Show the signed-in account.
#[allow(clippy::print_stdout)]
pub fn whoami(context: &Context) {
    match context.manager.current() {
        Some(identity) => {
            let capability = context.policy.capability(&identity);
            println!("{}", identity.email);
            println!("  capability: {}", capability.label());
            println!("  expires:    {}", identity.expires_at.to_rfc3339());
        }
        None => println!("Not signed in"),
    }
}
