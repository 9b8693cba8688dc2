//! CLI commands.
//!
//! Every command runs against a [`Context`]: the configured Supabase
//! backends plus a [`SessionManager`] restored from the session file. The
//! session file follows the manager through a [`SessionSubscription`], so a
//! sign-in, refresh or sign-out is written back without the commands doing
//! anything.
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL`, `SUPABASE_ANON_KEY` - Supabase project
//! - `STOCKROOM_ADMIN_EMAIL` - The account allowed to change stock
//! - `STOCKROOM_SESSION_FILE` - Where the session is kept

pub mod auth;
pub mod stock;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::ExposeSecret;
use stockroom_core::{AccessPolicy, Capability, EmailError, SizeError, StockRowId};
use stockroom_web::config::{ConfigError, StockroomConfig};
use stockroom_web::services::{
    AuthProvider, AuthSession, ReconcileError, RowStore, SessionError, SessionManager,
    SessionSubscription,
};
use stockroom_web::supabase::SupabaseClient;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::warn;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Sign-in was refused.
    #[error("Incorrect email or password")]
    SignInFailed,

    /// The command needs a signed-in session.
    #[error("Not signed in; run `stockroom auth login` first")]
    NotSignedIn,

    /// Session operation failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Stock operation failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Invalid size.
    #[error(transparent)]
    InvalidSize(#[from] SizeError),

    /// No displayed row has this id.
    #[error("No stock row with id {0}")]
    RowNotFound(StockRowId),

    /// The store refused an edit; the row is unchanged.
    #[error("Edit of row {id} reverted: {reason}")]
    Reverted { id: StockRowId, reason: String },

    /// The session file could not be written.
    #[error("Session file error: {0}")]
    SessionFile(#[from] io::Error),

    /// The session could not be encoded.
    #[error("Session encoding error: {0}")]
    SessionEncoding(#[from] serde_json::Error),
}

/// Where the signed-in session is kept between runs.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored session.
    ///
    /// A missing file means nobody is signed in. An unreadable or corrupt
    /// file is logged and treated the same way.
    #[must_use]
    pub fn load(&self) -> Option<AuthSession> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return None,
            Err(error) => {
                warn!(path = %self.path.display(), error = %error, "Could not read session file");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(session) => Some(session),
            Err(error) => {
                warn!(path = %self.path.display(), error = %error, "Ignoring corrupt session file");
                None
            }
        }
    }

    /// Write `session`, or remove the file when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or removed.
    pub fn save(&self, session: Option<&AuthSession>) -> Result<(), CliError> {
        let Some(session) = session else {
            return match fs::remove_file(&self.path) {
                Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error.into()),
                _ => Ok(()),
            };
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(session)?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(&json)?;
        Ok(())
    }

    /// Write every published session change until the manager is dropped.
    pub fn follow(self, mut subscription: SessionSubscription) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(session) = subscription.changed().await {
                if let Err(error) = self.save(session.as_ref()) {
                    warn!(path = %self.path.display(), error = %error, "Could not save session");
                }
            }
        })
    }
}

/// Backends, gate and session shared by every command.
pub struct Context {
    pub policy: AccessPolicy,
    pub store: Arc<dyn RowStore>,
    pub manager: SessionManager,
    follower: JoinHandle<()>,
}

impl Context {
    /// Build the context from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub async fn from_env() -> Result<Self, CliError> {
        let config = StockroomConfig::from_env()?;
        let client = Arc::new(SupabaseClient::new(&config.supabase));
        let policy = AccessPolicy::new(config.admin_email.clone());
        let file = SessionFile::new(config.session_file);
        Self::mount(policy, client.clone(), client, file).await
    }

    /// Restore the session from `file` and start following it.
    ///
    /// # Errors
    ///
    /// Returns an error if a refreshed session cannot be written back.
    pub async fn mount(
        policy: AccessPolicy,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn RowStore>,
        file: SessionFile,
    ) -> Result<Self, CliError> {
        let stored = file.load();
        let had_stored = stored.is_some();
        let stored_token = stored
            .as_ref()
            .map(|s| s.access_token.expose_secret().to_owned());

        let manager = SessionManager::mount(auth, stored).await;

        let mounted = manager.session();
        let mounted_token = mounted.as_ref().map(|s| s.access_token.expose_secret());
        if had_stored && mounted_token != stored_token.as_deref() {
            file.save(mounted.as_ref())?;
        }

        let follower = file.follow(manager.subscribe());
        Ok(Self {
            policy,
            store,
            manager,
            follower,
        })
    }

    /// The current session and its capability.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::NotSignedIn`] without a session.
    pub fn signed_in(&self) -> Result<(AuthSession, Capability), CliError> {
        let session = self.manager.session().ok_or(CliError::NotSignedIn)?;
        let capability = self.policy.capability(&session.identity);
        Ok((session, capability))
    }

    /// Drop the manager and wait for the session file to catch up.
    pub async fn finish(self) {
        let Self {
            manager, follower, ..
        } = self;
        drop(manager);
        if let Err(error) = follower.await {
            warn!(error = %error, "Session file writer stopped unexpectedly");
        }
    }
}
