//! Application state shared across handlers.

use std::sync::Arc;

use stockroom_core::AccessPolicy;

use crate::config::StockroomConfig;
use crate::services::{AuthProvider, RowStore};
use crate::supabase::SupabaseClient;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Per-user state (session and
/// selection) lives in the tower session, not here.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StockroomConfig,
    policy: AccessPolicy,
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn RowStore>,
}

impl AppState {
    /// Create application state backed by the configured Supabase project.
    #[must_use]
    pub fn new(config: StockroomConfig) -> Self {
        let client = Arc::new(SupabaseClient::new(&config.supabase));
        Self::with_backends(config, client.clone(), client)
    }

    /// Create application state with explicit auth and row store backends.
    #[must_use]
    pub fn with_backends(
        config: StockroomConfig,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn RowStore>,
    ) -> Self {
        let policy = AccessPolicy::new(config.admin_email.clone());
        Self {
            inner: Arc::new(AppStateInner {
                config,
                policy,
                auth,
                store,
            }),
        }
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &StockroomConfig {
        &self.inner.config
    }

    /// The authorization gate.
    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.inner.policy
    }

    /// The auth provider.
    #[must_use]
    pub fn auth(&self) -> Arc<dyn AuthProvider> {
        Arc::clone(&self.inner.auth)
    }

    /// The row store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn RowStore> {
        Arc::clone(&self.inner.store)
    }
}
