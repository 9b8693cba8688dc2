//! In-memory backends and a test server for Stockroom.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p stockroom-integration-tests
//! ```
//!
//! Nothing here touches the network beyond the loopback interface: the
//! Supabase auth API and the row table are replaced by [`FakeAuthProvider`]
//! and [`InMemoryRowStore`], and [`TestServer`] runs the real router on an
//! ephemeral port.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use stockroom_core::{
    AccountId, Email, Identity, NewStockRow, ProposedRow, QuantityInput, Size, StockRow,
    StockRowId,
};
use stockroom_web::services::{
    AuthError, AuthProvider, AuthSession, RowStore, SignUpOutcome, StoreError,
};
use stockroom_web::{AppState, StockroomConfig, SupabaseConfig, routes};
use tokio::task::JoinHandle;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Auth provider
// ============================================================================

struct Account {
    id: AccountId,
    password: String,
}

#[derive(Default)]
struct AuthState {
    accounts: HashMap<String, Account>,
    refresh_tokens: HashMap<String, String>,
    issued: u64,
    require_confirmation: bool,
    unavailable: bool,
    sign_outs: usize,
}

/// Auth provider backed by a map of accounts.
///
/// Emails are matched exactly. Every issued session lives one hour and
/// carries tokens `access-N` / `refresh-N`; refresh tokens are single use.
#[derive(Default)]
pub struct FakeAuthProvider {
    state: Mutex<AuthState>,
}

impl FakeAuthProvider {
    /// Register an account directly.
    pub fn add_account(&self, email: &str, password: &str) {
        lock(&self.state).accounts.insert(
            email.to_owned(),
            Account {
                id: AccountId::new(Uuid::new_v4()),
                password: password.to_owned(),
            },
        );
    }

    /// Make sign-ups send a confirmation email instead of signing in.
    pub fn require_confirmation(&self) {
        lock(&self.state).require_confirmation = true;
    }

    /// Simulate the auth service being unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    /// Number of successful sign-outs.
    #[must_use]
    pub fn sign_out_count(&self) -> usize {
        lock(&self.state).sign_outs
    }

    /// Issue a session for an existing account without a password.
    #[must_use]
    pub fn issue_session(&self, email: &str) -> Option<AuthSession> {
        let mut state = lock(&self.state);
        Self::issue(&mut state, email)
    }

    fn issue(state: &mut AuthState, email: &str) -> Option<AuthSession> {
        let account_id = state.accounts.get(email)?.id;
        state.issued += 1;
        let n = state.issued;
        let refresh = format!("refresh-{n}");
        state.refresh_tokens.insert(refresh.clone(), email.to_owned());

        Some(AuthSession {
            identity: Identity::new(
                account_id,
                Email::parse(email).ok()?,
                Utc::now() + Duration::hours(1),
            ),
            access_token: SecretString::from(format!("access-{n}")),
            refresh_token: SecretString::from(refresh),
        })
    }

    fn check_available(state: &AuthState) -> Result<(), AuthError> {
        if state.unavailable {
            Err(AuthError::Unavailable("auth service unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AuthProvider for FakeAuthProvider {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, AuthError> {
        let mut state = lock(&self.state);
        Self::check_available(&state)?;

        let matches = state
            .accounts
            .get(email.as_str())
            .is_some_and(|account| account.password == password.expose_secret());
        if !matches {
            return Err(AuthError::Rejected("Invalid login credentials".to_string()));
        }
        Self::issue(&mut state, email.as_str())
            .ok_or_else(|| AuthError::InvalidResponse("account vanished".to_string()))
    }

    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<SignUpOutcome, AuthError> {
        let mut state = lock(&self.state);
        Self::check_available(&state)?;

        if state.accounts.contains_key(email.as_str()) {
            return Err(AuthError::Rejected("User already registered".to_string()));
        }
        if password.expose_secret().chars().count() < 6 {
            return Err(AuthError::Rejected(
                "Password should be at least 6 characters.".to_string(),
            ));
        }

        state.accounts.insert(
            email.as_str().to_owned(),
            Account {
                id: AccountId::new(Uuid::new_v4()),
                password: password.expose_secret().to_owned(),
            },
        );
        if state.require_confirmation {
            return Ok(SignUpOutcome::ConfirmationSent);
        }
        Self::issue(&mut state, email.as_str())
            .map(SignUpOutcome::SignedIn)
            .ok_or_else(|| AuthError::InvalidResponse("account vanished".to_string()))
    }

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError> {
        let mut state = lock(&self.state);
        Self::check_available(&state)?;

        state
            .refresh_tokens
            .remove(session.refresh_token.expose_secret());
        state.sign_outs += 1;
        Ok(())
    }

    async fn refresh_session(
        &self,
        refresh_token: &SecretString,
    ) -> Result<AuthSession, AuthError> {
        let mut state = lock(&self.state);
        Self::check_available(&state)?;

        let email = state
            .refresh_tokens
            .remove(refresh_token.expose_secret())
            .ok_or_else(|| AuthError::Rejected("Invalid Refresh Token".to_string()))?;
        Self::issue(&mut state, &email)
            .ok_or_else(|| AuthError::Rejected("User not found".to_string()))
    }
}

// ============================================================================
// Row store
// ============================================================================

/// A row store request, as recorded by [`InMemoryRowStore::requests`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Default)]
struct StoreState {
    rows: BTreeMap<i64, Value>,
    next_id: i64,
    failures: HashMap<StoreOp, StoreError>,
    requests: Vec<StoreOp>,
    tokens: Vec<String>,
}

impl StoreState {
    fn record(&mut self, op: StoreOp, access_token: &SecretString) -> Result<(), StoreError> {
        self.requests.push(op);
        self.tokens.push(access_token.expose_secret().to_owned());
        self.failures.get(&op).cloned().map_or(Ok(()), Err)
    }

    fn insert_value(&mut self, mut row: Value) -> StockRowId {
        self.next_id += 1;
        let id = self.next_id;
        if let Some(object) = row.as_object_mut() {
            object.insert("id".to_string(), json!(id));
        }
        self.rows.insert(id, row);
        StockRowId::new(id)
    }
}

/// Row table kept in memory, behaving like the `PostgREST` endpoint.
///
/// Rows are stored as raw JSON so malformed rows can be seeded. Updates
/// with a non-numeric quantity are refused the way the database refuses
/// them; everything else is accepted.
#[derive(Default)]
pub struct InMemoryRowStore {
    state: Mutex<StoreState>,
}

impl InMemoryRowStore {
    /// Add a row directly, bypassing request recording.
    pub fn seed(&self, garment: &str, size: Size, quantity: u32) -> StockRowId {
        self.seed_raw(json!({
            "prenda": garment,
            "talle": size.label(),
            "cantidad": quantity,
        }))
    }

    /// Add a raw JSON row; the store assigns its id.
    pub fn seed_raw(&self, row: Value) -> StockRowId {
        lock(&self.state).insert_value(row)
    }

    /// Well-formed rows, newest first.
    #[must_use]
    pub fn rows(&self) -> Vec<StockRow> {
        lock(&self.state)
            .rows
            .values()
            .rev()
            .filter_map(|value| StockRow::from_value(value.clone()).ok())
            .collect()
    }

    /// Make every `op` request fail with `error` until cleared.
    pub fn fail(&self, op: StoreOp, error: StoreError) {
        lock(&self.state).failures.insert(op, error);
    }

    /// Stop failing requests.
    pub fn clear_failures(&self) {
        lock(&self.state).failures.clear();
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<StoreOp> {
        lock(&self.state).requests.clone()
    }

    /// The bearer token of every request received, in order.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        lock(&self.state).tokens.clone()
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn select(&self, access_token: &SecretString) -> Result<Vec<Value>, StoreError> {
        let mut state = lock(&self.state);
        state.record(StoreOp::Select, access_token)?;
        Ok(state.rows.values().rev().cloned().collect())
    }

    async fn insert(&self, access_token: &SecretString, row: &NewStockRow) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.record(StoreOp::Insert, access_token)?;
        let value = serde_json::to_value(row)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
        state.insert_value(value);
        Ok(())
    }

    async fn update(
        &self,
        access_token: &SecretString,
        proposed: &ProposedRow,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.record(StoreOp::Update, access_token)?;

        if let QuantityInput::Text(text) = &proposed.quantity {
            return Err(StoreError::Rejected(format!(
                "invalid input syntax for type integer: \"{text}\""
            )));
        }
        let changes = serde_json::to_value(proposed)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        // Like `id=eq.N`, an unknown id updates nothing and still succeeds
        if let Some(row) = state
            .rows
            .get_mut(&proposed.id.as_i64())
            .and_then(Value::as_object_mut)
            && let Some(changes) = changes.as_object()
        {
            for (column, value) in changes {
                row.insert(column.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn delete(&self, access_token: &SecretString, ids: &[StockRowId]) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.record(StoreOp::Delete, access_token)?;
        for id in ids {
            state.rows.remove(&id.as_i64());
        }
        Ok(())
    }
}

// ============================================================================
// Test server
// ============================================================================

/// Administrator email used by [`TestServer`].
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// Password given to every account created by [`TestServer::with_account`].
pub const PASSWORD: &str = "correct-horse";

/// Configuration pointing at a Supabase project that is never contacted.
///
/// # Panics
///
/// Panics if `admin_email` is not a valid email.
#[must_use]
pub fn test_config(admin_email: &str) -> StockroomConfig {
    StockroomConfig {
        host: [127, 0, 0, 1].into(),
        port: 0,
        base_url: "http://localhost:3000".to_string(),
        admin_email: Email::parse(admin_email).unwrap_or_else(|e| panic!("{e}")),
        session_file: ".stockroom/session.json".into(),
        supabase: SupabaseConfig {
            url: url::Url::parse("http://127.0.0.1:54321").unwrap_or_else(|e| panic!("{e}")),
            anon_key: SecretString::from("test-anon-key".to_string()),
            table: "stock_ropa".to_string(),
        },
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// The web app served on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub auth: Arc<FakeAuthProvider>,
    pub store: Arc<InMemoryRowStore>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start the app with [`ADMIN_EMAIL`] as administrator.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let auth = Arc::new(FakeAuthProvider::default());
        let store = Arc::new(InMemoryRowStore::default());
        let state = AppState::with_backends(test_config(ADMIN_EMAIL), auth.clone(), store.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("failed to bind test listener: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("failed to read test address: {e}"));
        let app = routes::app(state);
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            auth,
            store,
            handle,
        }
    }

    /// Register an account with [`PASSWORD`].
    #[must_use]
    pub fn with_account(self, email: &str) -> Self {
        self.auth.add_account(email, PASSWORD);
        self
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// A browser-like client: keeps cookies, does not follow redirects.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|e| panic!("failed to build client: {e}"))
    }

    /// A client signed in as `email` with [`PASSWORD`].
    ///
    /// # Panics
    ///
    /// Panics if the sign-in does not redirect to the grid.
    pub async fn signed_in(&self, email: &str) -> reqwest::Client {
        let client = self.client();
        let response = client
            .post(self.url("/auth/login"))
            .form(&[("email", email), ("password", PASSWORD)])
            .send()
            .await
            .unwrap_or_else(|e| panic!("sign-in request failed: {e}"));
        assert_eq!(
            location(&response).as_deref(),
            Some("/stock"),
            "sign-in as {email} failed with {}",
            response.status()
        );
        client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The `Location` header of a redirect.
#[must_use]
pub fn location(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
