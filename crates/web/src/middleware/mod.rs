//! HTTP middleware and extractors.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. Session layer (tower-sessions with the in-memory store)
//!
//! Route protection is done per handler with the [`RequireSession`]
//! extractor rather than a blanket layer.

pub mod auth;
pub mod session;

pub use auth::{AuthRejection, OptionalSession, RequireSession, persist_session};
pub use session::{SESSION_COOKIE_NAME, create_session_layer};
