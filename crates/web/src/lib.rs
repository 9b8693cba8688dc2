//! Stockroom web front-end.
//!
//! A clothing stock grid backed by Supabase. Anyone can sign in and read the
//! grid; only the configured administrator may add, edit or delete rows.
//!
//! # Architecture
//!
//! - Axum web framework with HTMX for inline edits
//! - Askama templates for server-side rendering
//! - Supabase auth (`GoTrue`) for accounts and sessions
//! - Supabase rows (`PostgREST`) for the stock table
//! - tower-sessions (in memory) for the signed-in session and the selection
//!
//! The [`services`] layer holds the session manager and the stock reconciler;
//! both talk to the backend only through the [`services::AuthProvider`] and
//! [`services::RowStore`] traits, so the CLI and the tests can reuse them.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod supabase;

pub use config::{ConfigError, StockroomConfig, SupabaseConfig};
pub use state::AppState;
