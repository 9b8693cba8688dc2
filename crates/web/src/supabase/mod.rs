//! Supabase HTTP client.
//!
//! One client talks to both halves of a Supabase project:
//!
//! - GoTrue (`/auth/v1`) for password sign-in, sign-up, sign-out and token
//!   refresh, see [`auth`].
//! - PostgREST (`/rest/v1/{table}`) for the stock rows, see [`rest`].
//!
//! Every request carries the project's anon key as `apikey`. Row requests
//! additionally carry the signed-in user's access token as a bearer token so
//! row-level security applies to the user, not to the anon role.

pub mod auth;
pub mod rest;

use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::SupabaseConfig;

/// Errors that can occur when talking to Supabase.
#[derive(Debug, Error)]
pub enum SupabaseError {
    /// HTTP request failed before a response arrived.
    #[error("Supabase request failed: {0}")]
    Request(String),

    /// Response body could not be parsed.
    #[error("Supabase response error: {0}")]
    Response(String),

    /// Supabase answered with an error status.
    #[error("{message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Human-readable message taken from the error body.
        message: String,
    },

    /// The project URL cannot carry a path.
    #[error("invalid Supabase URL: {0}")]
    InvalidUrl(String),
}

/// Error body shapes returned by GoTrue and PostgREST.
///
/// GoTrue uses `error_description`, `msg` or `message` depending on the
/// endpoint and version; PostgREST uses `message` (plus `details`/`hint`).
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

/// Supabase client for auth and row access.
#[derive(Clone)]
pub struct SupabaseClient {
    /// HTTP client.
    client: Client,
    /// Project URL.
    base_url: Url,
    /// Anon API key.
    anon_key: SecretString,
    /// Table holding the stock rows.
    table: String,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    /// Create a new client for the configured project.
    #[must_use]
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            table: config.table.clone(),
        }
    }

    /// Table the row operations target.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Build `{base_url}/{segments...}`, keeping any path prefix on the base.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SupabaseError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SupabaseError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// The anon key, for the `apikey` header.
    fn anon_key(&self) -> &str {
        self.anon_key.expose_secret()
    }
}

/// Turn a non-success response into [`SupabaseError::Api`].
async fn check_status(response: Response) -> Result<Response, SupabaseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(api_error(status, &body))
}

/// Extract the most useful message from an error body.
fn api_error(status: StatusCode, body: &str) -> SupabaseError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        });

    SupabaseError::Api {
        status: status.as_u16(),
        message,
    }
}
