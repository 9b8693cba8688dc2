//! Stockroom configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUPABASE_URL` - Supabase project URL (e.g., `https://abc.supabase.co`)
//! - `SUPABASE_ANON_KEY` - Supabase anon (public) API key
//! - `STOCKROOM_ADMIN_EMAIL` - The single email granted write access
//!
//! ## Optional
//! - `STOCKROOM_TABLE` - Row store table name (default: `stock_ropa`)
//! - `STOCKROOM_HOST` - Bind address (default: 127.0.0.1)
//! - `STOCKROOM_PORT` - Listen port (default: 3000)
//! - `STOCKROOM_BASE_URL` - Public URL (default: `http://localhost:3000`)
//! - `STOCKROOM_SESSION_FILE` - CLI session file (default: `.stockroom/session.json`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Traces sample rate (default: 1.0)

use std::collections::HashMap;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;
use stockroom_core::Email;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_TABLE: &str = "stock_ropa";
const DEFAULT_SESSION_FILE: &str = ".stockroom/session.json";

/// Fragments that only show up in copied-in sample values (checked lowercased).
const PLACEHOLDER_FRAGMENTS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "placeholder",
    "example",
    "anon-key",
    "anon_key",
    "xxx",
    "todo",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Stockroom application configuration.
#[derive(Debug, Clone)]
pub struct StockroomConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, decides whether cookies are `Secure`
    pub base_url: String,
    /// Email granted the privileged capability
    pub admin_email: Email,
    /// Where the CLI keeps its session between invocations
    pub session_file: PathBuf,
    /// Supabase project configuration
    pub supabase: SupabaseConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Supabase project configuration.
///
/// Implements `Debug` manually to redact the anon key.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL, without the `/auth/v1` or `/rest/v1` suffix
    pub url: Url,
    /// Anon API key, sent as `apikey` on every request
    pub anon_key: SecretString,
    /// Table holding the stock rows
    pub table: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("table", &self.table)
            .finish()
    }
}

impl SupabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = Url::parse(&required_env("SUPABASE_URL")?)
            .map_err(|e| ConfigError::InvalidEnvVar("SUPABASE_URL".to_string(), e.to_string()))?;
        let anon_key = required_env("SUPABASE_ANON_KEY")?;
        check_anon_key(&anon_key)
            .map_err(|reason| ConfigError::InsecureSecret("SUPABASE_ANON_KEY".to_string(), reason))?;

        Ok(Self {
            url,
            anon_key: SecretString::from(anon_key),
            table: env_or("STOCKROOM_TABLE", DEFAULT_TABLE),
        })
    }
}

impl StockroomConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the anon key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host: IpAddr = parse_env("STOCKROOM_HOST", "127.0.0.1")?;
        let port: u16 = parse_env("STOCKROOM_PORT", "3000")?;
        let base_url = env_or("STOCKROOM_BASE_URL", "http://localhost:3000");
        let admin_email = Email::parse(&required_env("STOCKROOM_ADMIN_EMAIL")?).map_err(|e| {
            ConfigError::InvalidEnvVar("STOCKROOM_ADMIN_EMAIL".to_string(), e.to_string())
        })?;
        let session_file = PathBuf::from(env_or("STOCKROOM_SESSION_FILE", DEFAULT_SESSION_FILE));

        let supabase = SupabaseConfig::from_env()?;
        let sentry_dsn = std::env::var("SENTRY_DSN").ok();
        let sentry_environment = std::env::var("SENTRY_ENVIRONMENT").ok();
        let sentry_sample_rate = sample_rate("SENTRY_SAMPLE_RATE");
        let sentry_traces_sample_rate = sample_rate("SENTRY_TRACES_SAMPLE_RATE");

        Ok(Self {
            host,
            port,
            base_url,
            admin_email,
            session_file,
            supabase,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the public URL is served over HTTPS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

// =============================================================================
// Environment helpers
// =============================================================================

fn required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    env_or(key, default)
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// A Sentry sample rate, `1.0` when unset or unparsable.
fn sample_rate(key: &str) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1.0)
}

/// Bits of Shannon entropy per character.
fn bits_per_char(s: &str) -> f64 {
    let mut counts: HashMap<char, u32> = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_default() += 1;
    }
    let total: u32 = counts.values().sum();
    if total == 0 {
        return 0.0;
    }

    let total = f64::from(total);
    counts
        .values()
        .map(|&n| {
            let p = f64::from(n) / total;
            -p * p.log2()
        })
        .sum()
}

/// Refuse anon keys copied from sample files or typed in by hand.
fn check_anon_key(key: &str) -> Result<(), String> {
    let lower = key.to_lowercase();
    if let Some(fragment) = PLACEHOLDER_FRAGMENTS.iter().find(|f| lower.contains(*f)) {
        return Err(format!("looks like a placeholder (contains '{fragment}')"));
    }

    // Supabase keys are JWTs; anything real clears this easily
    let entropy = bits_per_char(key);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(format!(
            "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Copy the key from the Supabase dashboard."
        ));
    }
    Ok(())
}
