//! Service configuration, read once at startup and handed to the components
//! through [`crate::state::AppState`].
//!
//! Required: `DATABASE_URL`, `SESSION_KEY` (base64, at least 32 bytes).
//! Optional: `BIND_ADDR` / `PORT`, `SESSION_TTL_HOURS`, `PRODUCTION`,
//! `UPLOADS_DIR`, `MAX_UPLOAD_BYTES`, `FRONTEND_URL`,
//! `DATABASE_MAX_CONNECTIONS`, `TRUST_PROXY`, `SEED_ADMIN_EMAIL`, `SEED_ADMIN_PASSWORD`,
//! `SEED_AGENCY_ADMIN_PASSWORD`.

use base64::{engine::general_purpose, Engine as _};
use chrono::Duration;
use std::path::PathBuf;
use thiserror::Error;

const MIN_SESSION_KEY_BYTES: usize = 32;
const DEFAULT_PORT: &str = "3000";
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid environment variable {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Clone)]
pub struct SeedConfig {
    pub admin_email: String,
    pub admin_password: Option<String>,
    pub agency_admin_password: Option<String>,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: String,
    pub session_key: Vec<u8>,
    pub session_ttl: Duration,
    /// Adds the `Secure` attribute to the session cookie.
    pub secure_cookies: bool,
    pub uploads_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub frontend_url: String,
    /// Key throttling on `X-Forwarded-For` instead of the peer address.
    pub trust_proxy: bool,
    pub seed: SeedConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_max_connections", &self.database_max_connections)
            .field("bind_addr", &self.bind_addr)
            .field("session_ttl_hours", &self.session_ttl.num_hours())
            .field("secure_cookies", &self.secure_cookies)
            .field("uploads_dir", &self.uploads_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("frontend_url", &self.frontend_url)
            .field("trust_proxy", &self.trust_proxy)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let key_b64 = get("SESSION_KEY").ok_or(ConfigError::Missing("SESSION_KEY"))?;
        let session_key = general_purpose::STANDARD
            .decode(key_b64.trim())
            .map_err(|_| ConfigError::Invalid("SESSION_KEY", "must be base64".to_string()))?;
        if session_key.len() < MIN_SESSION_KEY_BYTES {
            return Err(ConfigError::Invalid(
                "SESSION_KEY",
                format!("must decode to at least {MIN_SESSION_KEY_BYTES} bytes"),
            ));
        }

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| {
            let port = get("PORT").unwrap_or_else(|| DEFAULT_PORT.to_string());
            format!("0.0.0.0:{port}")
        });

        let session_ttl_hours = parse_or("SESSION_TTL_HOURS", get("SESSION_TTL_HOURS"), DEFAULT_SESSION_TTL_HOURS)?;
        if session_ttl_hours <= 0 {
            return Err(ConfigError::Invalid("SESSION_TTL_HOURS", "must be positive".to_string()));
        }

        Ok(Self {
            database_url,
            database_max_connections: parse_or(
                "DATABASE_MAX_CONNECTIONS",
                get("DATABASE_MAX_CONNECTIONS"),
                10,
            )?,
            bind_addr,
            session_key,
            session_ttl: Duration::hours(session_ttl_hours),
            secure_cookies: get("PRODUCTION").is_some(),
            uploads_dir: get("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", get("MAX_UPLOAD_BYTES"), DEFAULT_MAX_UPLOAD_BYTES)?,
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            trust_proxy: parse_or("TRUST_PROXY", get("TRUST_PROXY"), false)?,
            seed: SeedConfig {
                admin_email: get("SEED_ADMIN_EMAIL")
                    .map(|e| e.trim().to_lowercase())
                    .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string()),
                admin_password: get("SEED_ADMIN_PASSWORD"),
                agency_admin_password: get("SEED_AGENCY_ADMIN_PASSWORD"),
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, format!("cannot parse {value:?}"))),
        None => Ok(default),
    }
}
