//! Configuration module for the songbook backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default bearer token lifetime (one day).
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Secret used to sign bearer tokens (random per process when unset)
    pub token_secret: Option<String>,
    /// Bearer token lifetime in hours
    pub token_ttl_hours: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("SONGBOOK_DB_PATH")
            .unwrap_or_else(|_| "./data/songbook.sqlite".to_string())
            .into();

        let index_path = env::var("SONGBOOK_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = env::var("SONGBOOK_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid SONGBOOK_BIND_ADDR format");

        let log_level = env::var("SONGBOOK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let token_secret = env::var("SONGBOOK_TOKEN_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let token_ttl_hours = env::var("SONGBOOK_TOKEN_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|h: &i64| *h > 0)
            .unwrap_or(DEFAULT_TOKEN_TTL_HOURS);

        Self {
            db_path,
            index_path,
            bind_addr,
            log_level,
            token_secret,
            token_ttl_hours,
        }
    }
}
