//! Explicit configuration handed to the translation client and query executor.
//!
//! Nothing in the pipeline reads process environment; the CLI driver fills these in.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
/// TCP connection establishment timeout for the translation service.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Whole-request timeout for one translation call (connect + response body).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;
/// How long SQLite waits on a locked database before giving up.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_ROWS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct TranslationConfig {
    /// Service root, e.g. `http://localhost:8080`. The translate path is appended.
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Translation responses larger than this are rejected.
    pub max_response_bytes: usize,
}

impl TranslationConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite database file. Must already exist; it is never created.
    pub path: PathBuf,
    pub read_only: bool,
    pub busy_timeout: Duration,
    /// Upper bound on statement execution, enforced from inside SQLite.
    pub query_timeout: Duration,
    /// Result sets with more rows fail instead of being truncated.
    pub max_rows: usize,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_only: true,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub translation: TranslationConfig,
    pub store: StoreConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_new_keeps_default_timeouts() {
        let cfg = TranslationConfig::new("http://rsearch:9000");
        assert_eq!(cfg.base_url, "http://rsearch:9000");
        assert_eq!(cfg.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(cfg.max_response_bytes, DEFAULT_MAX_RESPONSE_BYTES);
    }

    #[test]
    fn store_defaults_to_read_only() {
        let cfg = StoreConfig::new("products.db");
        assert!(cfg.read_only);
        assert_eq!(cfg.max_rows, DEFAULT_MAX_ROWS);
    }
}
