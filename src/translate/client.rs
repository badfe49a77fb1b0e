use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use super::types::{
    ErrorBody, ErrorDetail, HealthStatus, Predicate, TranslateResponse, TranslationRequest,
};
use crate::config::TranslationConfig;
use crate::record::Value;

const TRANSLATE_PATH: &str = "api/v1/translate";
const HEALTH_PATH: &str = "health";
const SQL_OUTPUT: &str = "sql";
const ERROR_SNIPPET_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("invalid translation service URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("translation service unreachable: {0}")]
    Unreachable(reqwest::Error),

    #[error("translation request timed out")]
    Timeout,

    #[error("translation service error ({code}): {message}")]
    Status { code: u16, message: String },

    #[error("malformed translation response: {0}")]
    Malformed(String),

    #[error("unsupported translation output type '{0}' (expected 'sql')")]
    UnsupportedOutput(String),

    #[error("translation response too large (>{0} bytes)")]
    TooLarge(usize),

    #[error("network error: {0}")]
    Network(reqwest::Error),
}

impl From<reqwest::Error> for TranslationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TranslationError::Timeout
        } else if e.is_connect() {
            TranslationError::Unreachable(e)
        } else {
            TranslationError::Network(e)
        }
    }
}

impl TranslationError {
    /// Whether a caller-side retry could plausibly succeed. Nothing here retries.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TranslationError::Unreachable(_)
                | TranslationError::Timeout
                | TranslationError::Status {
                    code: 429 | 500..=599,
                    ..
                }
        )
    }
}

/// Maps a search-style query to a [`Predicate`].
/// Implemented by `TranslationClient` for production; fakes are used in tests.
pub trait Translate {
    async fn translate(
        &self,
        request: &TranslationRequest<'_>,
    ) -> Result<Predicate, TranslationError>;
}

/// HTTP client for an rsearch translation service.
#[derive(Clone)]
pub struct TranslationClient {
    http: Client,
    translate_url: Url,
    health_url: Url,
    request_timeout: Duration,
    max_response_bytes: usize,
}

impl TranslationClient {
    pub fn new(config: &TranslationConfig) -> Result<Self, TranslationError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Self::with_http(http, config)
    }

    /// Build on a caller-supplied `reqwest::Client`, sharing its connection pool.
    pub fn with_http(http: Client, config: &TranslationConfig) -> Result<Self, TranslationError> {
        let base = parse_base_url(&config.base_url)?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| TranslationError::InvalidBaseUrl {
                    url: config.base_url.clone(),
                    reason: e.to_string(),
                })
        };
        Ok(Self {
            translate_url: join(TRANSLATE_PATH)?,
            health_url: join(HEALTH_PATH)?,
            http,
            request_timeout: config.request_timeout,
            max_response_bytes: config.max_response_bytes,
        })
    }

    pub fn translate_url(&self) -> &Url {
        &self.translate_url
    }

    /// Probe `GET /health`. Not part of the search path.
    pub async fn health(&self) -> Result<HealthStatus, TranslationError> {
        let response = self
            .http
            .get(self.health_url.clone())
            .header("User-Agent", crate::USER_AGENT)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        let body = read_body(response, self.max_response_bytes).await;
        if !status.is_success() {
            return Err(TranslationError::Status {
                code: status.as_u16(),
                message: status_message(&body, status),
            });
        }

        serde_json::from_slice(&body?).map_err(|e| TranslationError::Malformed(e.to_string()))
    }
}

impl Translate for TranslationClient {
    async fn translate(
        &self,
        request: &TranslationRequest<'_>,
    ) -> Result<Predicate, TranslationError> {
        let response = self
            .http
            .post(self.translate_url.clone())
            .header("User-Agent", crate::USER_AGENT)
            .json(request)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        let body = read_body(response, self.max_response_bytes).await;

        if !status.is_success() {
            let message = status_message(&body, status);
            warn!(status = %status, schema = request.schema, "translation service returned error");
            return Err(TranslationError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: TranslateResponse = serde_json::from_slice(&body?)
            .map_err(|e| TranslationError::Malformed(e.to_string()))?;
        let predicate = into_predicate(parsed)?;

        debug!(
            schema = request.schema,
            database = request.database,
            params = predicate.parameters.len(),
            "query translated"
        );
        Ok(predicate)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, TranslationError> {
    let invalid = |reason: String| TranslationError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };
    let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    // `Url::join` replaces the last segment unless the base ends in '/'.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn read_body(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, TranslationError> {
    if let Some(len) = response.content_length()
        && len as usize > limit
    {
        return Err(TranslationError::TooLarge(limit));
    }

    let mut body = Vec::new();
    let mut stream = response;
    while let Some(chunk) = stream.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() > limit {
            return Err(TranslationError::TooLarge(limit));
        }
    }
    Ok(body)
}

fn into_predicate(response: TranslateResponse) -> Result<Predicate, TranslationError> {
    if let Some(kind) = response.kind
        && kind != SQL_OUTPUT
    {
        return Err(TranslationError::UnsupportedOutput(kind));
    }

    let where_clause = response
        .where_clause
        .ok_or_else(|| TranslationError::Malformed("missing whereClause".into()))?;
    if where_clause.trim().is_empty() {
        return Err(TranslationError::Malformed("empty whereClause".into()));
    }

    let parameters = response
        .parameters
        .ok_or_else(|| TranslationError::Malformed("missing parameters".into()))?
        .iter()
        .enumerate()
        .map(|(i, v)| {
            Value::from_json(v).ok_or_else(|| {
                TranslationError::Malformed(format!("parameter {i} is not a scalar"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Predicate {
        where_clause,
        parameters,
        parameter_types: response.parameter_types.unwrap_or_default(),
    })
}

/// Error text for a non-2xx reply; an unreadable or oversized body falls back to the status line.
fn status_message(body: &Result<Vec<u8>, TranslationError>, status: reqwest::StatusCode) -> String {
    match body {
        Ok(bytes) => extract_error_message(bytes, status),
        Err(_) => format!("HTTP {status}"),
    }
}

fn extract_error_message(body: &[u8], status: reqwest::StatusCode) -> String {
    let message = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: ErrorDetail::Message(m),
        }) => m,
        Ok(ErrorBody {
            error: ErrorDetail::Structured { code, message },
        }) => match (code, message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (None, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => String::new(),
        },
        Err(_) => String::from_utf8_lossy(body)
            .chars()
            .take(ERROR_SNIPPET_CHARS)
            .collect(),
    };
    if message.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        message
    }
}
