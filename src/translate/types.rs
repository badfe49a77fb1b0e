use serde::{Deserialize, Serialize};

use crate::record::Value;

/// Body of `POST /api/v1/translate`. The query is forwarded verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationRequest<'a> {
    pub schema: &'a str,
    pub database: &'a str,
    pub query: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TranslateResponse {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub where_clause: Option<String>,
    pub parameters: Option<Vec<serde_json::Value>>,
    pub parameter_types: Option<Vec<String>>,
}

/// Error envelope. The service emits either `{"error": "msg"}` or
/// `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ErrorDetail {
    Message(String),
    Structured {
        code: Option<String>,
        message: Option<String>,
    },
}

/// Response from `GET /health`.
#[derive(Debug, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: Option<String>,
}

/// A parameterized SQL boolean expression plus its ordered bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub where_clause: String,
    pub parameters: Vec<Value>,
    /// Type hints reported by the service (`string`, `integer`, ...). Informational only.
    pub parameter_types: Vec<String>,
}

impl Predicate {
    pub fn new(where_clause: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self {
            where_clause: where_clause.into(),
            parameters,
            parameter_types: Vec::new(),
        }
    }
}
