//! The action protocol shared by every keeper service.
//!
//! Requests hit `/` with `?Action=<name>&Version=<version>` and, when the
//! action takes parameters, a JSON body. Every response is an [`Envelope`]
//! carrying either a `Result` or an `Error`.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ProtocolError};

/// Placeholder reported when a request names no action.
pub const UNKNOWN_ACTION: &str = "<UNKNOWN>";

/// Query parameters selecting an action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionQuery {
    #[serde(rename = "Action", default)]
    pub action: Option<String>,
    #[serde(rename = "Version", default)]
    pub version: Option<String>,
}

impl ActionQuery {
    pub fn action(&self) -> &str {
        self.action.as_deref().unwrap_or_default()
    }

    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or_default()
    }

    /// Metadata echoed back in the response envelope.
    pub fn metadata(&self) -> ResponseMetadata {
        ResponseMetadata {
            action: match self.action() {
                "" => UNKNOWN_ACTION.to_string(),
                name => name.to_string(),
            },
            version: self.version().to_string(),
        }
    }

    /// Error for a request whose action/version pair no handler serves.
    pub fn unsupported(&self) -> AppError {
        ProtocolError::InvalidActionOrVersion {
            action: self.metadata().action,
            version: self.version().to_string(),
        }
        .into()
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseMetadata {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

/// Wire format of every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope<T> {
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Turn a handler outcome into an enveloped response.
pub fn respond<T: Serialize>(query: &ActionQuery, outcome: Result<T, AppError>) -> Response {
    let response_metadata = query.metadata();
    match outcome {
        Ok(result) => {
            let envelope = Envelope {
                response_metadata,
                result: Some(result),
                error: None,
            };
            (StatusCode::OK, Json(envelope)).into_response()
        }
        Err(err) => {
            let (status, body) = err.to_error_body();
            let envelope: Envelope<()> = Envelope {
                response_metadata,
                result: None,
                error: Some(body),
            };
            (status, Json(envelope)).into_response()
        }
    }
}

/// Erase a handler's result type so one dispatcher can serve every action.
pub fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, AppError> {
    Ok(serde_json::to_value(value)?)
}

// ---------------------------------------------------------------------------
// Body parameters
// ---------------------------------------------------------------------------

/// Decode the JSON body parameter of an action.
pub fn json_body<T: DeserializeOwned>(headers: &HeaderMap, body: &Bytes) -> Result<T, AppError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    if !mime.eq_ignore_ascii_case("application/json") {
        return Err(ProtocolError::UnsupportedContentType(content_type.to_string()).into());
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "failed to decode request body");
        ProtocolError::MalformedParameter("Body".to_string()).into()
    })
}
