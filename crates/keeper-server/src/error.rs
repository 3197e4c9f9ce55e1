use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use keeper_core::error::KeeperError;

use crate::action::{Envelope, ErrorBody, ResponseMetadata};
use crate::client::ClientError;

const INTERNAL_MESSAGE: &str = "The service hit an internal error. Please contact the administrator.";

/// Request-level failures of the action protocol itself.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("action {action:?} with version {version:?} is not supported")]
    InvalidActionOrVersion { action: String, version: String },

    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(String),

    #[error("parameter {0} is malformed")]
    MalformedParameter(String),
}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 MalformedParameter error for the named parameter.
    pub fn malformed(parameter: impl Into<String>) -> Self {
        Self(ProtocolError::MalformedParameter(parameter.into()).into())
    }

    /// Status and wire error for this failure. Internal details are logged,
    /// not returned.
    pub fn to_error_body(&self) -> (StatusCode, ErrorBody) {
        if let Some(e) = self.0.downcast_ref::<ProtocolError>() {
            return protocol_error_body(e);
        }
        if let Some(e) = self.0.downcast_ref::<KeeperError>() {
            return keeper_error_body(e);
        }
        if let Some(e) = self.0.downcast_ref::<ClientError>() {
            return client_error_body(e);
        }
        tracing::error!("unhandled error: {:#}", self.0);
        internal()
    }
}

fn error_body(code: &str, message: impl Into<String>) -> ErrorBody {
    ErrorBody {
        code: code.to_string(),
        message: message.into(),
        data: BTreeMap::new(),
    }
}

fn internal() -> (StatusCode, ErrorBody) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error_body("InternalServiceError", INTERNAL_MESSAGE),
    )
}

fn protocol_error_body(e: &ProtocolError) -> (StatusCode, ErrorBody) {
    match e {
        ProtocolError::InvalidActionOrVersion { action, version } => {
            let mut body = error_body("InvalidActionOrVersion", e.to_string());
            body.data.insert("Action".into(), action.clone());
            body.data.insert("Version".into(), version.clone());
            (StatusCode::NOT_FOUND, body)
        }
        ProtocolError::UnsupportedContentType(_) => (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            error_body("UnsupportedContentType", e.to_string()),
        ),
        ProtocolError::MalformedParameter(name) => {
            let mut body = error_body("MalformedParameter", e.to_string());
            body.data.insert("Parameter".into(), name.clone());
            (StatusCode::BAD_REQUEST, body)
        }
    }
}

fn keeper_error_body(e: &KeeperError) -> (StatusCode, ErrorBody) {
    match e {
        KeeperError::NotReady | KeeperError::EmptyPool => (
            StatusCode::SERVICE_UNAVAILABLE,
            error_body("ServiceUnavailable", e.to_string()),
        ),
        KeeperError::BoxNotFound(id) => {
            let mut body = error_body("ResourceNotFound", e.to_string());
            body.data.insert("ResourceName".into(), id.clone());
            (StatusCode::NOT_FOUND, body)
        }
        KeeperError::Timeout => (
            StatusCode::GATEWAY_TIMEOUT,
            error_body("InternalServiceTimeout", e.to_string()),
        ),
        KeeperError::StoreUnavailable(_)
        | KeeperError::Store(_)
        | KeeperError::Config(_)
        | KeeperError::Io(_)
        | KeeperError::Yaml(_)
        | KeeperError::Json(_) => {
            tracing::error!(error = %e, "internal error");
            internal()
        }
    }
}

fn client_error_body(e: &ClientError) -> (StatusCode, ErrorBody) {
    match e {
        ClientError::Queue(inner) => keeper_error_body(inner),
        ClientError::Remote { status, error } => {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, error.clone())
        }
        ClientError::Http(err) if err.is_timeout() => (
            StatusCode::GATEWAY_TIMEOUT,
            error_body("InternalServiceTimeout", "queue service timed out"),
        ),
        ClientError::Http(_) | ClientError::Status { .. } | ClientError::Decode(_) => {
            tracing::error!(error = %e, "queue service call failed");
            internal()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_error_body();
        let envelope: Envelope<()> = Envelope {
            response_metadata: ResponseMetadata::default(),
            result: None,
            error: Some(body),
        };
        (status, axum::Json(envelope)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_and_code(err: AppError) -> (StatusCode, String) {
        let (status, body) = err.to_error_body();
        (status, body.code)
    }

    #[test]
    fn not_ready_maps_to_503() {
        let (status, code) = status_and_code(KeeperError::NotReady.into());
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(code, "ServiceUnavailable");
    }

    #[test]
    fn empty_pool_maps_to_503() {
        let (status, _) = status_and_code(KeeperError::EmptyPool.into());
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn box_not_found_maps_to_404_with_resource_name() {
        let (status, body) = AppError::from(KeeperError::BoxNotFound("b-1".into())).to_error_body();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "ResourceNotFound");
        assert_eq!(body.data.get("ResourceName").map(String::as_str), Some("b-1"));
    }

    #[test]
    fn timeout_maps_to_504() {
        let (status, code) = status_and_code(KeeperError::Timeout.into());
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(code, "InternalServiceTimeout");
    }

    #[test]
    fn store_errors_hide_details() {
        let (status, body) =
            AppError::from(KeeperError::Store("relation boxes does not exist".into())).to_error_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "InternalServiceError");
        assert!(!body.message.contains("relation"));
    }

    #[test]
    fn invalid_action_maps_to_404() {
        let err = ProtocolError::InvalidActionOrVersion {
            action: "Nope".into(),
            version: "1999-01-01".into(),
        };
        let (status, body) = AppError::from(err).to_error_body();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "InvalidActionOrVersion");
        assert_eq!(body.data.get("Action").map(String::as_str), Some("Nope"));
    }

    #[test]
    fn malformed_maps_to_400() {
        let (status, code) = status_and_code(AppError::malformed("Id"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "MalformedParameter");
    }

    #[test]
    fn wrapped_queue_error_keeps_its_mapping() {
        let (status, _) = status_and_code(ClientError::Queue(KeeperError::EmptyPool).into());
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn remote_error_is_passed_through() {
        let err = ClientError::Remote {
            status: 503,
            error: error_body("ServiceUnavailable", "queue is not ready"),
        };
        let (status, body) = AppError::from(err).to_error_body();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.message, "queue is not ready");
    }

    #[test]
    fn unknown_errors_map_to_500() {
        let (status, code) = status_and_code(AppError(anyhow::anyhow!("boom")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "InternalServiceError");
    }

    #[test]
    fn into_response_uses_status() {
        let response = AppError::from(KeeperError::NotReady).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
