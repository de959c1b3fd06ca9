use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failures of a single forwarded request.
///
/// `detail` is only populated when the proxy runs in debug mode.
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    #[error("Backend base URL is not configured")]
    BackendNotConfigured,

    #[error("Invalid backend route '{route}': {reason}")]
    InvalidRoute {
        route: String,
        reason: &'static str,
        detail: Option<String>,
    },

    #[error("Upstream did not respond within {}ms", .timeout.as_millis())]
    UpstreamTimeout {
        timeout: Duration,
        detail: Option<String>,
    },

    #[error("Upstream request failed")]
    UpstreamError { detail: Option<String> },
}

impl ProxyError {
    /// Machine-readable error code
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::BackendNotConfigured => "backend_not_configured",
            ProxyError::InvalidRoute { .. } => "invalid_route",
            ProxyError::UpstreamTimeout { .. } => "upstream_timeout",
            ProxyError::UpstreamError { .. } => "upstream_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BackendNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::InvalidRoute { .. } => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamTimeout { .. } | ProxyError::UpstreamError { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ProxyError::InvalidRoute { detail, .. }
            | ProxyError::UpstreamTimeout { detail, .. }
            | ProxyError::UpstreamError { detail } => detail.as_deref(),
            ProxyError::BackendNotConfigured => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            detail: self.detail().map(str::to_string),
        }
    }
}

/// JSON body returned for error responses
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}
