use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, error, info};

use super::error::ProxyError;
use super::route::resolve_route;
use crate::config::BackendConfig;

// ============================================================================
// Data structures (pure, no I/O)
// ============================================================================

/// One request to forward to the backend.
///
/// The body is held fully in memory; nothing is streamed upstream.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    method: Method,
    subpath: String,
    headers: HeaderMap,
    body: Bytes,
    timeout: Option<Duration>,
}

impl ProxyRequest {
    pub fn new(method: Method, subpath: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        Self {
            method,
            subpath: subpath.into(),
            headers,
            body: Bytes::new(),
            timeout: None,
        }
    }

    /// POST a JSON value to `subpath`
    pub fn json(subpath: impl Into<String>, payload: &serde_json::Value) -> Self {
        Self::new(Method::POST, subpath).with_body(payload.to_string())
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Override the proxy's configured timeout for this call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn subpath(&self) -> &str {
        &self.subpath
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

pub type BodyStream = BoxStream<'static, Result<Bytes, ProxyError>>;

/// Backend response relayed to the caller. The body is never parsed here.
pub struct ProxyResponse {
    pub status: StatusCode,
    pub content_type: HeaderValue,
    pub set_cookie: Option<HeaderValue>,
    body: BodyStream,
}

impl ProxyResponse {
    pub fn from_stream(status: StatusCode, body: BodyStream) -> Self {
        Self {
            status,
            content_type: HeaderValue::from_static("application/json"),
            set_cookie: None,
            body,
        }
    }

    pub fn from_bytes(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self::from_stream(status, stream::once(async move { Ok(body) }).boxed())
    }

    pub fn with_content_type(mut self, content_type: HeaderValue) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_set_cookie(mut self, cookie: Option<HeaderValue>) -> Self {
        self.set_cookie = cookie;
        self
    }

    /// Collect the whole body as text (lossy UTF-8)
    pub async fn text(self) -> Result<String, ProxyError> {
        let bytes = self
            .body
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("set_cookie", &self.set_cookie)
            .finish_non_exhaustive()
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from_stream(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, self.content_type);
        if let Some(cookie) = self.set_cookie {
            headers.insert(header::SET_COOKIE, cookie);
        }
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        response
    }
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait Forward: Send + Sync {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError>;
}

// ============================================================================
// SBIO: I/O implementation (real HTTP client)
// ============================================================================

#[derive(Clone)]
pub struct RequestProxy {
    client: reqwest::Client,
    config: Arc<BackendConfig>,
}

impl RequestProxy {
    pub fn new(config: Arc<BackendConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Keep the failure detail only in debug mode
    fn expose(&self, detail: String) -> Option<String> {
        self.config.debug.then_some(detail)
    }

    fn upstream_failure(&self, err: reqwest::Error, timeout: Duration) -> ProxyError {
        let detail = err.to_string();
        if err.is_timeout() {
            ProxyError::UpstreamTimeout {
                timeout,
                detail: self.expose(detail),
            }
        } else {
            ProxyError::UpstreamError {
                detail: self.expose(detail),
            }
        }
    }
}

#[async_trait]
impl Forward for RequestProxy {
    async fn forward(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let Some(base) = self.config.base_url() else {
            error!("proxy error: backend URL is not configured");
            return Err(ProxyError::BackendNotConfigured);
        };
        let target = match resolve_route(base, request.subpath()) {
            Ok(target) => target,
            Err(ProxyError::InvalidRoute { route, reason, .. }) => {
                error!("proxy rejected route '{}': {}", route, reason);
                return Err(ProxyError::InvalidRoute {
                    detail: self.expose(reason.to_string()),
                    route,
                    reason,
                });
            }
            Err(e) => return Err(e),
        };
        let timeout = request.timeout().unwrap_or(self.config.timeout);

        info!("proxy → {} {}", request.method(), target);

        let ProxyRequest {
            method,
            headers,
            body,
            ..
        } = request;

        let send = self
            .client
            .request(method, target.clone())
            .headers(headers)
            .body(body)
            .send();

        // The timer lives only as long as this await; it is dropped with the
        // `Timeout` future whichever way the call ends.
        let upstream = match tokio::time::timeout(timeout, send).await {
            Ok(Ok(upstream)) => upstream,
            Ok(Err(e)) => {
                error!("proxy error for {}: {}", target, e);
                return Err(self.upstream_failure(e, timeout));
            }
            Err(_) => {
                let detail = format!("no response from {} within {}ms", target, timeout.as_millis());
                error!("proxy error: {}", detail);
                return Err(ProxyError::UpstreamTimeout {
                    timeout,
                    detail: self.expose(detail),
                });
            }
        };

        debug!("proxy ← {} {}", upstream.status(), target);

        let status = upstream.status();
        let content_type = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));
        let set_cookie = upstream.headers().get(header::SET_COOKIE).cloned();

        let debug = self.config.debug;
        let body = upstream
            .bytes_stream()
            .map_err(move |e| {
                error!("proxy body error: {}", e);
                ProxyError::UpstreamError {
                    detail: debug.then(|| e.to_string()),
                }
            })
            .boxed();

        Ok(ProxyResponse::from_stream(status, body)
            .with_content_type(content_type)
            .with_set_cookie(set_cookie))
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================
