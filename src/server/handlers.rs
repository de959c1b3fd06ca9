use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::pipeline::{PipelineJob, PipelineOutcome};
use crate::proxy::ProxyRequest;
use crate::server::state::AppState;

/// Backend routes behind each `/api` endpoint
pub mod routes {
    pub const FORM: &str = "form";
    pub const CHAT: &str = "chat";
    pub const CHAT_FIN: &str = "chat-fin";
    pub const EDIT: &str = "edit";
    pub const SAVE: &str = "save";
    pub const CHAT_INITIAL: &str = "chat-initial";
    pub const STORYBOARD: &str = "storyboard";
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Serialize)]
struct GatewayStatus {
    backend_configured: bool,
    active_jobs: usize,
    jobs: Vec<PipelineJob>,
}

/// Gateway status endpoint
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let mut jobs: Vec<PipelineJob> = state
        .active_jobs
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    jobs.sort_by_key(|job| job.started_at);

    Json(GatewayStatus {
        backend_configured: state.config.is_configured(),
        active_jobs: jobs.len(),
        jobs,
    })
}

/// Forward the request as-is and relay whatever the backend answers
async fn relay(state: &AppState, route: &str, method: Method, body: Bytes) -> Response {
    let request = ProxyRequest::new(method, route).with_body(body);
    match state.proxy.forward(request).await {
        Ok(response) => response.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn form(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    relay(&state, routes::FORM, method, body).await
}

pub async fn chat(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    relay(&state, routes::CHAT, method, body).await
}

pub async fn chat_fin(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    relay(&state, routes::CHAT_FIN, method, body).await
}

pub async fn edit(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    relay(&state, routes::EDIT, method, body).await
}

pub async fn save(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    relay(&state, routes::SAVE, method, body).await
}

pub async fn chat_initial(State(state): State<AppState>) -> Response {
    relay(&state, routes::CHAT_INITIAL, Method::GET, Bytes::new()).await
}

pub async fn storyboard(State(state): State<AppState>) -> Response {
    relay(&state, routes::STORYBOARD, Method::GET, Bytes::new()).await
}

/// Run a single video stage; the body carries `{project_folder, num}`
pub async fn video_stage(State(state): State<AppState>, method: Method, body: Bytes) -> Response {
    let route = state.config.stage_route.clone();
    relay(&state, &route, method, body).await
}

#[derive(Debug, Deserialize)]
pub struct PipelineRunRequest {
    pub project_folder: String,
}

#[derive(Debug, Serialize)]
pub struct PipelineRunResponse {
    pub job_id: Uuid,
    pub url: String,
}

/// Run all five video stages for a project and return the result URL.
///
/// The run is spawned so it finishes even if the caller goes away.
pub async fn video_pipeline(
    State(state): State<AppState>,
    Json(request): Json<PipelineRunRequest>,
) -> Response {
    let job = PipelineJob::new(request.project_folder);
    let job_id = job.job_id;
    let guard = state.track_job(&job);
    let orchestrator = state.orchestrator.clone();

    let run = tokio::spawn(async move {
        let _guard = guard;
        orchestrator.run_job(&job).await
    });

    match run.await {
        Ok(PipelineOutcome::Success(url)) => {
            Json(PipelineRunResponse { job_id, url }).into_response()
        }
        Ok(PipelineOutcome::Failure(e)) => e.into_response(),
        Err(e) => {
            error!("Pipeline {} task aborted: {}", job_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "internal_error"})),
            )
                .into_response()
        }
    }
}

/// Create the Axum router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/api/form", post(form))
        .route("/api/chat", post(chat))
        .route("/api/chat-fin", post(chat_fin))
        .route("/api/edit", post(edit))
        .route("/api/save", post(save))
        .route("/api/chat/initial", get(chat_initial))
        .route("/api/storyboard", get(storyboard))
        .route("/api/video", post(video_stage))
        .route("/api/video/pipeline", post(video_pipeline))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::proxy::forward::mock::MockForwarder;
    use crate::proxy::{Forward, ProxyError, ProxyResponse};
    use axum::{body::Body, http::Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_app() -> Router {
        create_router(AppState::new(BackendConfig::unconfigured()))
    }

    fn create_mock_app(mock: Arc<MockForwarder>) -> Router {
        let config = Arc::new(BackendConfig::new(Some("http://backend.invalid")).unwrap());
        let proxy: Arc<dyn Forward> = mock;
        create_router(AppState::with_forwarder(config, proxy))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = create_test_app();

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"backend_configured": false, "active_jobs": 0, "jobs": []})
        );
    }

    #[tokio::test]
    async fn test_unconfigured_backend_returns_503() {
        let app = create_test_app();

        let response = app
            .oneshot(post_json("/api/chat", serde_json::json!({"message": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["cache-control"], "no-store");
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "backend_not_configured"})
        );
    }

    #[tokio::test]
    async fn test_routes_map_to_backend_paths() {
        let mock = Arc::new(MockForwarder::text("{}"));
        let app = create_mock_app(mock.clone());

        let cases = [
            ("POST", "/api/form", "form"),
            ("POST", "/api/chat", "chat"),
            ("POST", "/api/chat-fin", "chat-fin"),
            ("POST", "/api/edit", "edit"),
            ("POST", "/api/save", "save"),
            ("POST", "/api/video", "video"),
            ("GET", "/api/chat/initial", "chat-initial"),
            ("GET", "/api/storyboard", "storyboard"),
        ];

        for (method, uri, _) in cases {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }

        let calls = mock.calls();
        assert_eq!(calls.len(), cases.len());
        for (call, (method, _, route)) in calls.iter().zip(cases) {
            assert_eq!(call.subpath(), route);
            assert_eq!(call.method().as_str(), method);
        }
    }

    #[tokio::test]
    async fn test_body_is_forwarded_verbatim() {
        let mock = Arc::new(MockForwarder::text("{}"));
        let app = create_mock_app(mock.clone());

        let payload = serde_json::json!({"messages": [{"role": "user", "text": "こんにちは"}]});
        app.oneshot(post_json("/api/chat", payload.clone()))
            .await
            .unwrap();

        let forwarded: serde_json::Value =
            serde_json::from_slice(mock.calls()[0].body()).unwrap();
        assert_eq!(forwarded, payload);
    }

    #[tokio::test]
    async fn test_upstream_status_is_relayed() {
        let mock = Arc::new(MockForwarder::new(|_| async {
            Ok(ProxyResponse::from_bytes(StatusCode::IM_A_TEAPOT, r#"{"reply":"no"}"#))
        }));
        let app = create_mock_app(mock);

        let response = app
            .oneshot(post_json("/api/chat", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(body_json(response).await, serde_json::json!({"reply": "no"}));
    }

    #[tokio::test]
    async fn test_pipeline_endpoint_success() {
        let mock = Arc::new(MockForwarder::new(|req| {
            let payload: serde_json::Value = serde_json::from_slice(req.body()).unwrap();
            let body = if payload["num"] == 4 {
                "https://example.com/v.mp4"
            } else {
                "success"
            };
            async move { Ok(ProxyResponse::from_bytes(StatusCode::OK, body)) }
        }));
        let state = AppState::with_forwarder(
            Arc::new(BackendConfig::new(Some("http://backend.invalid")).unwrap()),
            mock.clone(),
        );
        let app = create_router(state.clone());

        let response = app
            .oneshot(post_json(
                "/api/video/pipeline",
                serde_json::json!({"project_folder": "projects/001/"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["url"], "https://example.com/v.mp4");
        assert!(Uuid::parse_str(json["job_id"].as_str().unwrap()).is_ok());
        assert_eq!(mock.call_count(), 5);
        assert_eq!(state.active_job_count(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_endpoint_reports_failed_stages() {
        let mock = Arc::new(MockForwarder::new(|req| {
            let payload: serde_json::Value = serde_json::from_slice(req.body()).unwrap();
            let body = if payload["num"] == 2 { "pending" } else { "success" };
            async move { Ok(ProxyResponse::from_bytes(StatusCode::OK, body)) }
        }));
        let app = create_mock_app(mock.clone());

        let response = app
            .oneshot(post_json(
                "/api/video/pipeline",
                serde_json::json!({"project_folder": "p"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "stage_failure", "stages": [2]})
        );
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_pipeline_endpoint_unconfigured() {
        let mock = Arc::new(MockForwarder::new(|_| async {
            Err(ProxyError::BackendNotConfigured)
        }));
        let app = create_mock_app(mock);

        let response = app
            .oneshot(post_json(
                "/api/video/pipeline",
                serde_json::json!({"project_folder": "p"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["stages"], serde_json::json!([0, 1, 2, 3]));
    }

    #[tokio::test]
    async fn test_pipeline_survives_dropped_request() {
        let mock = Arc::new(MockForwarder::new(|req| {
            let payload: serde_json::Value = serde_json::from_slice(req.body()).unwrap();
            let finalize = payload["num"] == 4;
            async move {
                if finalize {
                    return Ok(ProxyResponse::from_bytes(StatusCode::OK, "https://x/v.mp4"));
                }
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                Ok(ProxyResponse::from_bytes(StatusCode::OK, "success"))
            }
        }));
        let state = AppState::with_forwarder(
            Arc::new(BackendConfig::new(Some("http://backend.invalid")).unwrap()),
            mock.clone(),
        );
        let app = create_router(state.clone());

        // The caller gives up while the preparation stages are still running
        let dropped = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            app.oneshot(post_json(
                "/api/video/pipeline",
                serde_json::json!({"project_folder": "p"}),
            )),
        )
        .await;
        assert!(dropped.is_err());
        assert_eq!(state.active_job_count(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;
        assert_eq!(mock.call_count(), 5);
        assert_eq!(state.active_job_count(), 0);
    }

    #[tokio::test]
    async fn test_status_lists_running_jobs() {
        let state = AppState::new(BackendConfig::unconfigured());
        let job = PipelineJob::new("projects/007/");
        let _guard = state.track_job(&job);

        let response = create_router(state)
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let json = body_json(response).await;
        assert_eq!(json["active_jobs"], 1);
        assert_eq!(json["jobs"][0]["job_id"], job.job_id.to_string());
        assert_eq!(json["jobs"][0]["project_id"], "projects/007/");
        assert!(json["jobs"][0]["started_at"].is_string());
    }

    #[tokio::test]
    async fn test_pipeline_endpoint_rejects_missing_project() {
        let app = create_mock_app(Arc::new(MockForwarder::text("success")));

        let response = app
            .oneshot(post_json("/api/video/pipeline", serde_json::json!({})))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
