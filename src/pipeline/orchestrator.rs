use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::job::PipelineJob;
use super::stage::{failed_stages, Stage, StageResponse, StageResult};
use crate::config::DEFAULT_TIMEOUT;
use crate::proxy::{Forward, ProxyError, ProxyRequest};

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Video stages did not report success: {}", format_stages(.stages))]
    StageFailure { stages: Vec<Stage> },

    #[error("Finalize stage returned no result URL")]
    MissingResultUrl,

    #[error("Finalize stage was rejected with status {status}")]
    FinalizeRejected { status: StatusCode },

    #[error("Finalize stage failed: {0}")]
    Proxy(#[from] ProxyError),
}

fn format_stages(stages: &[Stage]) -> String {
    stages
        .iter()
        .map(Stage::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::StageFailure { .. } => "stage_failure",
            PipelineError::MissingResultUrl => "missing_result_url",
            PipelineError::FinalizeRejected { .. } => "finalize_rejected",
            PipelineError::Proxy(e) => e.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Proxy(e) => e.status(),
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug, Serialize)]
struct PipelineErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stages: Option<Vec<Stage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let body = PipelineErrorBody {
            error: self.kind(),
            stages: match &self {
                PipelineError::StageFailure { stages } => Some(stages.clone()),
                _ => None,
            },
            upstream_status: match &self {
                PipelineError::FinalizeRejected { status } => Some(status.as_u16()),
                _ => None,
            },
            detail: match &self {
                PipelineError::Proxy(e) => e.detail().map(str::to_string),
                _ => None,
            },
        };

        let mut response = (self.status(), Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}

/// Terminal result of one pipeline run
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// URL of the finished video
    Success(String),
    Failure(PipelineError),
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success(_))
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            PipelineOutcome::Success(url) => Some(url),
            PipelineOutcome::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> Result<String, PipelineError> {
        match self {
            PipelineOutcome::Success(url) => Ok(url),
            PipelineOutcome::Failure(e) => Err(e),
        }
    }
}

/// Drives the five-stage video job against the backend.
///
/// Holds no per-project state: every run starts from stage 0.
pub struct PipelineOrchestrator {
    proxy: Arc<dyn Forward>,
    stage_route: String,
    /// Limit for one stage call, body read included
    stage_timeout: Duration,
    debug: bool,
}

impl PipelineOrchestrator {
    pub fn new(proxy: Arc<dyn Forward>, stage_route: impl Into<String>) -> Self {
        Self {
            proxy,
            stage_route: stage_route.into(),
            stage_timeout: DEFAULT_TIMEOUT,
            debug: false,
        }
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Keep timeout detail on stage errors
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn stage_route(&self) -> &str {
        &self.stage_route
    }

    /// Run a fresh job for `project_id`
    pub async fn run_pipeline(&self, project_id: &str) -> PipelineOutcome {
        self.run_job(&PipelineJob::new(project_id)).await
    }

    pub async fn run_job(&self, job: &PipelineJob) -> PipelineOutcome {
        info!(
            "Starting video pipeline {} for project '{}'",
            job.job_id, job.project_id
        );

        // Fan out and let every stage finish, even after a sibling fails
        let results = join_all(
            Stage::PREPARE
                .iter()
                .map(|&stage| self.run_stage(job, stage)),
        )
        .await;

        let failed = failed_stages(&results);
        if !failed.is_empty() {
            warn!(
                "Pipeline {} stopped: stages [{}] did not report success",
                job.job_id,
                format_stages(&failed)
            );
            return PipelineOutcome::Failure(PipelineError::StageFailure { stages: failed });
        }

        match self.finalize(job).await {
            Ok(url) => {
                info!(
                    "Pipeline {} finished in {}ms: {}",
                    job.job_id,
                    job.elapsed_ms(),
                    url
                );
                PipelineOutcome::Success(url)
            }
            Err(e) => {
                warn!("Pipeline {} failed at finalize: {}", job.job_id, e);
                PipelineOutcome::Failure(e)
            }
        }
    }

    async fn run_stage(&self, job: &PipelineJob, stage: Stage) -> StageResult {
        let response = self.call_stage(job, stage).await;

        match &response {
            Ok(resp) => debug!(
                "Stage {} of {} answered {}: {:?}",
                stage,
                job.job_id,
                resp.status,
                resp.trimmed()
            ),
            Err(e) => warn!("Stage {} of {} failed: {}", stage, job.job_id, e),
        }

        StageResult { stage, response }
    }

    async fn call_stage(&self, job: &PipelineJob, stage: Stage) -> Result<StageResponse, ProxyError> {
        let request = ProxyRequest::json(&self.stage_route, &stage.payload(&job.project_id))
            .with_timeout(self.stage_timeout);

        // The whole body is buffered here, so the limit has to cover reading it too
        let call = async {
            let response = self.proxy.forward(request).await?;
            let status = response.status;
            let body = response.text().await?;
            Ok::<_, ProxyError>(StageResponse { status, body })
        };

        match tokio::time::timeout(self.stage_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProxyError::UpstreamTimeout {
                timeout: self.stage_timeout,
                detail: self.debug.then(|| {
                    format!(
                        "stage {} did not complete within {}ms",
                        stage,
                        self.stage_timeout.as_millis()
                    )
                }),
            }),
        }
    }

    async fn finalize(&self, job: &PipelineJob) -> Result<String, PipelineError> {
        let response = self.call_stage(job, Stage::FINALIZE).await?;

        if !response.status.is_success() {
            return Err(PipelineError::FinalizeRejected {
                status: response.status,
            });
        }

        let url = response.trimmed();
        if url.is_empty() {
            return Err(PipelineError::MissingResultUrl);
        }

        Ok(url.to_string())
    }
}
