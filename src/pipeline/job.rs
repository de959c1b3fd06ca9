use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::stage::Stage;

/// A single run of the video pipeline for one project.
///
/// Jobs are independent: each run gets its own id and nothing is carried
/// over from earlier runs for the same project.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineJob {
    /// Unique identifier for this run
    pub job_id: Uuid,
    /// Backend project folder, passed through untouched
    pub project_id: String,
    /// Stages in execution order
    pub stages: [Stage; 5],
    pub started_at: DateTime<Utc>,
}

impl PipelineJob {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), project_id)
    }

    /// Create a job with a specific ID (useful for testing)
    pub fn with_id(job_id: Uuid, project_id: impl Into<String>) -> Self {
        Self {
            job_id,
            project_id: project_id.into(),
            stages: Stage::ALL,
            started_at: Utc::now(),
        }
    }

    /// Milliseconds since the job started
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}
