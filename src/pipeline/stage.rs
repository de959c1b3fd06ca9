use std::fmt;

use axum::http::StatusCode;
use serde::Serialize;

use crate::proxy::ProxyError;

/// Literal body a preparation stage returns when it is done
pub const SUCCESS_TOKEN: &str = "success";

/// One step of the video pipeline, numbered 0..=4
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Stage(u8);

impl Stage {
    /// Independent stages, run concurrently
    pub const PREPARE: [Stage; 4] = [Stage(0), Stage(1), Stage(2), Stage(3)];

    /// Dependent stage that returns the result URL
    pub const FINALIZE: Stage = Stage(4);

    /// Every stage in execution order
    pub const ALL: [Stage; 5] = [Stage(0), Stage(1), Stage(2), Stage(3), Stage(4)];

    pub fn index(self) -> u8 {
        self.0
    }

    /// Payload for the backend's video stage route
    pub fn payload(self, project_folder: &str) -> serde_json::Value {
        serde_json::json!({
            "project_folder": project_folder,
            "num": self.0,
        })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the backend said for a stage that got an answer
#[derive(Debug, Clone)]
pub struct StageResponse {
    pub status: StatusCode,
    pub body: String,
}

impl StageResponse {
    pub fn trimmed(&self) -> &str {
        self.body.trim()
    }
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: Stage,
    pub response: Result<StageResponse, ProxyError>,
}

impl StageResult {
    /// A preparation stage succeeded iff it answered 2xx with the success token
    pub fn is_success(&self) -> bool {
        match &self.response {
            Ok(resp) => resp.status.is_success() && resp.trimmed() == SUCCESS_TOKEN,
            Err(_) => false,
        }
    }
}

/// Stages among `results` that did not succeed, sorted by index.
///
/// Pure and independent of the order the results arrive in.
pub fn failed_stages(results: &[StageResult]) -> Vec<Stage> {
    let mut failed: Vec<Stage> = results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.stage)
        .collect();
    failed.sort_unstable();
    failed.dedup();
    failed
}
