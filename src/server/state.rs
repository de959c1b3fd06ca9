use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::pipeline::{PipelineJob, PipelineOrchestrator};
use crate::proxy::{Forward, RequestProxy};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BackendConfig>,
    pub proxy: Arc<dyn Forward>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub active_jobs: Arc<DashMap<Uuid, PipelineJob>>,
}

impl AppState {
    pub fn new(config: BackendConfig) -> Self {
        let config = Arc::new(config);
        let proxy: Arc<dyn Forward> = Arc::new(RequestProxy::new(config.clone()));
        Self::with_forwarder(config, proxy)
    }

    /// Build state around any forwarder (used to swap the backend in tests)
    pub fn with_forwarder(config: Arc<BackendConfig>, proxy: Arc<dyn Forward>) -> Self {
        let orchestrator = Arc::new(
            PipelineOrchestrator::new(proxy.clone(), config.stage_route.clone())
                .with_stage_timeout(config.timeout)
                .with_debug(config.debug),
        );

        Self {
            config,
            proxy,
            orchestrator,
            active_jobs: Arc::new(DashMap::new()),
        }
    }

    /// Register a running job; it is removed when the guard drops
    pub fn track_job(&self, job: &PipelineJob) -> JobGuard {
        self.active_jobs.insert(job.job_id, job.clone());
        JobGuard {
            jobs: self.active_jobs.clone(),
            job_id: job.job_id,
        }
    }

    pub fn active_job_count(&self) -> usize {
        self.active_jobs.len()
    }
}

/// Removes a job from the registry when the handler finishes or is dropped
pub struct JobGuard {
    jobs: Arc<DashMap<Uuid, PipelineJob>>,
    job_id: Uuid,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.jobs.remove(&self.job_id);
    }
}
