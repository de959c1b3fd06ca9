pub mod job;
pub mod orchestrator;
pub mod stage;

pub use job::PipelineJob;
pub use orchestrator::{PipelineError, PipelineOrchestrator, PipelineOutcome};
pub use stage::{failed_stages, Stage, StageResponse, StageResult, SUCCESS_TOKEN};
