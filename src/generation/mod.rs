//! Document generation: per-item pipeline and batch orchestration

pub mod orchestrator;
pub mod pipeline;

pub use orchestrator::{BatchReport, OrchestratorConfig, SectionWorker, TaskOrchestrator};
pub use pipeline::{DocumentGenerator, GenerationConfig};
