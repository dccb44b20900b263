//! Content quality gating: deterministic evaluation plus diagram integrity.

pub mod diagram;
pub mod evaluator;

pub use diagram::{DiagramChecker, DiagramRepairer, DiagramValidation};
pub use evaluator::{QualityConfig, QualityEvaluator, QualityMetrics, QualityReport};
