//! Core domain types shared across the pipeline.

pub mod catalogue;
pub mod document;
pub mod error;

pub use catalogue::{CatalogueOutline, OutlineNode, PendingItem};
pub use document::{GeneratedArtifact, GenerationAttempt};
pub use error::{DocError, ErrorClassifier, FailureClass, Result};
