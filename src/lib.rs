//! Docloom - Quality-Gated AI Documentation Generation Pipeline
//!
//! Orchestrates documentation generation for a source repository: a
//! synthesized catalogue plan, a bounded-concurrency batch scheduler, a
//! per-document generation state machine with a streaming fallback, a
//! deterministic quality gate, and SQLite persistence.
//!
//! ## Core Features
//!
//! - **Catalogue Synthesis**: hierarchical documentation plan via forced
//!   tool calls, with class-routed retries and JSON-fragment fallback
//! - **Bounded Orchestration**: at most K documents in flight, staggered
//!   admission, per-item failure isolation
//! - **Direct + Fallback Generation**: a quality-gated direct strategy with
//!   a last-resort streaming fallback and optional refinement
//! - **Quality Gate**: deterministic structural metrics, penalty scoring,
//!   and diagram integrity checking with in-place repair
//! - **Chunked Scanning**: ignore-rule filtered directory walks described as
//!   fixed-size file chunks
//!
//! ## Quick Start
//!
//! ```ignore
//! use docloom::{
//!     CatalogueSynthesizer, Config, DocumentGenerator, SqliteStore, TaskOrchestrator,
//! };
//!
//! let config = Config::load(None)?;
//! let store = Arc::new(SqliteStore::open("docloom.db")?);
//! let synthesizer = CatalogueSynthesizer::new(client.clone(), config.synthesis.clone());
//! let outline = synthesizer.synthesize(&context).await.expect("planning failed");
//! store.replace_outline_items("run-1", &outline.to_pending_items("run-1"))?;
//!
//! let generator = Arc::new(DocumentGenerator::new(
//!     client,
//!     config.generation.clone(),
//!     config.quality.clone(),
//! ));
//! let orchestrator = TaskOrchestrator::new(generator, store.clone(), config.orchestrator.clone());
//! let report = orchestrator.run(store.pending_items("run-1")?).await;
//! ```
//!
//! ## Modules
//!
//! - [`synthesis`]: catalogue planning with class-routed retry/backoff
//! - [`generation`]: per-document state machine and batch orchestrator
//! - [`quality`]: content evaluation and diagram integrity
//! - [`scanner`]: ignore-rule directory walks and content chunking
//! - [`llm`]: completion-service boundary (forced tool calls, streams)
//! - [`tools`]: the tool-call surface exposed to the model
//! - [`storage`]: SQLite persistence behind the `DocumentStore` trait

pub mod config;
pub mod constants;
pub mod generation;
pub mod llm;
pub mod quality;
pub mod scanner;
pub mod storage;
pub mod synthesis;
pub mod tools;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, StorageConfig};

// Error Types
pub use types::error::{DocError, ErrorClassifier, FailureClass, Result};

// Domain Types
pub use types::{CatalogueOutline, GeneratedArtifact, OutlineNode, PendingItem};

// Storage
pub use storage::database::PoolConfig;
pub use storage::{DocumentStore, SharedStore, SqliteStore};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use generation::{
    BatchReport, DocumentGenerator, GenerationConfig, OrchestratorConfig, SectionWorker,
    TaskOrchestrator,
};
pub use synthesis::{CatalogueSynthesizer, SynthesisConfig};

// =============================================================================
// Quality Re-exports
// =============================================================================

pub use quality::{
    DiagramChecker, DiagramRepairer, QualityConfig, QualityEvaluator, QualityReport,
};

// =============================================================================
// Boundary Re-exports
// =============================================================================

pub use llm::{
    CompletionClient, SharedClient, StreamRequest, StreamUpdate, TokenUsage, ToolCallRequest,
    ToolCallResponse, with_timeout,
};
pub use scanner::{ChunkedContentReader, FileChunk, IgnoreRules, RepositoryScanner};
pub use tools::ToolSession;
