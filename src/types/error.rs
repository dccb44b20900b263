//! Unified Error Type System
//!
//! Centralized error types for the pipeline, with failure classification
//! driving retry and backoff decisions.
//!
//! ## Failure Classes
//!
//! - **Network**: transport or cancellation failures (retry with backoff)
//! - **RateLimit**: quota exhaustion (retry, abort on long streaks)
//! - **JsonParse**: malformed structured output (bounded retry)
//! - **Model**: model-side refusals or capability errors (short retry budget)
//! - **QualityGate**: content rejected by the quality evaluator (shorter backoff)
//! - **Unknown**: conservative retry
//!
//! ## Design Principles
//!
//! - Single unified error type (`DocError`) for the entire crate
//! - Structured variants with context for better debugging
//! - Class-based routing for retry decisions
//! - No panic/unwrap in library code - all errors are recoverable values

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Failure Classification
// =============================================================================

/// Failure classes used by the retry loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transport failure or timeout-driven cancellation
    Network,
    /// API rate or quota limiting
    RateLimit,
    /// Structured payload could not be parsed
    JsonParse,
    /// Model-side error (refusal, unsupported model, capability)
    Model,
    /// Content rejected by the quality gate
    QualityGate,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "NETWORK"),
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::JsonParse => write!(f, "JSON_PARSE"),
            Self::Model => write!(f, "MODEL"),
            Self::QualityGate => write!(f, "QUALITY_GATE"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classifier mapping errors onto retry-relevant failure classes
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an arbitrary error message
    pub fn classify_message(message: &str) -> FailureClass {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota")
        {
            return FailureClass::RateLimit;
        }

        if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("cancel")
            || lower.contains("unreachable")
        {
            return FailureClass::Network;
        }

        if lower.contains("parse")
            || lower.contains("json")
            || lower.contains("deserialize")
            || lower.contains("unexpected token")
        {
            return FailureClass::JsonParse;
        }

        if lower.contains("model") {
            return FailureClass::Model;
        }

        FailureClass::Unknown
    }

    /// Classify a `DocError` with type-based routing before string matching
    pub fn classify(err: &DocError) -> FailureClass {
        match err {
            DocError::Timeout { .. } => FailureClass::Network,
            DocError::Io(_) => FailureClass::Network,
            DocError::Json(_) => FailureClass::JsonParse,
            DocError::QualityGate { .. } => FailureClass::QualityGate,
            DocError::Llm { message } => Self::classify_message(message),
            other => Self::classify_message(&other.to_string()),
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum DocError {
    // -------------------------------------------------------------------------
    // System errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Completion service errors
    // -------------------------------------------------------------------------
    #[error("Completion service error: {message}")]
    Llm { message: String },

    /// Operation exceeded its timeout budget; always retryable
    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Model handed back an empty or missing tool payload
    #[error("Empty tool payload from {call}")]
    EmptyPayload { call: String },

    // -------------------------------------------------------------------------
    // Pipeline errors
    // -------------------------------------------------------------------------
    /// Content rejected by the quality evaluator
    #[error("Quality gate rejected '{item}': {issues:?}")]
    QualityGate { item: String, issues: Vec<String> },

    /// A document exhausted its outer retry budget
    #[error("Generation failed for '{item}' after {attempts} attempts: {reason}")]
    Terminal {
        item: String,
        attempts: u32,
        reason: String,
    },

    #[error("Outline validation failed: {0}")]
    OutlineInvalid(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl DocError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a completion-service error from a message
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Failure class of this error for retry routing
    pub fn class(&self) -> FailureClass {
        ErrorClassifier::classify(self)
    }
}

pub type Result<T> = std::result::Result<T, DocError>;

// =============================================================================
// Tests
// =============================================================================
