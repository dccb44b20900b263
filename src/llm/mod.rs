//! Completion Service Boundary
//!
//! The language-model completion service is an external collaborator; this
//! module defines the three call shapes the pipeline consumes and the typed
//! stream-update surface.
//!
//! ## Call shapes
//!
//! - [`CompletionClient::invoke_tool`]: single request that forces one
//!   structured tool invocation and returns its payload
//! - [`CompletionClient::open_stream`]: autonomous multi-turn request where
//!   the model drives tools itself; consumed as a [`StreamUpdate`] stream
//! - [`CompletionClient::summarize`]: short forced-tool summarization call

pub mod timeout;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Result;

pub use timeout::with_timeout;

/// Token usage reported by the completion service
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A request that forces a single named tool invocation
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    /// Tool the model must invoke exactly once
    pub tool: String,
    pub prompt: String,
    pub system: Option<String>,
}

impl ToolCallRequest {
    pub fn new(tool: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            prompt: prompt.into(),
            system: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Response to a forced tool call
#[derive(Debug, Clone)]
pub struct ToolCallResponse {
    /// Arguments the model handed to the forced tool, if it invoked it
    pub payload: Option<Value>,
    /// Raw assistant transcript, kept for fallback JSON extraction
    pub transcript: String,
    pub usage: TokenUsage,
}

/// A multi-turn streaming request where the model drives tools autonomously
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub prompt: String,
    pub system: Option<String>,
    /// Tool names offered to the model for this session
    pub tools: Vec<String>,
}

/// One update from an autonomous streaming session.
///
/// Variants are matched exhaustively by consumers; adding a variant is a
/// breaking change on purpose.
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    /// Incremental assistant text
    TextDelta(String),
    /// Incremental tool-call argument text (distinct from assistant text)
    ToolArgumentsDelta { name: String, fragment: String },
    /// A fully assembled tool invocation ready to dispatch
    ToolInvocation { name: String, arguments: Value },
    /// Token usage report for the turn so far
    Usage(TokenUsage),
    /// The session completed normally
    Done,
}

/// Stream of updates from one streaming session
pub type UpdateStream = Pin<Box<dyn Stream<Item = Result<StreamUpdate>> + Send>>;

/// Shared completion client handle used across concurrent workers
pub type SharedClient = Arc<dyn CompletionClient>;

/// The completion service as consumed by this pipeline
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Issue a single request that forces one structured tool invocation
    async fn invoke_tool(&self, request: &ToolCallRequest) -> Result<ToolCallResponse>;

    /// Start an autonomous multi-turn session, consumed as an update stream
    async fn open_stream(&self, request: &StreamRequest) -> Result<UpdateStream>;

    /// Short forced-tool-call summarization over a content excerpt
    async fn summarize(&self, content: &str) -> Result<String>;

    /// Client name for logging
    fn name(&self) -> &str;
}
