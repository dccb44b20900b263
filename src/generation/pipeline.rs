//! Per-Document Generation State Machine
//!
//! One pending item moves through `Direct -> FallbackStreaming ->
//! Refine (optional) -> Accepted | Failed`:
//!
//! - **Direct** forces a single `generate` tool call and is quality-gated:
//!   a rejected payload fails the attempt.
//! - **FallbackStreaming** lets the model drive tools autonomously over a
//!   timeout-bounded update stream with a bounded inner retry loop. Its
//!   output is accepted even when the quality gate fails - a deliberate
//!   last-resort escape valve so a document always makes forward progress;
//!   the failing report is logged instead of raised. Do not unify the two
//!   gating behaviors.
//! - **Refine** asks for small localized edits; refine errors never abort
//!   the pipeline.
//!
//! The outer retry loop (`generate_with_retry`) wraps the whole sequence
//! and is what the orchestrator invokes per item.

use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::constants::generation as g;
use crate::llm::{
    SharedClient, StreamRequest, StreamUpdate, TokenUsage, ToolCallRequest, with_timeout,
};
use crate::quality::{
    DiagramChecker, DiagramRepairer, QualityConfig, QualityEvaluator, QualityReport,
};
use crate::tools::{GENERATE_TOOL, MULTI_EDIT_TOOL, READ_TOOL, ToolSession, WRITE_TOOL};
use crate::types::{DocError, FailureClass, GeneratedArtifact, GenerationAttempt, PendingItem, Result};

/// Tuning for the per-document state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Run the refinement pass after fallback streaming
    pub refine: bool,
    /// Outer retries before an item fails terminally
    pub max_outer_retries: u32,
    /// Timeout for one fallback streaming attempt (seconds)
    pub stream_timeout_secs: u64,
    /// Inner attempts while consuming the fallback stream
    pub max_stream_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            refine: false,
            max_outer_retries: g::MAX_OUTER_RETRIES,
            stream_timeout_secs: g::STREAM_TIMEOUT_SECS,
            max_stream_attempts: g::MAX_STREAM_ATTEMPTS,
        }
    }
}

/// States of the fallback stream consumption machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    TimedOut,
    Retrying,
    Done,
}

/// Drives one pending item from prompt to accepted artifact
pub struct DocumentGenerator {
    client: SharedClient,
    config: GenerationConfig,
    quality: QualityConfig,
}

impl DocumentGenerator {
    pub fn new(client: SharedClient, config: GenerationConfig, quality: QualityConfig) -> Self {
        Self {
            client,
            config,
            quality,
        }
    }

    /// Outer retry loop around the full direct->fallback sequence.
    ///
    /// Backoff is `10s x retry`, or `5s x retry` when the failure was a
    /// quality-gate rejection. Exhaustion raises a terminal error.
    pub async fn generate_with_retry(&self, item: &PendingItem) -> Result<GeneratedArtifact> {
        let mut last_reason = String::new();
        for retry in 1..=self.config.max_outer_retries {
            match self.generate(item).await {
                Ok(artifact) => return Ok(artifact),
                Err(err) => {
                    let delay_ms = if err.class() == FailureClass::QualityGate {
                        g::QUALITY_RETRY_DELAY_MS * retry as u64
                    } else {
                        g::OUTER_RETRY_DELAY_MS * retry as u64
                    };
                    warn!(
                        item = %item.name,
                        retry,
                        class = %err.class(),
                        "generation attempt failed: {err}; backing off {delay_ms}ms"
                    );
                    last_reason = err.to_string();
                    if retry < self.config.max_outer_retries {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
            }
        }
        Err(DocError::Terminal {
            item: item.name.clone(),
            attempts: self.config.max_outer_retries,
            reason: last_reason,
        })
    }

    /// One pass of the state machine: direct, then fallback on any failure.
    pub async fn generate(&self, item: &PendingItem) -> Result<GeneratedArtifact> {
        let attempt = match self.direct_attempt(item).await {
            Ok(attempt) => attempt,
            Err(err) => {
                warn!(item = %item.name, "direct strategy errored: {err}; entering fallback");
                GenerationAttempt::failed(err.to_string(), None)
            }
        };

        let artifact = match attempt {
            GenerationAttempt {
                success: true,
                artifact: Some(artifact),
                ..
            } => artifact,
            GenerationAttempt { failure_reason, .. } => {
                if let Some(reason) = &failure_reason {
                    info!(item = %item.name, "direct strategy rejected: {reason}");
                }
                self.fallback_streaming(item).await?
            }
        };

        Ok(self.finalize(item, artifact))
    }

    // =========================================================================
    // Direct strategy
    // =========================================================================

    /// Single forced `generate` tool call, gated on quality.
    async fn direct_attempt(&self, item: &PendingItem) -> Result<GenerationAttempt> {
        let request = ToolCallRequest::new(GENERATE_TOOL, self.authoring_prompt(item))
            .with_system(SYSTEM_PROMPT.to_string());
        let response = self.client.invoke_tool(&request).await?;

        let payload = response.payload.ok_or(DocError::EmptyPayload {
            call: GENERATE_TOOL.to_string(),
        })?;
        let content = payload
            .get("content")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .ok_or(DocError::EmptyPayload {
                call: GENERATE_TOOL.to_string(),
            })?
            .to_string();

        let report = QualityEvaluator::new(&self.quality).evaluate(&content);
        if !report.passed {
            return Ok(GenerationAttempt::failed(
                DocError::QualityGate {
                    item: item.name.clone(),
                    issues: report.issues.clone(),
                }
                .to_string(),
                Some(report.metrics),
            ));
        }

        let summary = match payload.get("summary").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => self.summarize(&content).await,
        };

        let mut artifact =
            GeneratedArtifact::new(item.id, item.title.clone(), content).with_summary(summary);
        artifact.record_metrics(&report.metrics);
        Ok(GenerationAttempt::succeeded(artifact, Some(report.metrics)))
    }

    // =========================================================================
    // Fallback streaming strategy
    // =========================================================================

    /// Autonomous multi-turn session with bounded inner retries.
    ///
    /// Each attempt runs the stream under its own timeout; expiry and
    /// transport failures are retried with escalating delays, and the
    /// machine aborts with a timeout error once attempts are exhausted.
    async fn fallback_streaming(&self, item: &PendingItem) -> Result<GeneratedArtifact> {
        let timeout = Duration::from_secs(self.config.stream_timeout_secs);
        let mut state = StreamState::Streaming;
        let mut attempt = 0u32;

        let session = loop {
            attempt += 1;
            debug!(item = %item.name, attempt, ?state, "starting fallback stream attempt");
            state = StreamState::Streaming;

            match with_timeout(timeout, self.consume_stream(item), "fallback stream").await {
                Ok(session) => {
                    state = StreamState::Done;
                    break session;
                }
                Err(err) => {
                    let exhausted = attempt >= self.config.max_stream_attempts;
                    let delay_ms = match err.class() {
                        FailureClass::Network if matches!(err, DocError::Timeout { .. }) => {
                            state = StreamState::TimedOut;
                            g::STREAM_TIMEOUT_DELAY_MS
                        }
                        FailureClass::Network => g::STREAM_TRANSPORT_DELAY_MS * attempt as u64,
                        _ => g::STREAM_UNKNOWN_DELAY_MS,
                    };
                    if exhausted {
                        warn!(item = %item.name, attempt, ?state, "fallback stream exhausted retries");
                        return Err(DocError::timeout("fallback stream retries", timeout));
                    }
                    warn!(
                        item = %item.name,
                        attempt,
                        ?state,
                        "fallback stream attempt failed: {err}; retrying in {delay_ms}ms"
                    );
                    state = StreamState::Retrying;
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        };
        debug_assert_eq!(state, StreamState::Done);

        let content = session
            .document()
            .map(str::to_string)
            .filter(|c| !c.trim().is_empty())
            .ok_or(DocError::EmptyPayload {
                call: "fallback stream".to_string(),
            })?;

        let content = if self.config.refine {
            self.refine(item, content).await
        } else {
            content
        };

        let summary = match session.summary() {
            Some(s) => s.to_string(),
            None => self.summarize(&content).await,
        };

        Ok(GeneratedArtifact::new(item.id, item.title.clone(), content).with_summary(summary))
    }

    /// Open one stream and fold its updates into a tool session.
    async fn consume_stream(&self, item: &PendingItem) -> Result<ToolSession> {
        let request = StreamRequest {
            prompt: self.authoring_prompt(item),
            system: Some(SYSTEM_PROMPT.to_string()),
            tools: vec![
                GENERATE_TOOL.to_string(),
                READ_TOOL.to_string(),
                WRITE_TOOL.to_string(),
                MULTI_EDIT_TOOL.to_string(),
            ],
        };

        let mut stream = self.client.open_stream(&request).await?;
        let mut session = ToolSession::new();
        let mut usage = TokenUsage::default();

        while let Some(update) = stream.next().await {
            match update? {
                StreamUpdate::TextDelta(_) => {}
                StreamUpdate::ToolArgumentsDelta { name, fragment } => {
                    debug!(tool = %name, len = fragment.len(), "tool arguments delta");
                }
                StreamUpdate::ToolInvocation { name, arguments } => {
                    session.dispatch(&name, &arguments);
                }
                StreamUpdate::Usage(u) => usage.add(u),
                StreamUpdate::Done => break,
            }
        }

        debug!(
            item = %item.name,
            tokens = usage.total(),
            "fallback stream session finished"
        );
        Ok(session)
    }

    // =========================================================================
    // Refinement & finalization
    // =========================================================================

    /// One edit-oriented pass over already-produced content. Failures are
    /// logged and swallowed; the best available content always survives.
    async fn refine(&self, item: &PendingItem, content: String) -> String {
        let request = StreamRequest {
            prompt: format!(
                "Improve the existing document for '{}' with small localized edits. \
                 Use read to inspect it and multi_edit to adjust wording, structure, \
                 or diagrams. Do not rewrite it from scratch.",
                item.title
            ),
            system: Some(SYSTEM_PROMPT.to_string()),
            tools: vec![READ_TOOL.to_string(), MULTI_EDIT_TOOL.to_string()],
        };

        let refined = async {
            let mut stream = self.client.open_stream(&request).await?;
            let mut session = ToolSession::with_document(content.clone());
            while let Some(update) = stream.next().await {
                match update? {
                    StreamUpdate::ToolInvocation { name, arguments } => {
                        session.dispatch(&name, &arguments);
                    }
                    StreamUpdate::Done => break,
                    _ => {}
                }
            }
            Ok::<Option<String>, DocError>(session.document().map(str::to_string))
        }
        .await;

        match refined {
            Ok(Some(updated)) if !updated.trim().is_empty() => updated,
            Ok(_) => content,
            Err(err) => {
                warn!(item = %item.name, "refinement pass failed, keeping original: {err}");
                content
            }
        }
    }

    /// Final quality logging plus diagram validate/repair/re-validate.
    fn finalize(&self, item: &PendingItem, mut artifact: GeneratedArtifact) -> GeneratedArtifact {
        let report = QualityEvaluator::new(&self.quality).evaluate(&artifact.content);
        self.log_final_quality(item, &report);
        artifact.record_metrics(&report.metrics);

        let validation = DiagramChecker::validate(&artifact.content);
        if !validation.valid {
            debug!(item = %item.name, issues = ?validation.issues, "repairing diagrams");
            artifact.content = DiagramRepairer::repair(&artifact.content);
            let revalidated = DiagramChecker::validate(&artifact.content);
            if !revalidated.valid {
                warn!(
                    item = %item.name,
                    issues = ?revalidated.issues,
                    "diagram issues remain after repair"
                );
            }
        }
        artifact
    }

    fn log_final_quality(&self, item: &PendingItem, report: &QualityReport) {
        if report.passed {
            info!(
                item = %item.name,
                score = report.metrics.quality_score,
                "final content passed quality evaluation"
            );
        } else {
            // Fallback output is accepted regardless; this is observability only.
            warn!(
                item = %item.name,
                score = report.metrics.quality_score,
                issues = ?report.issues,
                "final content failed quality evaluation (accepted anyway)"
            );
        }
    }

    /// Summarization with local recovery: errors degrade to a content prefix.
    async fn summarize(&self, content: &str) -> String {
        let excerpt: String = content.chars().take(g::SUMMARY_INPUT_CHARS).collect();
        match self.client.summarize(&excerpt).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!("summary generation failed, deriving from content: {err}");
                content.lines().find(|l| !l.trim().is_empty()).map_or_else(
                    String::new,
                    |l| l.trim_start_matches('#').trim().to_string(),
                )
            }
        }
    }

    fn authoring_prompt(&self, item: &PendingItem) -> String {
        format!(
            "Write the documentation section '{}' ({}).\n\n{}",
            item.title, item.name, item.authoring_prompt
        )
    }
}

const SYSTEM_PROMPT: &str = "You are a documentation author producing Markdown with mermaid \
diagrams for a source repository. Ground every statement in the repository content provided.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionClient, ToolCallResponse, UpdateStream};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn item() -> PendingItem {
        PendingItem {
            id: Uuid::new_v4(),
            scope: "run".into(),
            name: "overview".into(),
            title: "Overview".into(),
            authoring_prompt: "describe the system".into(),
            parent_id: None,
            order: 0,
            completed: false,
        }
    }

    fn passing_content() -> String {
        let hangul = "문서 생성 파이프라인은 품질 게이트를 통과해야 합니다. ".repeat(30);
        format!(
            "# 개요\n\n{hangul}\n\n## 구조\n\n```mermaid\ngraph TD\n  A --> B\n```\n\n\
## 흐름\n\n```mermaid\nsequenceDiagram\n  A->>B: 요청\n```\n\n## 상태\n\n```mermaid\nstateDiagram\n  [*] --> X\n```\n\n\
## 코드\n\n```rust\nfn main() {{}}\n```\n\n## 참고\n\n[링크](a.md)\n"
        )
    }

    /// Scripted client: direct attempts yield `direct`, streams yield a
    /// single generate invocation carrying `stream_content`. The first
    /// `fail_streams` stream opens error, the next `hang_streams` never
    /// yield an update, and `fail_refine` breaks refinement streams only.
    struct ScriptedClient {
        direct: Option<Value>,
        stream_content: Option<String>,
        fail_streams: u32,
        hang_streams: u32,
        fail_refine: bool,
        direct_calls: AtomicU32,
        stream_calls: AtomicU32,
    }

    impl ScriptedClient {
        fn new(direct: Option<Value>, stream_content: Option<String>) -> Self {
            Self {
                direct,
                stream_content,
                fail_streams: 0,
                hang_streams: 0,
                fail_refine: false,
                direct_calls: AtomicU32::new(0),
                stream_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn invoke_tool(&self, _request: &ToolCallRequest) -> crate::types::Result<ToolCallResponse> {
            self.direct_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolCallResponse {
                payload: self.direct.clone(),
                transcript: String::new(),
                usage: TokenUsage::default(),
            })
        }

        async fn open_stream(&self, request: &StreamRequest) -> crate::types::Result<UpdateStream> {
            let call = self.stream_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_refine && !request.tools.iter().any(|t| t == GENERATE_TOOL) {
                return Err(DocError::llm("refine session unavailable"));
            }
            if call < self.fail_streams {
                return Err(DocError::llm("connection reset"));
            }
            if call < self.fail_streams + self.hang_streams {
                return Ok(Box::pin(futures::stream::pending()));
            }
            let updates: Vec<crate::types::Result<StreamUpdate>> = match &self.stream_content {
                Some(content) => vec![
                    Ok(StreamUpdate::TextDelta("thinking".into())),
                    Ok(StreamUpdate::ToolInvocation {
                        name: GENERATE_TOOL.to_string(),
                        arguments: json!({"content": content}),
                    }),
                    Ok(StreamUpdate::Usage(TokenUsage {
                        input_tokens: 10,
                        output_tokens: 20,
                    })),
                    Ok(StreamUpdate::Done),
                ],
                None => vec![Ok(StreamUpdate::Done)],
            };
            Ok(Box::pin(futures::stream::iter(updates)))
        }

        async fn summarize(&self, _content: &str) -> crate::types::Result<String> {
            Ok("summary".to_string())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn generator_with(client: Arc<ScriptedClient>) -> DocumentGenerator {
        let quality = QualityConfig {
            min_length: 100,
            ..QualityConfig::default()
        };
        DocumentGenerator::new(client, GenerationConfig::default(), quality)
    }

    fn generator(client: ScriptedClient) -> DocumentGenerator {
        generator_with(Arc::new(client))
    }

    #[tokio::test]
    async fn test_direct_success_skips_fallback() {
        let client = ScriptedClient::new(
            Some(json!({"content": passing_content(), "summary": "good doc"})),
            None,
        );
        let generator = generator(client);
        let artifact = generator.generate(&item()).await.unwrap();
        assert_eq!(artifact.summary, "good doc");
        assert!(artifact.metadata.contains_key("quality_score"));
    }

    #[tokio::test]
    async fn test_quality_rejection_falls_back_and_accepts() {
        // Direct content is too short; the stream hands back the same short
        // content, which the fallback path accepts anyway.
        let client = ScriptedClient::new(
            Some(json!({"content": "short"})),
            Some("# Short doc\n\nstill short".to_string()),
        );
        let generator = generator(client);
        let artifact = generator.generate(&item()).await.unwrap();
        assert!(artifact.content.contains("Short doc"));
        assert_eq!(artifact.summary, "summary");
    }

    #[tokio::test]
    async fn test_empty_payload_falls_back() {
        let client = Arc::new(ScriptedClient::new(None, Some(passing_content())));
        let generator = generator_with(Arc::clone(&client));
        let artifact = generator.generate(&item()).await.unwrap();
        assert_eq!(client.direct_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.stream_calls.load(Ordering::SeqCst), 1);
        assert!(!artifact.content.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_transport_error_retried() {
        // First open errors at the transport level; the inner machine backs
        // off and the second attempt succeeds within the same generate call.
        let mut client = ScriptedClient::new(None, Some(passing_content()));
        client.fail_streams = 1;
        let client = Arc::new(client);
        let generator = generator_with(Arc::clone(&client));
        let artifact = generator.generate(&item()).await.unwrap();
        assert_eq!(client.stream_calls.load(Ordering::SeqCst), 2);
        assert!(!artifact.content.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_timeout_retried() {
        // First stream never yields; the per-attempt timeout cancels it and
        // the retry drains the scripted stream.
        let mut client = ScriptedClient::new(None, Some(passing_content()));
        client.hang_streams = 1;
        let client = Arc::new(client);
        let generator = generator_with(Arc::clone(&client));
        let artifact = generator.generate(&item()).await.unwrap();
        assert_eq!(client.stream_calls.load(Ordering::SeqCst), 2);
        assert!(!artifact.content.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_retries_exhaust_to_timeout_error() {
        let mut client = ScriptedClient::new(None, None);
        client.fail_streams = GenerationConfig::default().max_stream_attempts;
        let client = Arc::new(client);
        let generator = generator_with(Arc::clone(&client));
        let err = generator.generate(&item()).await.unwrap_err();
        assert!(matches!(err, DocError::Timeout { .. }));
        assert_eq!(
            client.stream_calls.load(Ordering::SeqCst),
            GenerationConfig::default().max_stream_attempts
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refine_keeps_fallback_content() {
        let mut client = ScriptedClient::new(None, Some(passing_content()));
        client.fail_refine = true;
        let client = Arc::new(client);
        let quality = QualityConfig {
            min_length: 100,
            ..QualityConfig::default()
        };
        let config = GenerationConfig {
            refine: true,
            ..GenerationConfig::default()
        };
        let generator = DocumentGenerator::new(Arc::clone(&client) as Arc<dyn CompletionClient>, config, quality);
        let artifact = generator.generate(&item()).await.unwrap();
        // One generation stream plus the failed refine session.
        assert_eq!(client.stream_calls.load(Ordering::SeqCst), 2);
        assert_eq!(artifact.content, passing_content());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_stream_errors() {
        let client = ScriptedClient::new(None, None);
        let generator = generator(client);
        let err = generator.generate(&item()).await.unwrap_err();
        assert!(matches!(err, DocError::EmptyPayload { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_retry_exhaustion_is_terminal() {
        let client = ScriptedClient::new(None, None);
        let generator = generator(client);
        let err = generator.generate_with_retry(&item()).await.unwrap_err();
        assert!(matches!(err, DocError::Terminal { attempts: 5, .. }));
    }
}
