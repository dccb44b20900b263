//! Catalogue Synthesis
//!
//! Produces the hierarchical documentation plan ([`CatalogueOutline`]) from a
//! repository context string. The completion service is asked to hand the
//! outline back through a forced tool call; the raw transcript is kept as a
//! fallback JSON source when the payload is missing or malformed.
//!
//! The retry loop is the most failure-tolerant in the crate: up to 8
//! top-level attempts, routed per [`FailureClass`], with exponential backoff,
//! jitter, and a flat reset pause after sustained failure streaks. Exhaustion
//! yields `None`; the caller must treat that as a fatal planning failure.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::synthesis as s;
use crate::llm::{SharedClient, ToolCallRequest, ToolCallResponse, with_timeout};
use crate::types::{CatalogueOutline, DocError, FailureClass, Result};

/// Tool the model must invoke to hand back the outline
pub const CATALOGUE_TOOL: &str = "produce_catalogue";

const SYSTEM_PROMPT: &str = "You are a documentation architect. Study the \
repository context and produce a hierarchical documentation catalogue by \
invoking the produce_catalogue tool exactly once. Every node needs a slug \
name, a human title, and an authoring prompt for the section writer.";

const REFINE_PROMPT: &str = "Review the catalogue below and improve it: merge \
near-duplicate sections, fix ordering, and sharpen authoring prompts. Return \
the full revised catalogue through the produce_catalogue tool.";

/// Tuning for catalogue synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Whether early attempts run a refinement pass over a valid outline
    pub refine: bool,
    pub max_attempts: u32,
    pub round_trip_timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            refine: false,
            max_attempts: s::MAX_ATTEMPTS,
            round_trip_timeout_secs: s::ROUND_TRIP_TIMEOUT_SECS,
        }
    }
}

/// Synthesizes the documentation catalogue from repository context
pub struct CatalogueSynthesizer {
    client: SharedClient,
    config: SynthesisConfig,
}

impl CatalogueSynthesizer {
    pub fn new(client: SharedClient, config: SynthesisConfig) -> Self {
        Self { client, config }
    }

    /// Run the top-level synthesis loop.
    ///
    /// Returns `None` after exhausting every retry; a `None` is a hard
    /// failure of the planning phase and must not be skipped over.
    pub async fn synthesize(&self, context: &str) -> Option<CatalogueOutline> {
        let mut consecutive_failures: u32 = 0;

        for attempt in 0..self.config.max_attempts {
            match self.attempt(context, attempt).await {
                Ok(outline) => {
                    info!(
                        attempt = attempt + 1,
                        sections = outline.items.len(),
                        "catalogue synthesized"
                    );
                    return Some(outline);
                }
                Err(err) => {
                    consecutive_failures += 1;
                    let class = err.class();
                    warn!(
                        attempt = attempt + 1,
                        %class,
                        consecutive_failures,
                        "synthesis attempt failed: {err}"
                    );

                    if !retry_allowed(class, attempt, consecutive_failures, self.config.max_attempts)
                    {
                        warn!(%class, "synthesis retry budget exhausted for this failure class");
                        return None;
                    }

                    if consecutive_failures == s::RESET_PAUSE_STREAK {
                        debug!("inserting reset pause after sustained failures");
                        tokio::time::sleep(Duration::from_millis(s::RESET_PAUSE_MS)).await;
                    }
                    tokio::time::sleep(backoff_delay(attempt, consecutive_failures)).await;
                }
            }
        }

        warn!(
            attempts = self.config.max_attempts,
            "catalogue synthesis exhausted all attempts"
        );
        None
    }

    /// One top-level attempt: round-trip, parse, validate, maybe refine.
    async fn attempt(&self, context: &str, attempt: u32) -> Result<CatalogueOutline> {
        let request = ToolCallRequest::new(CATALOGUE_TOOL, context).with_system(SYSTEM_PROMPT);
        let response = self.round_trip(&request).await?;
        let outline = self.parse_response(&response)?;
        outline.validate()?;

        if self.config.refine && attempt < s::REFINE_ATTEMPT_LIMIT {
            return Ok(self.refine(&outline).await);
        }
        Ok(outline)
    }

    /// Inner round-trip retry (max 3 sub-attempts, exponential delay from
    /// 2 s capped at 10 s). Only timeout expiry is retried here; every other
    /// failure surfaces immediately so the class-routed top-level policy and
    /// its backoff govern it.
    async fn round_trip(&self, request: &ToolCallRequest) -> Result<ToolCallResponse> {
        let timeout = Duration::from_secs(self.config.round_trip_timeout_secs);
        let mut last_err = None;

        for sub in 0..s::MAX_SUB_ATTEMPTS {
            match with_timeout(timeout, self.client.invoke_tool(request), "catalogue call").await {
                Ok(response) => return Ok(response),
                Err(err @ DocError::Timeout { .. }) => {
                    warn!(sub_attempt = sub + 1, "catalogue round-trip timed out: {err}");
                    last_err = Some(err);
                    if sub + 1 < s::MAX_SUB_ATTEMPTS {
                        let delay = (s::SUB_ATTEMPT_DELAY_MS << sub).min(s::SUB_ATTEMPT_DELAY_CAP_MS);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| DocError::llm("catalogue round-trip produced no result")))
    }

    /// Parse from the tool payload, falling back to a JSON fragment lifted
    /// out of the raw transcript when the payload is absent or malformed.
    fn parse_response(&self, response: &ToolCallResponse) -> Result<CatalogueOutline> {
        if let Some(payload) = &response.payload {
            match serde_json::from_value::<CatalogueOutline>(payload.clone()) {
                Ok(outline) => return Ok(outline),
                Err(err) => {
                    warn!("tool payload did not parse as an outline: {err}");
                }
            }
        } else {
            debug!("no tool payload; trying transcript fallback");
        }

        let fragment = extract_json_fragment(&response.transcript).ok_or_else(|| {
            DocError::EmptyPayload {
                call: CATALOGUE_TOOL.to_string(),
            }
        })?;
        let outline: CatalogueOutline = serde_json::from_str(&fragment)?;
        Ok(outline)
    }

    /// One edit-oriented refinement pass. Any failure, including a refined
    /// outline that no longer validates, keeps the original.
    async fn refine(&self, original: &CatalogueOutline) -> CatalogueOutline {
        let serialized = match serde_json::to_string_pretty(original) {
            Ok(s) => s,
            Err(err) => {
                warn!("could not serialize outline for refinement: {err}");
                return original.clone();
            }
        };
        let request = ToolCallRequest::new(
            CATALOGUE_TOOL,
            format!("{REFINE_PROMPT}\n\n{serialized}"),
        )
        .with_system(SYSTEM_PROMPT);

        match self.round_trip(&request).await {
            Ok(response) => match self.parse_response(&response) {
                Ok(refined) if refined.validate().is_ok() => {
                    debug!("refinement pass accepted");
                    refined
                }
                Ok(_) => {
                    warn!("refinement corrupted the outline, keeping original");
                    original.clone()
                }
                Err(err) => {
                    warn!("refinement response unusable, keeping original: {err}");
                    original.clone()
                }
            },
            Err(err) => {
                warn!("refinement round-trip failed, keeping original: {err}");
                original.clone()
            }
        }
    }
}

/// Whether a failure of `class` on zero-based `attempt` warrants another try.
///
/// Every class retries through the first three attempts. Beyond that, network
/// and unknown failures use the full budget, rate limiting aborts after a
/// streak of five consecutive failures, parse failures stop at six total
/// attempts, and model failures at four. Other classes stop immediately.
fn retry_allowed(class: FailureClass, attempt: u32, consecutive: u32, max_attempts: u32) -> bool {
    let next = attempt + 1;
    if next >= max_attempts {
        return false;
    }
    if next <= s::ALWAYS_RETRY_ATTEMPTS {
        return true;
    }
    match class {
        FailureClass::Network | FailureClass::Unknown => true,
        FailureClass::RateLimit => consecutive < s::RATE_LIMIT_ABORT_STREAK,
        FailureClass::JsonParse => next < s::MAX_JSON_ATTEMPTS,
        FailureClass::Model => next < s::MAX_MODEL_ATTEMPTS,
        _ => false,
    }
}

/// `min(cap, base×2^retry + consecutive×1000 + jitter)` where jitter is drawn
/// uniformly up to 30% of the exponential term.
fn backoff_delay(retry: u32, consecutive: u32) -> Duration {
    let exponential = s::BACKOFF_BASE_MS.saturating_mul(1u64 << retry.min(15));
    let max_jitter = (exponential as f64 * s::JITTER_FRACTION) as u64;
    let jitter = if max_jitter == 0 {
        0
    } else {
        rand::rng().random_range(0..max_jitter)
    };
    let streak = u64::from(consecutive).saturating_mul(s::CONSECUTIVE_FAILURE_DELAY_MS);
    let total = exponential.saturating_add(streak).saturating_add(jitter);
    Duration::from_millis(total.min(s::BACKOFF_CAP_MS))
}

/// Strip code-fence lines from the transcript and lift the substring between
/// the first `{` and the last `}`.
fn extract_json_fragment(transcript: &str) -> Option<String> {
    let stripped: String = transcript
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");
    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(stripped[start..=end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionClient, StreamRequest, TokenUsage, UpdateStream};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn valid_payload() -> serde_json::Value {
        json!({
            "items": [
                {"name": "overview", "title": "Overview", "prompt": "introduce the project"},
                {"name": "internals", "title": "Internals", "prompt": "explain the core", "children": [
                    {"name": "storage", "title": "Storage", "prompt": "describe persistence"}
                ]}
            ]
        })
    }

    /// Queued responses, popped per invoke_tool call. The first `hang_calls`
    /// calls stall until the caller's timeout cancels them.
    struct ScriptedClient {
        responses: Mutex<Vec<Result<ToolCallResponse>>>,
        calls: AtomicU32,
        hang_calls: u32,
    }

    impl ScriptedClient {
        fn new(mut responses: Vec<Result<ToolCallResponse>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: AtomicU32::new(0),
                hang_calls: 0,
            }
        }

        fn hang_first(mut self, n: u32) -> Self {
            self.hang_calls = n;
            self
        }

        fn response(payload: Option<serde_json::Value>, transcript: &str) -> ToolCallResponse {
            ToolCallResponse {
                payload,
                transcript: transcript.to_string(),
                usage: TokenUsage::default(),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn invoke_tool(&self, _request: &ToolCallRequest) -> Result<ToolCallResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.hang_calls {
                // Cancelled by the caller's timeout; the queue stays intact.
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(DocError::llm("script exhausted")))
        }

        async fn open_stream(&self, _request: &StreamRequest) -> Result<UpdateStream> {
            Err(DocError::llm("not scripted"))
        }

        async fn summarize(&self, _content: &str) -> Result<String> {
            Ok(String::new())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn synthesizer(client: ScriptedClient) -> CatalogueSynthesizer {
        CatalogueSynthesizer::new(std::sync::Arc::new(client), SynthesisConfig::default())
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let client = ScriptedClient::new(vec![Ok(ScriptedClient::response(
            Some(valid_payload()),
            "",
        ))]);
        let outline = synthesizer(client).synthesize("repo context").await;
        let outline = outline.expect("outline");
        assert_eq!(outline.items.len(), 2);
        assert_eq!(outline.items[0].name, "overview");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transcript_fallback_when_payload_missing() {
        let transcript = format!("Here is the catalogue:\n```json\n{}\n```", valid_payload());
        let client = ScriptedClient::new(vec![Ok(ScriptedClient::response(None, &transcript))]);
        let outline = synthesizer(client).synthesize("ctx").await;
        assert!(outline.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_after_transient_failure() {
        let client = ScriptedClient::new(vec![
            Err(DocError::llm("connection reset")),
            Ok(ScriptedClient::response(Some(valid_payload()), "")),
        ]);
        let outline = synthesizer(client).synthesize("ctx").await;
        assert!(outline.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_none() {
        let failures: Vec<Result<ToolCallResponse>> = (0..s::MAX_ATTEMPTS)
            .map(|_| Err(DocError::llm("connection reset")))
            .collect();
        let client = ScriptedClient::new(failures);
        let outline = synthesizer(client).synthesize("ctx").await;
        assert!(outline.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_surfaces_without_inner_retry() {
        // One call per top-level attempt: rate limiting must not be retried
        // inside the round-trip, and the consecutive-failure streak aborts
        // the top loop after five attempts.
        let failures: Vec<Result<ToolCallResponse>> = (0..s::MAX_ATTEMPTS)
            .map(|_| Err(DocError::llm("HTTP 429: rate limit exceeded")))
            .collect();
        let client = std::sync::Arc::new(ScriptedClient::new(failures));
        let synthesizer =
            CatalogueSynthesizer::new(std::sync::Arc::clone(&client) as std::sync::Arc<dyn CompletionClient>, SynthesisConfig::default());
        let outline = synthesizer.synthesize("ctx").await;
        assert!(outline.is_none());
        assert_eq!(
            client.calls.load(Ordering::SeqCst),
            s::RATE_LIMIT_ABORT_STREAK
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_retries_timeout_only() {
        // A stalled call is cancelled by the round-trip timeout and retried
        // within the same top-level attempt.
        let client = std::sync::Arc::new(
            ScriptedClient::new(vec![Ok(ScriptedClient::response(Some(valid_payload()), ""))])
                .hang_first(1),
        );
        let synthesizer =
            CatalogueSynthesizer::new(std::sync::Arc::clone(&client) as std::sync::Arc<dyn CompletionClient>, SynthesisConfig::default());
        let outline = synthesizer.synthesize("ctx").await;
        assert!(outline.is_some());
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refinement_corruption_keeps_original() {
        let corrupted = json!({"items": [{"name": "", "title": "", "prompt": ""}]});
        let client = ScriptedClient::new(vec![
            Ok(ScriptedClient::response(Some(valid_payload()), "")),
            Ok(ScriptedClient::response(Some(corrupted), "")),
        ]);
        let config = SynthesisConfig {
            refine: true,
            ..SynthesisConfig::default()
        };
        let synthesizer = CatalogueSynthesizer::new(std::sync::Arc::new(client), config);
        let outline = synthesizer.synthesize("ctx").await.expect("outline");
        assert_eq!(outline.items[0].name, "overview");
    }

    #[test]
    fn test_retry_policy_per_class() {
        // Everything retries through the first three attempts.
        assert!(retry_allowed(FailureClass::Model, 1, 2, s::MAX_ATTEMPTS));
        assert!(retry_allowed(FailureClass::JsonParse, 2, 3, s::MAX_ATTEMPTS));
        // Network keeps the full budget; class-specific ceilings bite later.
        assert!(retry_allowed(FailureClass::Network, 6, 7, s::MAX_ATTEMPTS));
        assert!(!retry_allowed(FailureClass::Network, 7, 8, s::MAX_ATTEMPTS));
        assert!(!retry_allowed(FailureClass::JsonParse, 5, 6, s::MAX_ATTEMPTS));
        assert!(!retry_allowed(FailureClass::Model, 3, 4, s::MAX_ATTEMPTS));
        // Rate limiting aborts on a five-deep consecutive streak.
        assert!(retry_allowed(FailureClass::RateLimit, 4, 4, s::MAX_ATTEMPTS));
        assert!(!retry_allowed(FailureClass::RateLimit, 4, 5, s::MAX_ATTEMPTS));
    }

    #[test]
    fn test_backoff_capped() {
        for retry in 0..10 {
            let delay = backoff_delay(retry, retry);
            assert!(delay <= Duration::from_millis(s::BACKOFF_CAP_MS));
        }
        // Early retries stay near the exponential term.
        let first = backoff_delay(0, 1);
        assert!(first >= Duration::from_millis(s::BACKOFF_BASE_MS));
    }

    #[test]
    fn test_fragment_extraction() {
        let transcript = "prose before\n```json\n{\"items\": []}\n```\nprose after";
        assert_eq!(
            extract_json_fragment(transcript).as_deref(),
            Some("{\"items\": []}")
        );
        assert!(extract_json_fragment("no braces here").is_none());
        assert!(extract_json_fragment("} backwards {").is_none());
    }
}
