//! Global Constants
//!
//! Centralized constants for tuning the generation pipeline.
//! All magic numbers should be defined here with documentation.

/// Task orchestrator constants
pub mod orchestrator {
    /// Default number of documents generated concurrently
    pub const DEFAULT_CONCURRENCY: usize = 3;

    /// Stagger between task admissions to avoid burst rate limiting (milliseconds)
    pub const ADMISSION_STAGGER_MS: u64 = 1_000;
}

/// Per-document generation constants
pub mod generation {
    /// Maximum outer retries for a single document
    pub const MAX_OUTER_RETRIES: u32 = 5;

    /// Outer backoff per retry for unclassified failures (milliseconds)
    pub const OUTER_RETRY_DELAY_MS: u64 = 10_000;

    /// Outer backoff per retry after a quality-gate rejection (milliseconds)
    pub const QUALITY_RETRY_DELAY_MS: u64 = 5_000;

    /// Timeout for one fallback streaming attempt (seconds)
    pub const STREAM_TIMEOUT_SECS: u64 = 30 * 60;

    /// Maximum inner attempts while consuming the fallback stream
    pub const MAX_STREAM_ATTEMPTS: u32 = 3;

    /// Fixed delay before retrying a timed-out stream attempt (milliseconds)
    pub const STREAM_TIMEOUT_DELAY_MS: u64 = 1_000;

    /// Per-attempt delay multiplier for transport errors (milliseconds)
    pub const STREAM_TRANSPORT_DELAY_MS: u64 = 3_000;

    /// Flat delay for unclassified stream errors (milliseconds)
    pub const STREAM_UNKNOWN_DELAY_MS: u64 = 5_000;

    /// Characters of content handed to the summarization call
    pub const SUMMARY_INPUT_CHARS: usize = 4_000;
}

/// Catalogue synthesis constants
pub mod synthesis {
    /// Maximum top-level synthesis attempts
    pub const MAX_ATTEMPTS: u32 = 8;

    /// Attempts during which every failure class is retried
    pub const ALWAYS_RETRY_ATTEMPTS: u32 = 3;

    /// Per-class retry ceilings
    pub const MAX_JSON_ATTEMPTS: u32 = 6;
    pub const MAX_MODEL_ATTEMPTS: u32 = 4;

    /// Consecutive failures after which rate-limited synthesis aborts
    pub const RATE_LIMIT_ABORT_STREAK: u32 = 5;

    /// Maximum inner sub-attempts per round-trip
    pub const MAX_SUB_ATTEMPTS: u32 = 3;

    /// Timeout for one synthesis round-trip (seconds)
    pub const ROUND_TRIP_TIMEOUT_SECS: u64 = 20 * 60;

    /// Base delay between inner sub-attempts (milliseconds)
    pub const SUB_ATTEMPT_DELAY_MS: u64 = 2_000;

    /// Cap on the inner sub-attempt delay (milliseconds)
    pub const SUB_ATTEMPT_DELAY_CAP_MS: u64 = 10_000;

    /// Exponential backoff base (milliseconds)
    pub const BACKOFF_BASE_MS: u64 = 1_000;

    /// Backoff ceiling (milliseconds)
    pub const BACKOFF_CAP_MS: u64 = 30_000;

    /// Additional delay per consecutive failure (milliseconds)
    pub const CONSECUTIVE_FAILURE_DELAY_MS: u64 = 1_000;

    /// Jitter fraction of the exponential term
    pub const JITTER_FRACTION: f64 = 0.3;

    /// Consecutive failures that trigger the flat reset pause
    pub const RESET_PAUSE_STREAK: u32 = 3;

    /// Flat reset pause duration (milliseconds)
    pub const RESET_PAUSE_MS: u64 = 2_000;

    /// Refinement only runs on early attempts (zero-based bound)
    pub const REFINE_ATTEMPT_LIMIT: u32 = 2;
}

/// Content quality gate constants
pub mod quality {
    /// Penalty when content length is below the configured minimum
    pub const LENGTH_SHORTFALL_PENALTY: f64 = 30.0;

    /// Additional penalty applied at the length boundary (either side)
    pub const LENGTH_BORDERLINE_PENALTY: f64 = 10.0;

    /// Penalty for too few headings
    pub const HEADING_PENALTY: f64 = 10.0;

    /// Penalty for too few diagrams
    pub const DIAGRAM_PENALTY: f64 = 10.0;

    /// Penalty for too few code blocks
    pub const CODE_BLOCK_PENALTY: f64 = 5.0;

    /// Penalty for missing links
    pub const LINK_PENALTY: f64 = 5.0;

    /// Penalty for a low native-script ratio
    pub const SCRIPT_RATIO_PENALTY: f64 = 10.0;

    /// Penalty applied once per accumulated issue
    pub const PER_ISSUE_PENALTY: f64 = 5.0;

    /// Minimum heading count before an issue is raised
    pub const MIN_HEADINGS: usize = 5;

    /// Minimum diagram count before an issue is raised
    pub const MIN_DIAGRAMS: usize = 3;
}

/// Repository scanning constants
pub mod scanner {
    /// Fixed chunk size for file content chunking (800 KiB)
    pub const CHUNK_SIZE: u64 = 800 * 1024;
}
