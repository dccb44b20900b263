//! Content Quality Evaluation
//!
//! Deterministic, side-effect-free quality gate over generated Markdown.
//! Computes structural metrics (headings, diagrams, code blocks, links,
//! native-script ratio), accumulates issues for each deficiency, and derives
//! a penalty-based score. The issue count is the primary pass/fail signal;
//! the score is reported and only contributes an extra issue when it falls
//! below the configured minimum.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::constants::quality as q;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s").expect("valid heading regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]\([^)]+\)").expect("valid link regex"));

/// Thresholds for the quality gate.
///
/// Constructed once at startup and passed by reference; never a hidden
/// static. The native-script range defaults to Hangul syllables and is
/// configurable for other documentation languages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum acceptable content length in characters
    pub min_length: usize,
    /// Lengths in `[min_length, min_length * borderline_factor)` are
    /// penalized as borderline without raising an issue
    pub borderline_factor: f64,
    /// Minimum ratio of native-script characters to total length
    pub min_native_ratio: f64,
    /// Inclusive Unicode scalar range counted as native script
    pub native_script_start: u32,
    pub native_script_end: u32,
    /// Minimum non-diagram code fence count (score-only deficiency)
    pub min_code_blocks: usize,
    /// Score below which an additional threshold issue is reported
    pub min_score: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_length: 1_000,
            borderline_factor: 1.2,
            min_native_ratio: 0.3,
            // Hangul syllable block
            native_script_start: 0xAC00,
            native_script_end: 0xD7A3,
            min_code_blocks: 1,
            min_score: 60.0,
        }
    }
}

/// Metrics derived from one content string. Never hand-set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub content_length: usize,
    pub heading_count: usize,
    pub diagram_count: usize,
    pub code_block_count: usize,
    pub link_count: usize,
    pub native_script_ratio: f64,
    /// Always in `[0, 100]`
    pub quality_score: f64,
}

/// Result of evaluating one content string
#[derive(Debug, Clone)]
pub struct QualityReport {
    pub passed: bool,
    pub metrics: QualityMetrics,
    pub issues: Vec<String>,
}

/// Deterministic content-quality evaluator.
///
/// Pure function of its input; callable concurrently without synchronization.
pub struct QualityEvaluator<'a> {
    config: &'a QualityConfig,
}

impl<'a> QualityEvaluator<'a> {
    pub fn new(config: &'a QualityConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, content: &str) -> QualityReport {
        if content.trim().is_empty() {
            return QualityReport {
                passed: false,
                metrics: QualityMetrics::default(),
                issues: vec!["content empty".to_string()],
            };
        }

        let cfg = self.config;
        let mut metrics = self.measure(content);
        let mut issues = Vec::new();
        let mut penalties = 0.0;

        // Length gate. Severe shortfall stacks the borderline penalty on
        // top of the shortfall penalty; lengths just above the minimum get
        // only the borderline penalty and no issue.
        if metrics.content_length < cfg.min_length {
            issues.push(format!(
                "content length {} below minimum {}",
                metrics.content_length, cfg.min_length
            ));
            penalties += q::LENGTH_SHORTFALL_PENALTY;
            if metrics.content_length < cfg.min_length / 2 {
                penalties += q::LENGTH_BORDERLINE_PENALTY;
            }
        } else if (metrics.content_length as f64) < cfg.min_length as f64 * cfg.borderline_factor {
            penalties += q::LENGTH_BORDERLINE_PENALTY;
        }

        if metrics.native_script_ratio < cfg.min_native_ratio {
            issues.push(format!(
                "native-script ratio {:.2} below minimum {:.2}",
                metrics.native_script_ratio, cfg.min_native_ratio
            ));
            penalties += q::SCRIPT_RATIO_PENALTY;
        }

        if metrics.heading_count < q::MIN_HEADINGS {
            issues.push(format!(
                "only {} headings (minimum {})",
                metrics.heading_count,
                q::MIN_HEADINGS
            ));
            penalties += q::HEADING_PENALTY;
        }

        if metrics.diagram_count < q::MIN_DIAGRAMS {
            issues.push(format!(
                "only {} diagrams (minimum {})",
                metrics.diagram_count,
                q::MIN_DIAGRAMS
            ));
            penalties += q::DIAGRAM_PENALTY;
        }

        if metrics.code_block_count < cfg.min_code_blocks {
            penalties += q::CODE_BLOCK_PENALTY;
        }

        if metrics.link_count == 0 {
            issues.push("no markdown links".to_string());
            penalties += q::LINK_PENALTY;
        }

        // Structural check over embedded diagram blocks: unbalanced
        // parentheses are an accepted-issue, penalized only per issue.
        for (idx, block) in diagram_blocks(content).iter().enumerate() {
            let open = block.matches('(').count();
            let close = block.matches(')').count();
            if open != close {
                issues.push(format!(
                    "diagram block {} has unbalanced parentheses ({open} open, {close} close)",
                    idx + 1
                ));
            }
        }

        penalties += issues.len() as f64 * q::PER_ISSUE_PENALTY;
        metrics.quality_score = (100.0 - penalties).max(0.0);

        if metrics.quality_score < cfg.min_score {
            issues.push(format!(
                "quality score {:.1} below threshold {:.1}",
                metrics.quality_score, cfg.min_score
            ));
        }

        QualityReport {
            passed: issues.is_empty(),
            metrics,
            issues,
        }
    }

    fn measure(&self, content: &str) -> QualityMetrics {
        let cfg = self.config;
        let total_chars = content.chars().count();
        let native_chars = content
            .chars()
            .filter(|c| {
                let v = *c as u32;
                v >= cfg.native_script_start && v <= cfg.native_script_end
            })
            .count();

        let (diagram_count, code_block_count) = count_fences(content);

        QualityMetrics {
            content_length: total_chars,
            heading_count: HEADING_RE.find_iter(content).count(),
            diagram_count,
            code_block_count,
            link_count: LINK_RE.find_iter(content).count(),
            native_script_ratio: if total_chars == 0 {
                0.0
            } else {
                native_chars as f64 / total_chars as f64
            },
            quality_score: 0.0,
        }
    }
}

/// Count (diagram fences, non-diagram code fences)
fn count_fences(content: &str) -> (usize, usize) {
    let mut diagrams = 0;
    let mut code_blocks = 0;
    let mut in_fence = false;
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            if in_fence {
                in_fence = false;
            } else {
                in_fence = true;
                let info = trimmed.trim_start_matches('`').trim();
                if info.eq_ignore_ascii_case("mermaid") {
                    diagrams += 1;
                } else {
                    code_blocks += 1;
                }
            }
        }
    }
    (diagrams, code_blocks)
}

/// Extract the body of every ```mermaid fenced block
pub(crate) fn diagram_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    for line in content.lines() {
        let trimmed = line.trim_start();
        match &mut current {
            Some(lines) => {
                if trimmed.starts_with("```") {
                    blocks.push(lines.join("\n"));
                    current = None;
                } else {
                    lines.push(line);
                }
            }
            None => {
                if trimmed.starts_with("```")
                    && trimmed
                        .trim_start_matches('`')
                        .trim()
                        .eq_ignore_ascii_case("mermaid")
                {
                    current = Some(Vec::new());
                }
            }
        }
    }
    blocks
}
