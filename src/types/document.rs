//! Document Types
//!
//! [`GeneratedArtifact`] is the accepted output for one pending item;
//! [`GenerationAttempt`] is the ephemeral per-retry value used to decide
//! direct-vs-fallback branching. Attempts are never persisted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::quality::QualityMetrics;

/// The accepted generated document plus its metadata.
///
/// Created once per pending item on the first passing (or exhausted-retry)
/// attempt; owned by the persistence layer thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub id: Uuid,
    /// Pending item this artifact was generated for
    pub item_id: Uuid,
    pub title: String,
    /// Markdown content with embedded diagrams
    pub content: String,
    pub summary: String,
    /// Per-metric metadata recorded for observability
    pub metadata: BTreeMap<String, String>,
    /// Repository files consulted while generating
    pub source_files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl GeneratedArtifact {
    pub fn new(item_id: Uuid, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id,
            title: title.into(),
            content: content.into(),
            summary: String::new(),
            metadata: BTreeMap::new(),
            source_files: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Record quality metrics into the metadata map
    pub fn record_metrics(&mut self, metrics: &QualityMetrics) {
        self.metadata
            .insert("content_length".into(), metrics.content_length.to_string());
        self.metadata
            .insert("heading_count".into(), metrics.heading_count.to_string());
        self.metadata
            .insert("diagram_count".into(), metrics.diagram_count.to_string());
        self.metadata.insert(
            "code_block_count".into(),
            metrics.code_block_count.to_string(),
        );
        self.metadata
            .insert("link_count".into(), metrics.link_count.to_string());
        self.metadata.insert(
            "native_script_ratio".into(),
            format!("{:.3}", metrics.native_script_ratio),
        );
        self.metadata.insert(
            "quality_score".into(),
            format!("{:.1}", metrics.quality_score),
        );
    }
}

/// Outcome of one generation attempt, used only for branching decisions
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub success: bool,
    pub artifact: Option<GeneratedArtifact>,
    pub metrics: Option<QualityMetrics>,
    pub failure_reason: Option<String>,
}

impl GenerationAttempt {
    pub fn succeeded(artifact: GeneratedArtifact, metrics: Option<QualityMetrics>) -> Self {
        Self {
            success: true,
            artifact: Some(artifact),
            metrics,
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>, metrics: Option<QualityMetrics>) -> Self {
        Self {
            success: false,
            artifact: None,
            metrics,
            failure_reason: Some(reason.into()),
        }
    }
}
