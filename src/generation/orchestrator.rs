//! Task Orchestrator
//!
//! Turns an unordered backlog of pending items into a stream of persisted
//! artifacts under a concurrency ceiling. Admission is staggered to avoid
//! burst-induced rate limiting; completions are drained in true
//! first-finished order via `FuturesUnordered`. A single item's failure is
//! logged and the batch continues - partial failure never aborts the run.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::constants::orchestrator as o;
use crate::storage::DocumentStore;
use crate::types::{GeneratedArtifact, PendingItem, Result};

use super::pipeline::DocumentGenerator;

/// Worker seam: one pending item in, one artifact (or terminal error) out.
///
/// `DocumentGenerator` is the production implementation; tests substitute
/// scripted workers.
#[async_trait]
pub trait SectionWorker: Send + Sync {
    async fn generate(&self, item: &PendingItem) -> Result<GeneratedArtifact>;
}

#[async_trait]
impl SectionWorker for DocumentGenerator {
    async fn generate(&self, item: &PendingItem) -> Result<GeneratedArtifact> {
        self.generate_with_retry(item).await
    }
}

/// Tuning for the batch orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Concurrency ceiling for in-flight generations
    pub concurrency: usize,
    /// Stagger between task admissions (milliseconds)
    pub admission_stagger_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: o::DEFAULT_CONCURRENCY,
            admission_stagger_ms: o::ADMISSION_STAGGER_MS,
        }
    }
}

/// Outcome of one batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: usize,
    /// Item id and reason for every item that failed terminally
    pub failed: Vec<(Uuid, String)>,
}

/// Bounded-concurrency scheduler for a batch of pending items
pub struct TaskOrchestrator<W: SectionWorker + 'static> {
    worker: Arc<W>,
    store: Arc<dyn DocumentStore>,
    config: OrchestratorConfig,
}

impl<W: SectionWorker + 'static> TaskOrchestrator<W> {
    pub fn new(worker: Arc<W>, store: Arc<dyn DocumentStore>, config: OrchestratorConfig) -> Self {
        Self {
            worker,
            store,
            config,
        }
    }

    /// Run every item to a terminal state. Blocks until the backlog and the
    /// in-flight set are both empty; completion order is unordered.
    pub async fn run(&self, items: Vec<PendingItem>) -> BatchReport {
        let total = items.len();
        let mut backlog: VecDeque<PendingItem> = items.into();
        let mut inflight = FuturesUnordered::new();
        let mut report = BatchReport::default();
        let stagger = Duration::from_millis(self.config.admission_stagger_ms);
        let mut admitted = 0usize;

        info!(
            total,
            concurrency = self.config.concurrency,
            "starting document batch"
        );

        loop {
            while inflight.len() < self.config.concurrency {
                let Some(item) = backlog.pop_front() else { break };
                if admitted > 0 && !stagger.is_zero() {
                    tokio::time::sleep(stagger).await;
                }
                admitted += 1;
                let worker = Arc::clone(&self.worker);
                inflight.push(async move {
                    let result = worker.generate(&item).await;
                    (item, result)
                });
            }

            let Some((item, result)) = inflight.next().await else {
                break;
            };

            match result {
                Ok(artifact) if !artifact.content.trim().is_empty() => {
                    match self.persist(&item, &artifact) {
                        Ok(()) => {
                            info!(item = %item.name, "document persisted");
                            report.completed += 1;
                        }
                        Err(err) => {
                            warn!(item = %item.name, "persist failed: {err}");
                            report.failed.push((item.id, err.to_string()));
                        }
                    }
                }
                Ok(_) => {
                    // Empty-result sentinel: treated as failure, batch continues.
                    warn!(item = %item.name, "generator returned empty content");
                    report
                        .failed
                        .push((item.id, "empty generation result".to_string()));
                }
                Err(err) => {
                    warn!(item = %item.name, "item failed terminally: {err}");
                    report.failed.push((item.id, err.to_string()));
                }
            }
        }

        info!(
            completed = report.completed,
            failed = report.failed.len(),
            "document batch finished"
        );
        report
    }

    fn persist(&self, item: &PendingItem, artifact: &GeneratedArtifact) -> Result<()> {
        self.store.insert_artifact(artifact)?;
        self.store
            .append_source_refs(artifact.id, &artifact.source_files)?;
        self.store.mark_completed(item.id)
    }
}
