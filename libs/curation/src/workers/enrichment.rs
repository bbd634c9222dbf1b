//! AI enrichment of staging rows

use super::{base::Worker, runner::run_worker};
use crate::{
    config::WorkerConfig,
    db::StagingStore,
    metrics::{ENRICHMENT_QUEUE_DEPTH, EXTERNAL_CALLS_TOTAL},
    models::{AiAssessment, InferenceStatus, InferenceUpdate, StagingRow},
    services::{external::AiVerifier, ingestion::title_case, TermPayload},
    Error, Result,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentJob {
    pub row_id: i64,
    pub icd_name: String,
    pub payload: TermPayload,
}

impl From<&StagingRow> for EnrichmentJob {
    fn from(row: &StagingRow) -> Self {
        let icd_name = row
            .suggested_icd_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| title_case(&row.source_term));

        Self {
            row_id: row.id,
            icd_name,
            payload: TermPayload {
                system: row.system,
                term: row.source_term.clone(),
                code: row.source_code.clone(),
                short_definition: row.short_definition.clone(),
                long_definition: row.long_definition.clone(),
            },
        }
    }
}

/// Runs the verifier for one row and writes the result back
pub struct EnrichmentWorker {
    name: String,
    store: Arc<dyn StagingStore>,
    verifier: Arc<dyn AiVerifier>,
}

impl EnrichmentWorker {
    pub fn new(name: String, store: Arc<dyn StagingStore>, verifier: Arc<dyn AiVerifier>) -> Self {
        Self {
            name,
            store,
            verifier,
        }
    }
}

#[async_trait]
impl Worker for EnrichmentWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_job(&self, job: EnrichmentJob) -> Result<()> {
        let update = match self.verifier.verify(&job.icd_name, &job.payload).await {
            Ok(assessment) => {
                EXTERNAL_CALLS_TOTAL.with_label_values(&["ai", "ok"]).inc();
                InferenceUpdate {
                    status: InferenceStatus::Done,
                    assessment: Some(assessment),
                }
            }
            Err(e) => {
                EXTERNAL_CALLS_TOTAL.with_label_values(&["ai", "error"]).inc();
                tracing::warn!(row_id = job.row_id, error = %e, "Inference failed, storing placeholder");
                InferenceUpdate {
                    status: InferenceStatus::Error,
                    assessment: Some(AiAssessment::unavailable()),
                }
            }
        };

        self.store.record_inference(job.row_id, &update).await
    }
}

/// Bounded queue feeding a fixed number of enrichment workers
///
/// Jobs are fire-and-forget; re-submitting a row overwrites its previous result.
pub struct EnrichmentPool {
    sender: mpsc::Sender<EnrichmentJob>,
    store: Arc<dyn StagingStore>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    grace: Duration,
}

impl EnrichmentPool {
    /// Spawn the workers on the current tokio runtime
    pub fn start(
        store: Arc<dyn StagingStore>,
        verifier: Arc<dyn AiVerifier>,
        config: &WorkerConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let queue = Arc::new(Mutex::new(receiver));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let handles = (0..config.enrichment_workers.max(1))
            .map(|index| {
                let worker: Arc<dyn Worker> = Arc::new(EnrichmentWorker::new(
                    format!("enrichment-worker-{index}"),
                    store.clone(),
                    verifier.clone(),
                ));
                tokio::spawn(run_worker(worker, queue.clone(), shutdown_rx.clone()))
            })
            .collect::<Vec<_>>();

        tracing::info!(
            workers = handles.len(),
            capacity = config.queue_capacity.max(1),
            "Enrichment pool started"
        );

        Self {
            sender,
            store,
            shutdown,
            handles,
            grace: Duration::from_secs(config.shutdown_grace_seconds),
        }
    }

    /// Mark a row queued and hand it to the workers
    ///
    /// Waits for queue space when the queue is full.
    pub async fn submit(&self, row: &StagingRow) -> Result<()> {
        self.store
            .record_inference(row.id, &InferenceUpdate::queued())
            .await?;

        ENRICHMENT_QUEUE_DEPTH.inc();
        if self.sender.send(EnrichmentJob::from(row)).await.is_err() {
            ENRICHMENT_QUEUE_DEPTH.dec();
            return Err(Error::Internal("enrichment pool is shut down".to_string()));
        }

        tracing::debug!(row_id = row.id, "Row queued for enrichment");
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Stop accepting jobs, drain the queue and wait for the workers
    ///
    /// Workers still busy after the grace period are told to stop.
    pub async fn shutdown(self) {
        let Self {
            sender,
            shutdown,
            handles,
            grace,
            ..
        } = self;
        drop(sender);

        let drained = tokio::time::timeout(grace, futures::future::join_all(handles)).await;
        match drained {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Enrichment worker panicked");
                    }
                }
                tracing::info!("Enrichment pool stopped");
            }
            Err(_) => {
                let _ = shutdown.send(true);
                tracing::warn!(
                    grace_seconds = grace.as_secs(),
                    "Enrichment pool did not drain in time, remaining jobs dropped"
                );
            }
        }
    }
}
