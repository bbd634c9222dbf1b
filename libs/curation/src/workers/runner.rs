//! Worker loop over the shared job queue

use super::{base::Worker, enrichment::EnrichmentJob};
use crate::metrics::ENRICHMENT_QUEUE_DEPTH;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

/// Pull jobs until the queue is closed and drained, or shutdown is signalled
pub async fn run_worker(
    worker: Arc<dyn Worker>,
    queue: Arc<Mutex<mpsc::Receiver<EnrichmentJob>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("{} started", worker.name());

    loop {
        if *shutdown.borrow() {
            tracing::info!("{} shutdown requested, stopping...", worker.name());
            return;
        }

        let next = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("{} shutdown requested, stopping...", worker.name());
                    return;
                }
                continue;
            }
            job = async { queue.lock().await.recv().await } => job,
        };

        let Some(job) = next else {
            tracing::debug!("{} queue closed, stopping", worker.name());
            return;
        };

        ENRICHMENT_QUEUE_DEPTH.dec();
        let row_id = job.row_id;
        match worker.process_job(job).await {
            Ok(()) => tracing::debug!(row_id, "{} processed job", worker.name()),
            Err(e) => tracing::error!(row_id, error = %e, "{} failed to process job", worker.name()),
        }
    }
}
