//! Background workers
//!
//! Enrichment jobs are queued in memory and processed by a fixed pool of tokio
//! tasks. Results are written back to staging rows by id.

mod base;
mod enrichment;
mod runner;

pub use base::Worker;
pub use enrichment::{EnrichmentJob, EnrichmentPool, EnrichmentWorker};
pub use runner::run_worker;
