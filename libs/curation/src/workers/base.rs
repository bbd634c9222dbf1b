//! Base worker trait

use super::enrichment::EnrichmentJob;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Worker: Send + Sync {
    /// Worker name for logging
    fn name(&self) -> &str;

    /// Process a single job
    async fn process_job(&self, job: EnrichmentJob) -> Result<()>;
}
