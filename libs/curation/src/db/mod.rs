//! Database layer - storage traits and their backends

pub mod audit;
pub mod mappings;
pub mod memory;
pub mod registry;
pub mod releases;
pub mod staging;
pub mod store;
pub mod traits;

pub use memory::InMemoryCurationStore;
pub use store::PostgresCurationStore;
pub use traits::{
    AuditLog, CurationStore, MappingStore, PurgeCounts, ReleaseStore, StagingStore, TermRegistry,
};

use crate::{config::DatabaseConfig, Result};
use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use std::time::Duration;

/// Open a connection pool sized from configuration
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let statement_timeout_ms = config.statement_timeout_seconds.saturating_mul(1000);

    let pool = PgPoolOptions::new()
        .min_connections(config.pool_min_size)
        .max_connections(config.pool_max_size)
        .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET statement_timeout = {statement_timeout_ms}").as_str())
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await?;

    tracing::debug!(
        max_connections = config.pool_max_size,
        statement_timeout_ms,
        "Database pool ready"
    );

    Ok(pool)
}

/// Apply the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
