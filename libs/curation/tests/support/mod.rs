#![allow(dead_code)]

pub mod assertions;
pub mod builders;
pub mod fixtures;

use anyhow::Context as _;
use ayusync_curation::{
    db::{self, InMemoryCurationStore, PostgresCurationStore},
    services::{AiVerifier, WhoEnrichment},
    AppState, Config,
};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    Connection as _, PgPool,
};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Re-export commonly used items
pub use assertions::*;
pub use builders::*;
pub use fixtures::*;

pub const TEST_DATABASE_ENV: &str = "AYUSYNC_TEST_DATABASE_URL";

pub fn init_tracing() {
    use std::sync::OnceLock;
    use tracing_subscriber::prelude::*;
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "ayusync_curation=info,sqlx=warn".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// Services over an in-memory store with scripted collaborators
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryCurationStore>,
    pub verifier: Arc<FakeVerifier>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_verifier(FakeVerifier::new(72))
    }

    pub fn with_verifier(verifier: FakeVerifier) -> Self {
        init_tracing();
        let store = Arc::new(InMemoryCurationStore::new());
        let verifier = Arc::new(verifier);
        let state = AppState::with_collaborators(
            Config::default(),
            store.clone(),
            verifier.clone() as Arc<dyn AiVerifier>,
            Arc::new(FakeWho::default()) as Arc<dyn WhoEnrichment>,
        );
        Self {
            state,
            store,
            verifier,
        }
    }
}

/// Services over a private PostgreSQL schema, dropped by `cleanup`
pub struct PgTestApp {
    pub state: AppState,
    pool: PgPool,
    schema: String,
    admin_database_url: String,
}

static SCHEMA_COUNTER: AtomicUsize = AtomicUsize::new(0);

impl PgTestApp {
    /// `None` when no test database is configured
    pub async fn try_new() -> anyhow::Result<Option<Self>> {
        let Ok(admin_database_url) = std::env::var(TEST_DATABASE_ENV) else {
            eprintln!("{TEST_DATABASE_ENV} not set, skipping PostgreSQL test");
            return Ok(None);
        };
        init_tracing();

        let schema = format!(
            "test_{}_{}",
            std::process::id(),
            SCHEMA_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let mut admin_conn = sqlx::PgConnection::connect(&admin_database_url)
            .await
            .context("connect admin db for schema create")?;
        sqlx::query(&format!(r#"CREATE SCHEMA "{}""#, schema))
            .execute(&mut admin_conn)
            .await
            .context("create test schema")?;

        let options = PgConnectOptions::from_str(&admin_database_url)
            .context("parse test database URL")?
            .options([("search_path", schema.as_str())]);
        // Keep per-test pools small; tests run in parallel, each with its own schema.
        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(2)
            .connect_with(options)
            .await
            .context("connect test pool")?;
        db::run_migrations(&pool).await.context("run migrations")?;

        let state = AppState::with_collaborators(
            Config::default(),
            Arc::new(PostgresCurationStore::new(pool.clone())),
            Arc::new(FakeVerifier::new(72)) as Arc<dyn AiVerifier>,
            Arc::new(FakeWho::default()) as Arc<dyn WhoEnrichment>,
        );

        Ok(Some(Self {
            state,
            pool,
            schema,
            admin_database_url,
        }))
    }

    pub async fn cleanup(self) -> anyhow::Result<()> {
        self.pool.close().await;

        let mut admin_conn = sqlx::PgConnection::connect(&self.admin_database_url)
            .await
            .context("connect admin db for schema drop")?;
        sqlx::query(&format!(r#"DROP SCHEMA "{}" CASCADE"#, self.schema))
            .execute(&mut admin_conn)
            .await
            .context("drop test schema")?;

        Ok(())
    }
}
