//! Wiring of storage, collaborators and services

use crate::{
    config::Config,
    db::{self, CurationStore, InMemoryCurationStore, PostgresCurationStore, StagingStore},
    services::{
        external::{ai_verifier_from_config, who_client_from_config},
        AiVerifier, AuditService, IngestionService, LifecycleService, RegistryService,
        ReleaseService, ReviewService, TranslationService, WhoEnrichment,
    },
    workers::EnrichmentPool,
    Result,
};
use std::sync::Arc;

/// Services sharing one store, built once at process start
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn CurationStore>,
    staging: Arc<dyn StagingStore>,
    verifier: Arc<dyn AiVerifier>,
    pub registry: RegistryService,
    pub audit: AuditService,
    pub lifecycle: LifecycleService,
    pub ingestion: IngestionService,
    pub review: ReviewService,
    pub releases: ReleaseService,
    pub translation: TranslationService,
}

impl AppState {
    /// Connect to PostgreSQL and build every service
    pub async fn new(config: Config) -> Result<Self> {
        let pool = db::connect(&config.database).await?;
        if config.database.run_migrations {
            db::run_migrations(&pool).await?;
        }

        let store = Arc::new(PostgresCurationStore::new(pool));
        let verifier = ai_verifier_from_config(&config.external.ai)?;
        let who = who_client_from_config(&config.external.who)?;
        Ok(Self::with_collaborators(config, store, verifier, who))
    }

    /// Build on an empty in-memory store
    pub fn in_memory(config: Config) -> Result<Self> {
        let verifier = ai_verifier_from_config(&config.external.ai)?;
        let who = who_client_from_config(&config.external.who)?;
        Ok(Self::with_collaborators(
            config,
            Arc::new(InMemoryCurationStore::new()),
            verifier,
            who,
        ))
    }

    pub fn with_collaborators<S>(
        config: Config,
        store: Arc<S>,
        verifier: Arc<dyn AiVerifier>,
        who: Arc<dyn WhoEnrichment>,
    ) -> Self
    where
        S: CurationStore + 'static,
    {
        let staging: Arc<dyn StagingStore> = store.clone();
        let store: Arc<dyn CurationStore> = store;

        let audit = AuditService::new(store.clone());
        let registry = RegistryService::new(store.clone(), who);
        let lifecycle = LifecycleService::new(
            store.clone(),
            registry.clone(),
            audit.clone(),
            verifier.clone(),
        );
        let ingestion = IngestionService::new(
            store.clone(),
            registry.clone(),
            audit.clone(),
            verifier.clone(),
        );
        let review = ReviewService::new(store.clone(), audit.clone());
        let releases = ReleaseService::new(store.clone(), config.release.clone());
        let translation =
            TranslationService::with_config(store.clone(), releases.clone(), &config.cache);

        Self {
            config: Arc::new(config),
            store,
            staging,
            verifier,
            registry,
            audit,
            lifecycle,
            ingestion,
            review,
            releases,
            translation,
        }
    }

    /// Start the background enrichment workers
    ///
    /// Must be called from within a tokio runtime.
    pub fn enrichment_pool(&self) -> EnrichmentPool {
        EnrichmentPool::start(
            self.staging.clone(),
            self.verifier.clone(),
            &self.config.workers,
        )
    }
}
