//! Curation services
//!
//! Services are cheap `Clone` handles over the shared store.

pub mod audit;
pub mod diff;
pub mod external;
pub mod ingestion;
pub mod lifecycle;
pub mod registry;
pub mod release;
pub mod review;
pub mod translation;

pub use audit::AuditService;
pub use diff::diff_elements;
pub use external::{AiVerifier, TermPayload, WhoEnrichment};
pub use ingestion::IngestionService;
pub use lifecycle::LifecycleService;
pub use registry::RegistryService;
pub use release::ReleaseService;
pub use review::ReviewService;
pub use translation::{ForwardTranslation, IcdTranslation, TranslationService};
