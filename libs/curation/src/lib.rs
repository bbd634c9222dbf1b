//! AyuSync curation core
//!
//! Mapping lifecycle and ConceptMap release engine for NAMASTE ↔ ICD-11:
//! - Curation of AI suggestions into staged and verified mappings
//! - At most one staged/verified primary term per (ICD entry, system)
//! - Remapping of rejected terms onto other ICD entries
//! - Versioned ConceptMap releases with element-level diffs
//! - Cached release-scoped translation lookups
//! - Background AI enrichment of ingestion rows

#![allow(
    clippy::too_many_arguments, // Service constructors wire many collaborators
    clippy::new_without_default,
)]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod workers;

pub use config::Config;
pub use error::{Error, Outcome, Result};
pub use state::AppState;
