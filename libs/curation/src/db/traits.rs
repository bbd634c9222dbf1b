//! Storage traits for the curation engine
//!
//! Services only see these traits; PostgreSQL and in-memory backends implement them
//! with the same constraints (unique ICD names, unique term identity, unique
//! (ICD, term) edges, at most one staged/verified primary per (ICD, system)).

use crate::{
    models::{
        ConceptMapElement, ConceptMapRelease, ElementData, IcdEnrichment, IcdEntry, IcdStatus,
        InferenceUpdate, Mapping, MappingAudit, MappingChange, MappingDetail, MappingStatus,
        NewAudit, NewMapping, NewStagingRow, NewTerm, ReleaseSummary, StagingRow, TermKey,
        TraditionalTerm,
    },
    Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Rows removed by an administrative reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeCounts {
    pub mappings: u64,
    pub terms: u64,
    pub icd_entries: u64,
}

/// Identity and enrichment storage for ICD entries and traditional terms
#[async_trait]
pub trait TermRegistry: Send + Sync {
    /// Find an ICD entry by exact name
    async fn find_icd(&self, name: &str) -> Result<Option<IcdEntry>>;

    /// Find an ICD entry by name, ignoring ASCII case
    async fn find_icd_ignore_case(&self, name: &str) -> Result<Option<IcdEntry>>;

    async fn get_icd(&self, id: i64) -> Result<Option<IcdEntry>>;

    /// Find or create an ICD entry
    ///
    /// # Arguments
    /// * `name` - Identity key
    /// * `who_code` - Back-filled onto an existing entry that has none
    /// * `description` - Used only when the entry is created
    ///
    /// # Returns
    /// The entry and whether it was created by this call
    async fn ensure_icd(
        &self,
        name: &str,
        who_code: Option<&str>,
        description: Option<&str>,
    ) -> Result<(IcdEntry, bool)>;

    /// Create an ICD entry in `Orphaned` status
    ///
    /// # Errors
    /// * `Validation` - An entry with the same name exists
    async fn insert_icd(&self, name: &str, description: Option<&str>) -> Result<IcdEntry>;

    /// All ICD entries ordered by name
    async fn list_icds(&self) -> Result<Vec<IcdEntry>>;

    /// Overwrite the enrichment fields that are `Some`
    async fn update_icd_enrichment(&self, id: i64, enrichment: &IcdEnrichment)
        -> Result<IcdEntry>;

    async fn set_icd_status(&self, id: i64, status: IcdStatus) -> Result<()>;

    async fn find_term(&self, key: &TermKey) -> Result<Option<TraditionalTerm>>;

    /// Find or create a term by identity, back-filling empty definitions
    async fn ensure_term(&self, term: &NewTerm) -> Result<TraditionalTerm>;

    /// Delete every mapping, term and ICD entry
    ///
    /// Releases and the audit trail are kept.
    async fn purge_registry(&self) -> Result<PurgeCounts>;
}

/// Storage for mapping edges
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn get_mapping(&self, id: i64) -> Result<Option<Mapping>>;

    /// Find the edge between an ICD entry and a term
    async fn find_mapping(&self, icd_id: i64, term_id: i64) -> Result<Option<Mapping>>;

    /// All mappings of an ICD entry, joined with their terms
    async fn mappings_for_icd(&self, icd_id: i64) -> Result<Vec<MappingDetail>>;

    /// All mappings of a term, joined with their ICD entries
    async fn mappings_for_term(&self, term_id: i64) -> Result<Vec<MappingDetail>>;

    /// Mappings in any of `statuses`, ordered by ICD name, system and id
    async fn mappings_with_status(&self, statuses: &[MappingStatus])
        -> Result<Vec<MappingDetail>>;

    /// Insert a new edge
    ///
    /// # Errors
    /// * `Validation` - The (ICD, term) edge already exists
    /// * `InvariantRisk` - The row would be a second staged/verified primary
    async fn insert_mapping(&self, mapping: &NewMapping) -> Result<Mapping>;

    /// Apply a write set atomically, in order
    ///
    /// # Errors
    /// * `NotFound` - A referenced mapping does not exist
    /// * `InvariantRisk` - A step would leave two staged/verified primaries
    ///
    /// Nothing is written when an error is returned.
    async fn apply_changes(&self, changes: &[MappingChange]) -> Result<()>;

    /// Move every mapping in `from` (optionally limited to one ICD entry) to `to`
    ///
    /// # Arguments
    /// * `icd_id` - Restrict to this ICD entry, or all entries when `None`
    /// * `from` - Eligible source statuses
    /// * `to` - Target status
    /// * `clear_primary` - Also reset `is_primary`
    ///
    /// # Returns
    /// The updated mappings
    async fn transition_status(
        &self,
        icd_id: Option<i64>,
        from: &[MappingStatus],
        to: MappingStatus,
        clear_primary: bool,
    ) -> Result<Vec<Mapping>>;
}

/// Append-only audit trail
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append_audit(&self, entry: &NewAudit) -> Result<MappingAudit>;

    /// Audit rows of one mapping, oldest first
    async fn audit_for_mapping(&self, mapping_id: i64) -> Result<Vec<MappingAudit>>;
}

/// ConceptMap releases and their materialized elements
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    async fn find_release(&self, version: &str) -> Result<Option<ConceptMapRelease>>;

    /// Find or create a release by version
    ///
    /// # Returns
    /// The release and whether it was created by this call
    async fn ensure_release(
        &self,
        name: &str,
        version: &str,
        notes: Option<&str>,
    ) -> Result<(ConceptMapRelease, bool)>;

    /// Most recently created release
    async fn latest_release(&self) -> Result<Option<ConceptMapRelease>>;

    /// Release with the greatest `created_at` strictly before `before`
    async fn previous_release(&self, before: DateTime<Utc>) -> Result<Option<ConceptMapRelease>>;

    /// All releases, newest first, with element counts
    async fn list_releases(&self) -> Result<Vec<ReleaseSummary>>;

    /// Atomically replace every element owned by a release
    ///
    /// # Returns
    /// Number of elements written
    async fn replace_elements(&self, release_id: i64, elements: &[ElementData]) -> Result<u64>;

    /// Elements of a release, ordered by ICD name, system and term
    async fn release_elements(&self, release_id: i64) -> Result<Vec<ConceptMapElement>>;

    /// Set `published_at`
    async fn mark_published(&self, release_id: i64, at: DateTime<Utc>)
        -> Result<ConceptMapRelease>;
}

/// Ingestion staging rows
#[async_trait]
pub trait StagingStore: Send + Sync {
    async fn insert_staging_row(&self, row: &NewStagingRow) -> Result<StagingRow>;

    async fn staging_row(&self, id: i64) -> Result<Option<StagingRow>>;

    /// Write an inference result back by row id
    ///
    /// # Errors
    /// * `NotFound` - No staging row with this id
    async fn record_inference(&self, id: i64, update: &InferenceUpdate) -> Result<()>;

    /// Record the ICD entry a row was attached to
    async fn mark_promoted(&self, id: i64, icd_name: &str) -> Result<()>;
}

/// Everything the curation services need from storage
pub trait CurationStore:
    TermRegistry + MappingStore + AuditLog + ReleaseStore + StagingStore
{
}

impl<T> CurationStore for T where
    T: TermRegistry + MappingStore + AuditLog + ReleaseStore + StagingStore
{
}
