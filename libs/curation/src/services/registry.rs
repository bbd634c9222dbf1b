//! Term/ICD registry operations

use crate::{
    db::{CurationStore, PurgeCounts},
    models::{IcdEntry, IcdStatus, MappingStatus, NewIcd},
    services::external::WhoEnrichment,
    Error, Result,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use validator::Validate;

/// Coarse ICD status from the statuses of its mappings.
pub fn derive_icd_status(statuses: impl IntoIterator<Item = MappingStatus>) -> IcdStatus {
    let mut pending = false;
    for status in statuses {
        match status {
            MappingStatus::Verified => return IcdStatus::Mapped,
            MappingStatus::Suggested | MappingStatus::Staged => pending = true,
            MappingStatus::RejectedCorrection | MappingStatus::RejectedOrphan => {}
        }
    }
    if pending {
        IcdStatus::Pending
    } else {
        IcdStatus::Orphaned
    }
}

#[derive(Clone)]
pub struct RegistryService {
    store: Arc<dyn CurationStore>,
    who: Arc<dyn WhoEnrichment>,
}

impl RegistryService {
    pub fn new(store: Arc<dyn CurationStore>, who: Arc<dyn WhoEnrichment>) -> Self {
        Self { store, who }
    }

    /// Look up an ICD entry by exact name
    pub async fn require_icd(&self, name: &str) -> Result<IcdEntry> {
        self.store
            .find_icd(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("ICD entry '{name}'")))
    }

    /// Add a curated ICD entry; names are unique regardless of case
    pub async fn add_icd(&self, new: NewIcd) -> Result<IcdEntry> {
        new.validate()?;
        let name = new.name.trim();

        if let Some(existing) = self.store.find_icd_ignore_case(name).await? {
            return Err(Error::Validation(format!(
                "ICD entry '{}' already exists",
                existing.name
            )));
        }

        let description = new.description.as_deref().filter(|d| !d.trim().is_empty());
        let entry = self.store.insert_icd(name, description).await?;
        tracing::info!(icd = %entry.name, "ICD entry added");
        Ok(entry)
    }

    /// Pull WHO code and description for an entry
    ///
    /// Lookup failures leave the entry unenriched.
    pub async fn enrich_icd(&self, name: &str) -> Result<IcdEntry> {
        let entry = self.require_icd(name).await?;

        let enrichment = match self.who.enrich(&entry.name).await {
            Ok(enrichment) => {
                crate::metrics::EXTERNAL_CALLS_TOTAL
                    .with_label_values(&["who", "ok"])
                    .inc();
                enrichment
            }
            Err(e) => {
                crate::metrics::EXTERNAL_CALLS_TOTAL
                    .with_label_values(&["who", "error"])
                    .inc();
                tracing::warn!(icd = %entry.name, error = %e, "WHO enrichment failed, entry left unenriched");
                return Ok(entry);
            }
        };

        let changes = enrichment.changes_for(&entry);
        if changes.is_empty() {
            tracing::debug!(icd = %entry.name, "WHO enrichment brought no changes");
            return Ok(entry);
        }

        let updated = self.store.update_icd_enrichment(entry.id, &changes).await?;
        tracing::info!(icd = %updated.name, who_code = ?updated.who_code, "ICD entry enriched");
        Ok(updated)
    }

    pub async fn list_icds(&self) -> Result<Vec<IcdEntry>> {
        self.store.list_icds().await
    }

    /// Distinct ICD names with at least one verified mapping, sorted
    pub async fn verified_icd_names(&self) -> Result<Vec<String>> {
        let verified = self
            .store
            .mappings_with_status(&[MappingStatus::Verified])
            .await?;
        let names: BTreeSet<String> = verified.into_iter().map(|d| d.icd_name).collect();
        Ok(names.into_iter().collect())
    }

    /// Recompute and persist the coarse status of one ICD entry
    pub async fn recompute_status(&self, icd_id: i64) -> Result<IcdStatus> {
        let mappings = self.store.mappings_for_icd(icd_id).await?;
        let status = derive_icd_status(mappings.iter().map(|d| d.mapping.status));
        self.store.set_icd_status(icd_id, status).await?;
        Ok(status)
    }

    /// Recompute every touched ICD entry; failures are logged, not raised
    pub async fn recompute_touched(&self, icd_ids: impl IntoIterator<Item = i64>) {
        let unique: HashSet<i64> = icd_ids.into_iter().collect();
        for icd_id in unique {
            if let Err(e) = self.recompute_status(icd_id).await {
                tracing::warn!(icd_id, error = %e, "Failed to recompute ICD status");
            }
        }
    }

    /// Administrative wipe of mappings, terms and ICD entries
    pub async fn full_reset(&self) -> Result<PurgeCounts> {
        let counts = self.store.purge_registry().await?;
        tracing::warn!(
            mappings = counts.mappings,
            terms = counts.terms,
            icd_entries = counts.icd_entries,
            "Curation registry reset"
        );
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verified_wins_over_pending() {
        let status = derive_icd_status([MappingStatus::Suggested, MappingStatus::Verified]);
        assert_eq!(status, IcdStatus::Mapped);
    }

    #[test]
    fn only_rejections_leave_entry_orphaned() {
        assert_eq!(
            derive_icd_status([
                MappingStatus::RejectedOrphan,
                MappingStatus::RejectedCorrection
            ]),
            IcdStatus::Orphaned
        );
        assert_eq!(derive_icd_status([]), IcdStatus::Orphaned);
    }

    #[test]
    fn staged_counts_as_pending() {
        assert_eq!(
            derive_icd_status([MappingStatus::Staged]),
            IcdStatus::Pending
        );
    }
}
