//! ConceptMap releases: refresh, diff, listing and publication

use crate::{
    cache::same_text,
    config::ReleaseConfig,
    db::CurationStore,
    metrics::{self, RELEASE_ELEMENTS},
    models::{
        ConceptMapElement, ConceptMapRelease, ElementData, ElementFilter, Equivalence,
        MappingDetail, MappingStatus, ReleaseDiff, ReleaseSummary,
    },
    services::diff::diff_elements,
    Error, Result,
};
use chrono::Utc;
use std::sync::Arc;

/// Element derived from one verified mapping.
pub fn element_from_mapping(detail: &MappingDetail) -> ElementData {
    ElementData {
        icd_name: detail.icd_name.clone(),
        icd_code: detail.icd_code.clone(),
        system: detail.mapping.system,
        term: detail.term.term.clone(),
        term_code: detail.term.code.clone(),
        equivalence: Equivalence::Equivalent,
        is_primary: detail.mapping.is_primary,
        active: true,
    }
}

#[derive(Clone)]
pub struct ReleaseService {
    store: Arc<dyn CurationStore>,
    config: ReleaseConfig,
}

impl ReleaseService {
    pub fn new(store: Arc<dyn CurationStore>, config: ReleaseConfig) -> Self {
        Self { store, config }
    }

    /// Exact version first, then a case-insensitive match
    async fn find_release(&self, version: &str) -> Result<Option<ConceptMapRelease>> {
        if let Some(exact) = self.store.find_release(version).await? {
            return Ok(Some(exact));
        }
        Ok(self
            .store
            .list_releases()
            .await?
            .into_iter()
            .map(|summary| summary.release)
            .find(|release| same_text(&release.version, version)))
    }

    async fn require_release(&self, version: &str) -> Result<ConceptMapRelease> {
        self.find_release(version)
            .await?
            .ok_or_else(|| Error::NotFound(format!("release '{version}'")))
    }

    /// Rebuild a release's elements from the currently verified mappings
    ///
    /// Creates the release when the version is new. Existing elements of the
    /// release are replaced wholesale.
    ///
    /// # Returns
    /// Number of elements written
    pub async fn refresh_release(&self, version: &str, notes: Option<&str>) -> Result<u64> {
        let result = self.refresh_inner(version, notes).await;
        metrics::record_operation("refresh_release", &result);
        result
    }

    async fn refresh_inner(&self, version: &str, notes: Option<&str>) -> Result<u64> {
        let version = version.trim();
        if version.is_empty() {
            return Err(Error::Validation("release version must not be empty".to_string()));
        }

        if let Some(existing) = self.find_release(version).await? {
            if existing.version != version {
                return Err(Error::Validation(format!(
                    "release '{version}' clashes with existing release '{}'",
                    existing.version
                )));
            }
        }

        let notes = notes.unwrap_or(&self.config.default_notes);
        let (release, created) = self
            .store
            .ensure_release(&self.config.concept_map_name, version, Some(notes))
            .await?;

        let verified = self
            .store
            .mappings_with_status(&[MappingStatus::Verified])
            .await?;
        let mut elements: Vec<ElementData> = verified.iter().map(element_from_mapping).collect();
        elements.sort();

        let written = self.store.replace_elements(release.id, &elements).await?;
        RELEASE_ELEMENTS.set(written as i64);

        tracing::info!(
            version,
            created,
            elements = written,
            "Release refreshed"
        );
        Ok(written)
    }

    /// Compare a release with a baseline
    ///
    /// Without `from`, the baseline is the release created immediately before
    /// `version`. No baseline yields an empty diff with `from = None`.
    ///
    /// # Errors
    /// * `NotFound` - `version` or an explicit `from` does not exist
    pub async fn diff_release(&self, version: &str, from: Option<&str>) -> Result<ReleaseDiff> {
        let result = self.diff_inner(version, from).await;
        metrics::record_operation("diff_release", &result);
        result
    }

    async fn diff_inner(&self, version: &str, from: Option<&str>) -> Result<ReleaseDiff> {
        let target = self.require_release(version).await?;

        let baseline = match from {
            Some(from) => Some(self.require_release(from).await?),
            None => self.store.previous_release(target.created_at).await?,
        };

        let Some(baseline) = baseline else {
            tracing::debug!(version, "No baseline release, diff is empty");
            return Ok(diff_elements(None, &target.version, Vec::new(), Vec::new()));
        };

        let before = self.element_data(baseline.id).await?;
        let after = self.element_data(target.id).await?;
        let diff = diff_elements(Some(&baseline.version), &target.version, before, after);

        tracing::debug!(
            from = %baseline.version,
            to = %target.version,
            added = diff.summary.added,
            removed = diff.summary.removed,
            changed = diff.summary.changed,
            "Release diff computed"
        );
        Ok(diff)
    }

    async fn element_data(&self, release_id: i64) -> Result<Vec<ElementData>> {
        Ok(self
            .store
            .release_elements(release_id)
            .await?
            .into_iter()
            .map(|e| e.data)
            .collect())
    }

    pub async fn list_releases(&self) -> Result<Vec<ReleaseSummary>> {
        self.store.list_releases().await
    }

    pub async fn latest_release(&self) -> Result<Option<ConceptMapRelease>> {
        self.store.latest_release().await
    }

    /// Resolve an explicit version, or the latest release when none is given
    pub async fn resolve(&self, version: Option<&str>) -> Result<ConceptMapRelease> {
        match version {
            Some(version) => self.require_release(version).await,
            None => self
                .store
                .latest_release()
                .await?
                .ok_or_else(|| Error::NotFound("no release has been created".to_string())),
        }
    }

    pub async fn release_elements(
        &self,
        version: &str,
        filter: &ElementFilter,
    ) -> Result<Vec<ConceptMapElement>> {
        let release = self.require_release(version).await?;
        let elements = self.store.release_elements(release.id).await?;
        Ok(elements
            .into_iter()
            .filter(|e| filter.matches(&e.data))
            .collect())
    }

    /// Stamp `published_at`; publishing again keeps the first timestamp
    pub async fn publish_release(&self, version: &str) -> Result<ConceptMapRelease> {
        let release = self.require_release(version).await?;
        if release.published_at.is_some() {
            tracing::debug!(version, "Release already published");
            return Ok(release);
        }

        let published = self.store.mark_published(release.id, Utc::now()).await?;
        tracing::info!(version, "Release published");
        Ok(published)
    }
}
