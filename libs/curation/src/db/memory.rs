//! In-memory implementation of the curation storage traits
//!
//! Enforces the same uniqueness rules as the PostgreSQL schema so services behave
//! identically in tests and dry runs. Write sets are applied to a scratch copy and
//! swapped in only when every step succeeds.

use super::traits::{
    AuditLog, MappingStore, PurgeCounts, ReleaseStore, StagingStore, TermRegistry,
};
use crate::{
    cache::same_text,
    models::{
        ConceptMapElement, ConceptMapRelease, ElementData, IcdEnrichment, IcdEntry, IcdStatus,
        InferenceUpdate, Mapping, MappingAudit, MappingChange, MappingDetail, MappingStatus,
        NewAudit, NewMapping, NewStagingRow, NewTerm, ReleaseSummary, StagingRow, TermKey,
        TraditionalTerm,
    },
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    last_timestamp: Option<DateTime<Utc>>,
    icds: BTreeMap<i64, IcdEntry>,
    terms: BTreeMap<i64, TraditionalTerm>,
    mappings: BTreeMap<i64, Mapping>,
    audit: Vec<MappingAudit>,
    releases: BTreeMap<i64, ConceptMapRelease>,
    elements: BTreeMap<i64, Vec<ConceptMapElement>>,
    staging: BTreeMap<i64, StagingRow>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing timestamps so "created before" is always decidable.
    fn now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn icd_by_name(&self, name: &str) -> Option<&IcdEntry> {
        self.icds.values().find(|icd| icd.name == name)
    }

    fn term_by_key(&self, key: &TermKey) -> Option<&TraditionalTerm> {
        self.terms.values().find(|term| {
            term.system == key.system
                && term.term == key.term
                && term.code.as_deref().unwrap_or("") == key.code_key()
        })
    }

    fn detail(&self, mapping: &Mapping) -> Result<MappingDetail> {
        let icd = self
            .icds
            .get(&mapping.icd_id)
            .ok_or_else(|| Error::Internal(format!("dangling ICD {}", mapping.icd_id)))?;
        let term = self
            .terms
            .get(&mapping.term_id)
            .ok_or_else(|| Error::Internal(format!("dangling term {}", mapping.term_id)))?;

        Ok(MappingDetail {
            mapping: mapping.clone(),
            icd_name: icd.name.clone(),
            icd_code: icd.who_code.clone(),
            term: term.clone(),
        })
    }

    fn details<'a>(&self, mappings: impl Iterator<Item = &'a Mapping>) -> Result<Vec<MappingDetail>> {
        let mut details = mappings
            .map(|m| self.detail(m))
            .collect::<Result<Vec<_>>>()?;
        details.sort_by(|a, b| {
            (&a.icd_name, a.mapping.system, a.mapping.id).cmp(&(
                &b.icd_name,
                b.mapping.system,
                b.mapping.id,
            ))
        });
        Ok(details)
    }
}

/// Check the edge and single-primary rules for `candidate` against `mappings`.
fn check_constraints(mappings: &BTreeMap<i64, Mapping>, candidate: &Mapping) -> Result<()> {
    for other in mappings.values().filter(|m| m.id != candidate.id) {
        if other.icd_id == candidate.icd_id && other.term_id == candidate.term_id {
            return Err(Error::Validation(
                "a mapping already links this ICD entry and term".to_string(),
            ));
        }
        if candidate.holds_primary()
            && other.holds_primary()
            && other.icd_id == candidate.icd_id
            && other.system == candidate.system
        {
            return Err(Error::InvariantRisk(
                "another primary already exists for this ICD and system".to_string(),
            ));
        }
    }
    Ok(())
}

/// Curation store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryCurationStore {
    state: RwLock<MemoryState>,
}

impl InMemoryCurationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TermRegistry for InMemoryCurationStore {
    async fn find_icd(&self, name: &str) -> Result<Option<IcdEntry>> {
        let state = self.state.read().await;
        Ok(state.icd_by_name(name).cloned())
    }

    async fn find_icd_ignore_case(&self, name: &str) -> Result<Option<IcdEntry>> {
        let state = self.state.read().await;
        if let Some(exact) = state.icd_by_name(name) {
            return Ok(Some(exact.clone()));
        }
        Ok(state
            .icds
            .values()
            .find(|icd| same_text(&icd.name, name))
            .cloned())
    }

    async fn get_icd(&self, id: i64) -> Result<Option<IcdEntry>> {
        Ok(self.state.read().await.icds.get(&id).cloned())
    }

    async fn ensure_icd(
        &self,
        name: &str,
        who_code: Option<&str>,
        description: Option<&str>,
    ) -> Result<(IcdEntry, bool)> {
        let mut state = self.state.write().await;

        if let Some(id) = state.icd_by_name(name).map(|icd| icd.id) {
            let entry = state
                .icds
                .get_mut(&id)
                .ok_or_else(|| Error::Internal(format!("ICD {id} vanished")))?;
            if entry.who_code.as_deref().map_or(true, str::is_empty) {
                if let Some(code) = who_code {
                    entry.who_code = Some(code.to_string());
                }
            }
            return Ok((entry.clone(), false));
        }

        let id = state.next_id();
        let created_at = state.now();
        let entry = IcdEntry {
            id,
            name: name.to_string(),
            who_code: who_code.map(str::to_string),
            description: description.map(str::to_string),
            tm2_code: None,
            tm2_title: None,
            tm2_definition: None,
            status: IcdStatus::Orphaned,
            created_at,
        };
        state.icds.insert(id, entry.clone());
        Ok((entry, true))
    }

    async fn insert_icd(&self, name: &str, description: Option<&str>) -> Result<IcdEntry> {
        let mut state = self.state.write().await;
        if state.icd_by_name(name).is_some() {
            return Err(Error::Validation(format!("ICD entry '{name}' already exists")));
        }

        let id = state.next_id();
        let created_at = state.now();
        let entry = IcdEntry {
            id,
            name: name.to_string(),
            who_code: None,
            description: description.map(str::to_string),
            tm2_code: None,
            tm2_title: None,
            tm2_definition: None,
            status: IcdStatus::Orphaned,
            created_at,
        };
        state.icds.insert(id, entry.clone());
        Ok(entry)
    }

    async fn list_icds(&self) -> Result<Vec<IcdEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<IcdEntry> = state.icds.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn update_icd_enrichment(
        &self,
        id: i64,
        enrichment: &IcdEnrichment,
    ) -> Result<IcdEntry> {
        let mut state = self.state.write().await;
        let entry = state
            .icds
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("ICD entry {id}")))?;

        fn overwrite(field: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                field.clone_from(value);
            }
        }
        overwrite(&mut entry.who_code, &enrichment.who_code);
        overwrite(&mut entry.description, &enrichment.description);
        overwrite(&mut entry.tm2_code, &enrichment.tm2_code);
        overwrite(&mut entry.tm2_title, &enrichment.tm2_title);
        overwrite(&mut entry.tm2_definition, &enrichment.tm2_definition);

        Ok(entry.clone())
    }

    async fn set_icd_status(&self, id: i64, status: IcdStatus) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.icds.get_mut(&id) {
            entry.status = status;
        }
        Ok(())
    }

    async fn find_term(&self, key: &TermKey) -> Result<Option<TraditionalTerm>> {
        Ok(self.state.read().await.term_by_key(key).cloned())
    }

    async fn ensure_term(&self, term: &NewTerm) -> Result<TraditionalTerm> {
        let mut state = self.state.write().await;

        fn backfill(field: &mut Option<String>, value: &Option<String>) {
            if field.as_deref().map_or(true, str::is_empty) && value.is_some() {
                field.clone_from(value);
            }
        }

        if let Some(id) = state.term_by_key(&term.key).map(|t| t.id) {
            let existing = state
                .terms
                .get_mut(&id)
                .ok_or_else(|| Error::Internal(format!("term {id} vanished")))?;
            backfill(&mut existing.short_definition, &term.short_definition);
            backfill(&mut existing.long_definition, &term.long_definition);
            backfill(&mut existing.vernacular, &term.vernacular);
            return Ok(existing.clone());
        }

        let id = state.next_id();
        let created_at = state.now();
        let created = TraditionalTerm {
            id,
            system: term.key.system,
            term: term.key.term.clone(),
            code: term.key.code.clone(),
            short_definition: term.short_definition.clone(),
            long_definition: term.long_definition.clone(),
            vernacular: term.vernacular.clone(),
            created_at,
        };
        state.terms.insert(id, created.clone());
        Ok(created)
    }

    async fn purge_registry(&self) -> Result<PurgeCounts> {
        let mut state = self.state.write().await;
        let counts = PurgeCounts {
            mappings: state.mappings.len() as u64,
            terms: state.terms.len() as u64,
            icd_entries: state.icds.len() as u64,
        };
        state.mappings.clear();
        state.terms.clear();
        state.icds.clear();
        Ok(counts)
    }
}

#[async_trait]
impl MappingStore for InMemoryCurationStore {
    async fn get_mapping(&self, id: i64) -> Result<Option<Mapping>> {
        Ok(self.state.read().await.mappings.get(&id).cloned())
    }

    async fn find_mapping(&self, icd_id: i64, term_id: i64) -> Result<Option<Mapping>> {
        let state = self.state.read().await;
        Ok(state
            .mappings
            .values()
            .find(|m| m.icd_id == icd_id && m.term_id == term_id)
            .cloned())
    }

    async fn mappings_for_icd(&self, icd_id: i64) -> Result<Vec<MappingDetail>> {
        let state = self.state.read().await;
        state.details(state.mappings.values().filter(|m| m.icd_id == icd_id))
    }

    async fn mappings_for_term(&self, term_id: i64) -> Result<Vec<MappingDetail>> {
        let state = self.state.read().await;
        state.details(state.mappings.values().filter(|m| m.term_id == term_id))
    }

    async fn mappings_with_status(
        &self,
        statuses: &[MappingStatus],
    ) -> Result<Vec<MappingDetail>> {
        let state = self.state.read().await;
        state.details(
            state
                .mappings
                .values()
                .filter(|m| statuses.contains(&m.status)),
        )
    }

    async fn insert_mapping(&self, mapping: &NewMapping) -> Result<Mapping> {
        let mut state = self.state.write().await;

        if !state.icds.contains_key(&mapping.icd_id) {
            return Err(Error::NotFound(format!("ICD entry {}", mapping.icd_id)));
        }
        if !state.terms.contains_key(&mapping.term_id) {
            return Err(Error::NotFound(format!("term {}", mapping.term_id)));
        }

        let created_at = state.now();
        let mut created = Mapping {
            id: 0,
            icd_id: mapping.icd_id,
            term_id: mapping.term_id,
            system: mapping.system,
            status: mapping.status,
            is_primary: mapping.is_primary,
            ai_confidence: mapping.assessment.as_ref().map(|a| a.confidence),
            ai_justification: mapping.assessment.as_ref().map(|a| a.justification.clone()),
            curated_at: None,
            created_at,
        };
        check_constraints(&state.mappings, &created)?;

        created.id = state.next_id();
        state.mappings.insert(created.id, created.clone());
        Ok(created)
    }

    async fn apply_changes(&self, changes: &[MappingChange]) -> Result<()> {
        let mut state = self.state.write().await;
        let mut scratch = state.mappings.clone();
        let stamp = state.now();

        for change in changes {
            match change {
                MappingChange::Update(update) => {
                    if !state.icds.contains_key(&update.icd_id) {
                        return Err(Error::NotFound(format!("ICD entry {}", update.icd_id)));
                    }
                    let mut next = scratch
                        .get(&update.id)
                        .cloned()
                        .ok_or_else(|| Error::NotFound(format!("mapping {}", update.id)))?;
                    next.icd_id = update.icd_id;
                    next.status = update.status;
                    next.is_primary = update.is_primary;
                    if let Some(assessment) = &update.assessment {
                        next.ai_confidence = Some(assessment.confidence);
                        next.ai_justification = Some(assessment.justification.clone());
                    }
                    if update.curated {
                        next.curated_at = Some(stamp);
                    }
                    check_constraints(&scratch, &next)?;
                    scratch.insert(next.id, next);
                }
                MappingChange::Delete(id) => {
                    if scratch.remove(id).is_none() {
                        return Err(Error::NotFound(format!("mapping {id}")));
                    }
                }
            }
        }

        state.mappings = scratch;
        Ok(())
    }

    async fn transition_status(
        &self,
        icd_id: Option<i64>,
        from: &[MappingStatus],
        to: MappingStatus,
        clear_primary: bool,
    ) -> Result<Vec<Mapping>> {
        let mut state = self.state.write().await;
        let mut scratch = state.mappings.clone();
        let stamp = state.now();

        let ids: Vec<i64> = scratch
            .values()
            .filter(|m| from.contains(&m.status) && icd_id.map_or(true, |id| m.icd_id == id))
            .map(|m| m.id)
            .collect();

        for id in &ids {
            if let Some(mapping) = scratch.get_mut(id) {
                mapping.status = to;
                if clear_primary {
                    mapping.is_primary = false;
                }
                mapping.curated_at = Some(stamp);
            }
        }
        for id in &ids {
            if let Some(mapping) = scratch.get(id) {
                check_constraints(&scratch, mapping)?;
            }
        }

        let updated = ids.iter().filter_map(|id| scratch.get(id).cloned()).collect();
        state.mappings = scratch;
        Ok(updated)
    }
}

#[async_trait]
impl AuditLog for InMemoryCurationStore {
    async fn append_audit(&self, entry: &NewAudit) -> Result<MappingAudit> {
        let mut state = self.state.write().await;
        let id = state.next_id();
        let created_at = state.now();
        let record = MappingAudit {
            id,
            mapping_id: entry.mapping_id,
            action: entry.action,
            actor: entry.actor.clone(),
            reason: entry.reason.clone(),
            created_at,
        };
        state.audit.push(record.clone());
        Ok(record)
    }

    async fn audit_for_mapping(&self, mapping_id: i64) -> Result<Vec<MappingAudit>> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .filter(|a| a.mapping_id == mapping_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReleaseStore for InMemoryCurationStore {
    async fn find_release(&self, version: &str) -> Result<Option<ConceptMapRelease>> {
        let state = self.state.read().await;
        Ok(state
            .releases
            .values()
            .find(|r| r.version == version)
            .cloned())
    }

    async fn ensure_release(
        &self,
        name: &str,
        version: &str,
        notes: Option<&str>,
    ) -> Result<(ConceptMapRelease, bool)> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.releases.values().find(|r| r.version == version) {
            return Ok((existing.clone(), false));
        }

        let id = state.next_id();
        let created_at = state.now();
        let release = ConceptMapRelease {
            id,
            name: name.to_string(),
            version: version.to_string(),
            notes: notes.map(str::to_string),
            created_at,
            published_at: None,
        };
        state.releases.insert(id, release.clone());
        Ok((release, true))
    }

    async fn latest_release(&self) -> Result<Option<ConceptMapRelease>> {
        let state = self.state.read().await;
        Ok(state
            .releases
            .values()
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn previous_release(&self, before: DateTime<Utc>) -> Result<Option<ConceptMapRelease>> {
        let state = self.state.read().await;
        Ok(state
            .releases
            .values()
            .filter(|r| r.created_at < before)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn list_releases(&self) -> Result<Vec<ReleaseSummary>> {
        let state = self.state.read().await;
        let mut summaries: Vec<ReleaseSummary> = state
            .releases
            .values()
            .map(|release| ReleaseSummary {
                release: release.clone(),
                element_count: state.elements.get(&release.id).map_or(0, Vec::len) as u64,
            })
            .collect();
        summaries.sort_by(|a, b| {
            (b.release.created_at, b.release.id).cmp(&(a.release.created_at, a.release.id))
        });
        Ok(summaries)
    }

    async fn replace_elements(&self, release_id: i64, elements: &[ElementData]) -> Result<u64> {
        let mut state = self.state.write().await;
        if !state.releases.contains_key(&release_id) {
            return Err(Error::NotFound(format!("release {release_id}")));
        }

        let mut rows = Vec::with_capacity(elements.len());
        for data in elements {
            let id = state.next_id();
            rows.push(ConceptMapElement {
                id,
                release_id,
                data: data.clone(),
            });
        }
        let count = rows.len() as u64;
        state.elements.insert(release_id, rows);
        Ok(count)
    }

    async fn release_elements(&self, release_id: i64) -> Result<Vec<ConceptMapElement>> {
        let state = self.state.read().await;
        let mut elements = state.elements.get(&release_id).cloned().unwrap_or_default();
        elements.sort_by(|a, b| {
            (&a.data.icd_name, a.data.system, &a.data.term, a.id).cmp(&(
                &b.data.icd_name,
                b.data.system,
                &b.data.term,
                b.id,
            ))
        });
        Ok(elements)
    }

    async fn mark_published(
        &self,
        release_id: i64,
        at: DateTime<Utc>,
    ) -> Result<ConceptMapRelease> {
        let mut state = self.state.write().await;
        let release = state
            .releases
            .get_mut(&release_id)
            .ok_or_else(|| Error::NotFound(format!("release {release_id}")))?;
        release.published_at = Some(at);
        Ok(release.clone())
    }
}

#[async_trait]
impl StagingStore for InMemoryCurationStore {
    async fn insert_staging_row(&self, row: &NewStagingRow) -> Result<StagingRow> {
        let mut state = self.state.write().await;
        let id = state.next_id();
        let created_at = state.now();
        let staged = StagingRow {
            id,
            system: row.system,
            source_term: row.source_term.clone(),
            source_code: row.source_code.clone(),
            suggested_icd_name: row.suggested_icd_name.clone(),
            icd_code: row.icd_code.clone(),
            short_definition: row.short_definition.clone(),
            long_definition: row.long_definition.clone(),
            vernacular: row.vernacular.clone(),
            ai_confidence: None,
            ai_justification: None,
            inference_status: None,
            promoted_icd: None,
            created_at,
        };
        state.staging.insert(id, staged.clone());
        Ok(staged)
    }

    async fn staging_row(&self, id: i64) -> Result<Option<StagingRow>> {
        Ok(self.state.read().await.staging.get(&id).cloned())
    }

    async fn record_inference(&self, id: i64, update: &InferenceUpdate) -> Result<()> {
        let mut state = self.state.write().await;
        let row = state
            .staging
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("staging row {id}")))?;
        row.inference_status = Some(update.status);
        if let Some(assessment) = &update.assessment {
            row.ai_confidence = Some(assessment.confidence);
            row.ai_justification = Some(assessment.justification.clone());
        }
        Ok(())
    }

    async fn mark_promoted(&self, id: i64, icd_name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let row = state
            .staging
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("staging row {id}")))?;
        row.promoted_icd = Some(icd_name.to_string());
        Ok(())
    }
}
