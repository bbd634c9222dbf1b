//! Mapping lifecycle: curation, commit, undo, revert and remap
//!
//! Every operation either applies completely or leaves storage untouched for the
//! entity it addresses. Curation batches apply per ICD group; one group failing
//! does not roll back the others.

pub mod planning;

use crate::{
    db::CurationStore,
    metrics::{self, MAPPING_TRANSITIONS_TOTAL},
    models::{
        CurationDecision, CurationReport, LifecycleAction, Mapping, MappingChange, MappingDetail,
        MappingStatus, RemapOutcome, RemapRequest, SkippedItem,
    },
    services::{
        audit::AuditService,
        external::{assess_or_placeholder, AiVerifier, TermPayload},
        registry::RegistryService,
    },
    Error, Result,
};
use planning::{plan_curation, plan_remap, GroupPlan};
use std::sync::Arc;

const NEW_ICD_DESCRIPTION: &str = "Newly added during re-mapping.";

#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn CurationStore>,
    registry: RegistryService,
    audit: AuditService,
    verifier: Arc<dyn AiVerifier>,
}

fn count_transitions(changes: &[MappingChange]) {
    for change in changes {
        if let MappingChange::Update(update) = change {
            MAPPING_TRANSITIONS_TOTAL
                .with_label_values(&[update.status.as_str()])
                .inc();
        }
    }
}

fn count_bulk(moved: &[Mapping], to: MappingStatus) {
    MAPPING_TRANSITIONS_TOTAL
        .with_label_values(&[to.as_str()])
        .inc_by(moved.len() as u64);
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn CurationStore>,
        registry: RegistryService,
        audit: AuditService,
        verifier: Arc<dyn AiVerifier>,
    ) -> Self {
        Self {
            store,
            registry,
            audit,
            verifier,
        }
    }

    /// Apply a batch of curator decisions
    ///
    /// Each ICD group is planned and written atomically. Groups that fail (unknown
    /// ICD entry, invalid payload, storage conflict) are reported as skipped and
    /// the rest of the batch continues.
    pub async fn submit_curation(
        &self,
        decisions: &[CurationDecision],
        actor: &str,
    ) -> Result<CurationReport> {
        let mut report = CurationReport::default();

        for decision in decisions {
            match self.apply_group(decision, actor).await {
                Ok(plan) => {
                    report.mappings_updated += plan.changes.len();
                    report.skipped.extend(plan.skipped);
                    report.applied_groups.push(decision.icd_name.clone());
                }
                Err(e) => {
                    tracing::warn!(icd = %decision.icd_name, error = %e, "Curation group not applied");
                    report.skipped.push(SkippedItem {
                        icd_name: decision.icd_name.clone(),
                        term: None,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            groups = decisions.len(),
            applied = report.applied_groups.len(),
            updated = report.mappings_updated,
            skipped = report.skipped.len(),
            actor,
            "Curation batch processed"
        );

        let result = Ok(report);
        metrics::record_operation("submit_curation", &result);
        result
    }

    async fn apply_group(&self, decision: &CurationDecision, actor: &str) -> Result<GroupPlan> {
        let icd = self.registry.require_icd(&decision.icd_name).await?;
        let current = self.store.mappings_for_icd(icd.id).await?;

        let plan = plan_curation(decision, &current)?;
        if !plan.changes.is_empty() {
            self.store.apply_changes(&plan.changes).await?;
            count_transitions(&plan.changes);
        }

        for audit in &plan.audits {
            self.audit
                .record(audit.mapping_id, audit.action, Some(actor), Some(&audit.reason))
                .await;
        }

        self.registry.recompute_touched([icd.id]).await;
        Ok(plan)
    }

    /// Move every staged mapping to verified
    ///
    /// # Errors
    /// * `EmptySet` - Nothing is staged
    pub async fn commit_to_master(&self) -> Result<usize> {
        let result = self.commit_inner().await;
        metrics::record_operation("commit_to_master", &result);
        result
    }

    async fn commit_inner(&self) -> Result<usize> {
        let moved = self
            .store
            .transition_status(None, &[MappingStatus::Staged], MappingStatus::Verified, false)
            .await?;

        if moved.is_empty() {
            return Err(Error::EmptySet("No staged mappings to commit.".to_string()));
        }

        count_bulk(&moved, MappingStatus::Verified);
        self.registry
            .recompute_touched(moved.iter().map(|m| m.icd_id))
            .await;

        tracing::info!(count = moved.len(), "Staged mappings committed to master");
        Ok(moved.len())
    }

    /// Return an ICD entry's verified mappings to staged
    ///
    /// # Errors
    /// * `NotFound` - Unknown ICD entry, or it has no verified mappings
    pub async fn undo_verification(&self, icd_name: &str) -> Result<usize> {
        let result = self.undo_inner(icd_name).await;
        metrics::record_operation("undo_verification", &result);
        result
    }

    async fn undo_inner(&self, icd_name: &str) -> Result<usize> {
        let icd = self.registry.require_icd(icd_name).await?;
        let moved = self
            .store
            .transition_status(
                Some(icd.id),
                &[MappingStatus::Verified],
                MappingStatus::Staged,
                false,
            )
            .await?;

        if moved.is_empty() {
            return Err(Error::NotFound(format!(
                "verified mappings for ICD entry '{icd_name}'"
            )));
        }

        count_bulk(&moved, MappingStatus::Staged);
        self.registry.recompute_touched([icd.id]).await;

        tracing::info!(icd = %icd_name, count = moved.len(), "Verification undone");
        Ok(moved.len())
    }

    /// Send an ICD entry's staged and verified mappings back to review
    ///
    /// Reverted rows lose their primary flag.
    ///
    /// # Errors
    /// * `NotFound` - Unknown ICD entry, or nothing staged or verified
    pub async fn revert_master_mapping(&self, icd_name: &str) -> Result<usize> {
        let result = self.revert_inner(icd_name).await;
        metrics::record_operation("revert_master_mapping", &result);
        result
    }

    async fn revert_inner(&self, icd_name: &str) -> Result<usize> {
        let icd = self.registry.require_icd(icd_name).await?;
        let moved = self
            .store
            .transition_status(
                Some(icd.id),
                &[MappingStatus::Staged, MappingStatus::Verified],
                MappingStatus::Suggested,
                true,
            )
            .await?;

        if moved.is_empty() {
            return Err(Error::NotFound(format!(
                "staged or verified mappings for ICD entry '{icd_name}'"
            )));
        }

        count_bulk(&moved, MappingStatus::Suggested);
        self.registry.recompute_touched([icd.id]).await;

        tracing::info!(icd = %icd_name, count = moved.len(), "Master mapping reverted to review");
        Ok(moved.len())
    }

    /// Move a `rejected_correction` mapping onto another ICD entry
    ///
    /// # Errors
    /// * `NotFound` - Unknown term, no rejected mapping, or unknown destination without `is_new_icd`
    /// * `Validation` - Several rejected mappings and no `from_icd` to pick one
    pub async fn remap_rejected_term(
        &self,
        request: &RemapRequest,
        actor: &str,
    ) -> Result<RemapOutcome> {
        let result = self.remap_inner(request, actor).await;
        metrics::record_operation("remap_rejected_term", &result);
        result
    }

    async fn remap_inner(&self, request: &RemapRequest, actor: &str) -> Result<RemapOutcome> {
        let term = self
            .store
            .find_term(&request.term)
            .await?
            .ok_or_else(|| Error::NotFound(format!("term {}", request.term)))?;

        let moving = self.rejected_origin(term.id, request).await?;
        let origin_icd = moving.icd_name.clone();
        let moving = moving.mapping;

        let (destination, created_icd) = match self.store.find_icd(&request.destination_icd).await? {
            Some(existing) => (existing, false),
            None if request.is_new_icd => {
                self.store
                    .ensure_icd(&request.destination_icd, None, Some(NEW_ICD_DESCRIPTION))
                    .await?
            }
            None => {
                return Err(Error::NotFound(format!(
                    "ICD entry '{}'",
                    request.destination_icd
                )))
            }
        };

        let assessment =
            assess_or_placeholder(self.verifier.as_ref(), &destination.name, &TermPayload::from(&term))
                .await;
        // Destination state is read after the external call.
        let destination_mappings = self.store.mappings_for_icd(destination.id).await?;

        let plan = plan_remap(&moving, destination.id, &destination_mappings, assessment)?;
        self.store.apply_changes(&plan.changes).await?;
        count_transitions(&plan.changes);

        let reason = format!("remapped from '{}' to '{}'", origin_icd, destination.name);
        self.audit
            .record(plan.target_id, LifecycleAction::Remap, Some(actor), Some(&reason))
            .await;

        self.registry
            .recompute_touched([moving.icd_id, destination.id])
            .await;

        tracing::info!(
            term = %request.term,
            from = %origin_icd,
            to = %destination.name,
            status = %plan.status,
            is_primary = plan.is_primary,
            merged = plan.merged,
            "Rejected term remapped"
        );

        Ok(RemapOutcome {
            mapping_id: plan.target_id,
            destination_icd: destination.name,
            status: plan.status,
            is_primary: plan.is_primary,
            merged: plan.merged,
            created_icd,
        })
    }

    /// Pick the `rejected_correction` mapping a remap moves
    async fn rejected_origin(&self, term_id: i64, request: &RemapRequest) -> Result<MappingDetail> {
        let mut candidates: Vec<MappingDetail> = self
            .store
            .mappings_for_term(term_id)
            .await?
            .into_iter()
            .filter(|d| d.mapping.status == MappingStatus::RejectedCorrection)
            .filter(|d| {
                request
                    .from_icd
                    .as_deref()
                    .map_or(true, |from| d.icd_name == from)
            })
            .collect();

        match candidates.len() {
            0 => Err(Error::NotFound(format!(
                "rejected_correction mapping for term {}",
                request.term
            ))),
            1 => Ok(candidates.remove(0)),
            n => Err(Error::Validation(format!(
                "term {} has {n} rejected_correction mappings; name the origin ICD entry",
                request.term
            ))),
        }
    }
}
