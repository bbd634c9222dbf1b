//! Pure planning of lifecycle write sets
//!
//! Planners read the current mappings of one ICD entry and the curator's intent,
//! and return the ordered list of changes the store applies atomically. Updates
//! that leave a row without a staged/verified primary are ordered before the ones
//! that grant it, so the single-primary index holds after every step.

use crate::{
    models::{
        AiAssessment, CurationDecision, LifecycleAction, Mapping, MappingChange, MappingDetail,
        MappingStatus, MappingUpdate, SkippedItem, TermRef, TmSystem,
    },
    Error, Result,
};
use std::collections::BTreeMap;

/// Audit row to write once a plan has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAudit {
    pub mapping_id: i64,
    pub action: LifecycleAction,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupPlan {
    pub changes: Vec<MappingChange>,
    pub audits: Vec<PlannedAudit>,
    pub skipped: Vec<SkippedItem>,
}

/// Working copy of one ICD group's mappings while a decision is applied.
struct GroupState<'a> {
    icd_name: &'a str,
    current: &'a [MappingDetail],
    targets: BTreeMap<i64, MappingUpdate>,
    audits: Vec<PlannedAudit>,
    skipped: Vec<SkippedItem>,
}

impl<'a> GroupState<'a> {
    fn new(icd_name: &'a str, current: &'a [MappingDetail]) -> Self {
        Self {
            icd_name,
            current,
            targets: BTreeMap::new(),
            audits: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn find(&self, system: TmSystem, term: &TermRef) -> Option<&'a Mapping> {
        self.current
            .iter()
            .find(|d| {
                d.term.system == system
                    && d.term.term == term.term
                    && d.term.code.as_deref().unwrap_or("") == term.code.as_deref().unwrap_or("")
            })
            .map(|d| &d.mapping)
    }

    fn skip(&mut self, term: &TermRef, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(icd = %self.icd_name, term = %term.term, %reason, "Skipping curation item");
        self.skipped.push(SkippedItem {
            icd_name: self.icd_name.to_string(),
            term: Some(term.term.clone()),
            reason,
        });
    }

    /// Status and primary flag as they stand after the steps planned so far.
    fn effective(&self, mapping: &Mapping) -> (MappingStatus, bool) {
        match self.targets.get(&mapping.id) {
            Some(update) => (update.status, update.is_primary),
            None => (mapping.status, mapping.is_primary),
        }
    }

    fn target(&mut self, mapping: &Mapping) -> &mut MappingUpdate {
        self.targets
            .entry(mapping.id)
            .or_insert_with(|| MappingUpdate::from_mapping(mapping))
    }

    /// Resolve a term to its mapping and check the curation transition.
    fn resolve(
        &mut self,
        system: TmSystem,
        term: &TermRef,
        next: MappingStatus,
    ) -> Option<&'a Mapping> {
        let Some(mapping) = self.find(system, term) else {
            self.skip(term, format!("no {system} mapping for this term"));
            return None;
        };

        let (status, _) = self.effective(mapping);
        if status == MappingStatus::RejectedCorrection {
            self.skip(term, "rejected mappings move only through remap");
            return None;
        }
        if status != next && !status.can_transition_to(next) {
            self.skip(term, format!("cannot move from {status} to {next}"));
            return None;
        }
        Some(mapping)
    }

    fn reject(&mut self, system: TmSystem, term: &TermRef, next: MappingStatus, reason: &str) {
        let Some(mapping) = self.resolve(system, term, next) else {
            return;
        };
        let target = self.target(mapping);
        target.status = next;
        target.is_primary = false;
        target.curated = true;
        self.audits.push(PlannedAudit {
            mapping_id: mapping.id,
            action: LifecycleAction::Reject,
            reason: reason.to_string(),
        });
    }

    fn approve_primary(&mut self, system: TmSystem, term: &TermRef) {
        let Some(mapping) = self.resolve(system, term, MappingStatus::Staged) else {
            return;
        };

        // Demote whichever row currently holds the primary for this system
        let current = self.current;
        for other in current
            .iter()
            .map(|d| &d.mapping)
            .filter(|m| m.system == system && m.id != mapping.id)
        {
            let (status, is_primary) = self.effective(other);
            if is_primary && status.is_curated() {
                self.target(other).is_primary = false;
                self.audits.push(PlannedAudit {
                    mapping_id: other.id,
                    action: LifecycleAction::Modify,
                    reason: "demoted to alias by new primary".to_string(),
                });
            }
        }

        let target = self.target(mapping);
        target.status = MappingStatus::Staged;
        target.is_primary = true;
        target.curated = true;
        self.audits.push(PlannedAudit {
            mapping_id: mapping.id,
            action: LifecycleAction::Verify,
            reason: "approved as primary".to_string(),
        });
    }

    fn approve_alias(&mut self, system: TmSystem, term: &TermRef) {
        let Some(mapping) = self.resolve(system, term, MappingStatus::Staged) else {
            return;
        };
        let target = self.target(mapping);
        target.status = MappingStatus::Staged;
        target.is_primary = false;
        target.curated = true;
        self.audits.push(PlannedAudit {
            mapping_id: mapping.id,
            action: LifecycleAction::Verify,
            reason: "approved as alias".to_string(),
        });
    }

    fn finish(self) -> GroupPlan {
        let mut updates: Vec<MappingUpdate> = self.targets.into_values().collect();
        updates.sort_by_key(|u| u.is_primary && u.status.is_curated());

        GroupPlan {
            changes: updates.into_iter().map(MappingChange::Update).collect(),
            audits: self.audits,
            skipped: self.skipped,
        }
    }
}

fn check_term_text(system: TmSystem, term: &TermRef, role: &str) -> Result<()> {
    if term.term.trim().is_empty() {
        return Err(Error::Validation(format!(
            "{role} term for {system} has no term text"
        )));
    }
    Ok(())
}

/// Plan one ICD group of a curation batch
///
/// Per system: rejections first, then the primary, then aliases. Items whose
/// mapping is missing or whose transition is not allowed are reported as skipped.
///
/// # Errors
/// * `Validation` - A primary or alias has no term text; the whole group is refused
pub fn plan_curation(decision: &CurationDecision, current: &[MappingDetail]) -> Result<GroupPlan> {
    for (system, choice) in &decision.systems {
        if let Some(primary) = &choice.primary {
            check_term_text(*system, primary, "primary")?;
        }
        for alias in &choice.aliases {
            check_term_text(*system, alias, "alias")?;
        }
    }

    let mut state = GroupState::new(&decision.icd_name, current);

    for (system, choice) in &decision.systems {
        for rejected in &choice.rejected {
            state.reject(
                *system,
                &rejected.term,
                rejected.reason.status(),
                rejected.reason.as_str(),
            );
        }

        if let Some(primary) = &choice.primary {
            state.approve_primary(*system, primary);
        }

        for alias in &choice.aliases {
            if choice.primary.as_ref() == Some(alias) {
                state.skip(alias, "already approved as primary");
                continue;
            }
            state.approve_alias(*system, alias);
        }
    }

    Ok(state.finish())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapPlan {
    pub changes: Vec<MappingChange>,
    /// Row that carries the term after the move.
    pub target_id: i64,
    pub status: MappingStatus,
    pub is_primary: bool,
    pub merged: bool,
}

/// Plan moving a `rejected_correction` mapping onto another ICD entry
///
/// The destination status is derived: `staged` when the destination already has a
/// staged mapping for the term's system (primary only if no staged or verified
/// primary exists there yet), otherwise `suggested`. An existing (destination,
/// term) row absorbs the move and the rejected row is deleted.
///
/// # Errors
/// * `Validation` - The mapping is not `rejected_correction`, or already points at the destination
pub fn plan_remap(
    moving: &Mapping,
    destination_icd_id: i64,
    destination: &[MappingDetail],
    assessment: AiAssessment,
) -> Result<RemapPlan> {
    if moving.status != MappingStatus::RejectedCorrection {
        return Err(Error::Validation(format!(
            "only rejected_correction mappings can be remapped (mapping {} is {})",
            moving.id, moving.status
        )));
    }
    if moving.icd_id == destination_icd_id {
        return Err(Error::Validation(
            "mapping already points at the destination ICD entry".to_string(),
        ));
    }

    let existing = destination
        .iter()
        .map(|d| &d.mapping)
        .find(|m| m.term_id == moving.term_id);
    let target = existing.unwrap_or(moving);

    let same_system = destination
        .iter()
        .map(|d| &d.mapping)
        .filter(|m| m.system == moving.system);

    let mut has_staged = false;
    let mut primary_taken = false;
    for other in same_system {
        if other.status == MappingStatus::Staged {
            has_staged = true;
        }
        if other.id != target.id && other.holds_primary() {
            primary_taken = true;
        }
    }

    let (status, is_primary) = if has_staged {
        (MappingStatus::Staged, !primary_taken)
    } else {
        (MappingStatus::Suggested, false)
    };

    let mut update = MappingUpdate::from_mapping(target);
    update.icd_id = destination_icd_id;
    update.status = status;
    update.is_primary = is_primary;
    update.assessment = Some(assessment);
    update.curated = true;

    let mut changes = Vec::with_capacity(2);
    if existing.is_some() {
        changes.push(MappingChange::Delete(moving.id));
    }
    changes.push(MappingChange::Update(update));

    Ok(RemapPlan {
        changes,
        target_id: target.id,
        status,
        is_primary,
        merged: existing.is_some(),
    })
}

/// Primary flag for a freshly attached suggestion
///
/// The first live mapping of an (ICD, system) becomes primary; later ones are
/// aliases unless `force_primary` is set. Forcing does not demote the existing primary.
pub fn primary_for_new(existing: &[MappingDetail], system: TmSystem, force_primary: bool) -> bool {
    force_primary
        || !existing.iter().any(|d| {
            d.mapping.system == system && d.mapping.is_primary && !d.mapping.status.is_rejected()
        })
}
