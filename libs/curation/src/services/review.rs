//! Read-models for curators: review queue, master map, rejections, dashboards

use crate::{
    db::CurationStore,
    models::{
        Completeness, CurationStats, MappingAudit, MappingDetail, MappingStatus, MasterMapRow,
        MasterRowStatus, RejectedMapping, RejectedQueues, ReviewRow, SystemMapping, TermSummary,
        TmSystem,
    },
    services::audit::AuditService,
    Result,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

fn summary(detail: &MappingDetail) -> TermSummary {
    TermSummary {
        term: detail.term.term.clone(),
        code: detail.term.code.clone(),
        mapping_id: Some(detail.mapping.id),
        ai_confidence: detail.mapping.ai_confidence,
        ai_justification: detail.mapping.ai_justification.clone(),
    }
}

struct IcdGroup {
    icd_code: Option<String>,
    any_verified: bool,
    systems: BTreeMap<TmSystem, SystemMapping>,
}

/// Group mapping rows per ICD name, then per system.
fn group_by_icd(details: &[MappingDetail]) -> BTreeMap<String, IcdGroup> {
    let mut groups: BTreeMap<String, IcdGroup> = BTreeMap::new();
    for detail in details {
        let group = groups
            .entry(detail.icd_name.clone())
            .or_insert_with(|| IcdGroup {
                icd_code: detail.icd_code.clone(),
                any_verified: false,
                systems: BTreeMap::new(),
            });
        group.any_verified |= detail.mapping.status == MappingStatus::Verified;
        group
            .systems
            .entry(detail.mapping.system)
            .or_default()
            .push(summary(detail), detail.mapping.is_primary);
    }
    groups
}

pub fn master_rows(details: &[MappingDetail]) -> Vec<MasterMapRow> {
    group_by_icd(details)
        .into_iter()
        .map(|(icd_name, group)| MasterMapRow {
            icd_name,
            icd_code: group.icd_code,
            row_status: if group.any_verified {
                MasterRowStatus::Verified
            } else {
                MasterRowStatus::Staged
            },
            systems: group.systems,
        })
        .collect()
}

pub fn review_rows(details: &[MappingDetail]) -> Vec<ReviewRow> {
    group_by_icd(details)
        .into_iter()
        .map(|(icd_name, group)| ReviewRow {
            icd_name,
            icd_code: group.icd_code,
            systems: group.systems,
        })
        .collect()
}

pub fn split_rejections(details: &[MappingDetail]) -> RejectedQueues {
    let mut queues = RejectedQueues::default();
    for detail in details {
        let row = RejectedMapping {
            mapping_id: detail.mapping.id,
            icd_name: detail.icd_name.clone(),
            system: detail.mapping.system,
            term: detail.term.term.clone(),
            code: detail.term.code.clone(),
            status: detail.mapping.status,
        };
        match detail.mapping.status {
            MappingStatus::RejectedCorrection => queues.needs_correction.push(row),
            MappingStatus::RejectedOrphan => queues.no_mapping.push(row),
            _ => {}
        }
    }
    queues
}

pub fn count_stats(details: &[MappingDetail]) -> CurationStats {
    let mut review = BTreeSet::new();
    let mut staged = BTreeSet::new();
    let mut verified = BTreeSet::new();
    let mut rejected = 0;

    for detail in details {
        let name = detail.icd_name.as_str();
        match detail.mapping.status {
            MappingStatus::Suggested => {
                review.insert(name);
            }
            MappingStatus::Staged => {
                staged.insert(name);
            }
            MappingStatus::Verified => {
                verified.insert(name);
            }
            MappingStatus::RejectedCorrection | MappingStatus::RejectedOrphan => rejected += 1,
        }
    }

    CurationStats {
        review: review.len(),
        master_map: staged.len(),
        verified: verified.len(),
        rejected,
    }
}

pub fn count_completeness(suggestions: &[MappingDetail]) -> Completeness {
    let mut systems: HashMap<&str, BTreeSet<TmSystem>> = HashMap::new();
    for detail in suggestions {
        systems
            .entry(detail.icd_name.as_str())
            .or_default()
            .insert(detail.mapping.system);
    }

    let mut completeness = Completeness::default();
    for covered in systems.values() {
        match covered.len() {
            3 => completeness.three_systems += 1,
            2 => completeness.two_systems += 1,
            1 => completeness.one_system += 1,
            _ => {}
        }
    }
    completeness
}

#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn CurationStore>,
    audit: AuditService,
}

impl ReviewService {
    pub fn new(store: Arc<dyn CurationStore>, audit: AuditService) -> Self {
        Self { store, audit }
    }

    /// Suggestions awaiting a curator decision, grouped per ICD entry
    pub async fn review_queue(&self) -> Result<Vec<ReviewRow>> {
        let suggested = self
            .store
            .mappings_with_status(&[MappingStatus::Suggested])
            .await?;
        Ok(review_rows(&suggested))
    }

    /// Staged and verified mappings grouped per ICD entry
    pub async fn master_map(&self) -> Result<Vec<MasterMapRow>> {
        let curated = self
            .store
            .mappings_with_status(&[MappingStatus::Staged, MappingStatus::Verified])
            .await?;
        Ok(master_rows(&curated))
    }

    pub async fn rejected_mappings(&self) -> Result<RejectedQueues> {
        let rejected = self
            .store
            .mappings_with_status(&[
                MappingStatus::RejectedCorrection,
                MappingStatus::RejectedOrphan,
            ])
            .await?;
        Ok(split_rejections(&rejected))
    }

    pub async fn stats(&self) -> Result<CurationStats> {
        let all = self.store.mappings_with_status(&MappingStatus::ALL).await?;
        Ok(count_stats(&all))
    }

    pub async fn completeness(&self) -> Result<Completeness> {
        let suggested = self
            .store
            .mappings_with_status(&[MappingStatus::Suggested])
            .await?;
        Ok(count_completeness(&suggested))
    }

    pub async fn audit_history(&self, mapping_id: i64) -> Result<Vec<MappingAudit>> {
        self.audit.history(mapping_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Mapping, TraditionalTerm};
    use chrono::Utc;

    fn detail(id: i64, icd: &str, system: TmSystem, status: MappingStatus, primary: bool) -> MappingDetail {
        let now = Utc::now();
        MappingDetail {
            mapping: Mapping {
                id,
                icd_id: 1,
                term_id: id,
                system,
                status,
                is_primary: primary,
                ai_confidence: Some(80),
                ai_justification: None,
                curated_at: None,
                created_at: now,
            },
            icd_name: icd.into(),
            icd_code: None,
            term: TraditionalTerm {
                id,
                system,
                term: format!("term-{id}"),
                code: None,
                short_definition: None,
                long_definition: None,
                vernacular: None,
                created_at: now,
            },
        }
    }

    #[test]
    fn master_row_is_verified_when_any_row_is() {
        let rows = master_rows(&[
            detail(1, "Fever", TmSystem::Ayurveda, MappingStatus::Staged, true),
            detail(2, "Fever", TmSystem::Ayurveda, MappingStatus::Verified, false),
            detail(3, "Cough", TmSystem::Siddha, MappingStatus::Staged, true),
        ]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].icd_name, "Cough");
        assert_eq!(rows[0].row_status, MasterRowStatus::Staged);
        assert_eq!(rows[1].row_status, MasterRowStatus::Verified);

        let ayurveda = &rows[1].systems[&TmSystem::Ayurveda];
        assert_eq!(ayurveda.primary.as_ref().and_then(|t| t.mapping_id), Some(1));
        assert_eq!(ayurveda.aliases.len(), 1);
    }

    #[test]
    fn stats_count_icd_entries_not_rows() {
        let stats = count_stats(&[
            detail(1, "Fever", TmSystem::Ayurveda, MappingStatus::Suggested, true),
            detail(2, "Fever", TmSystem::Siddha, MappingStatus::Suggested, true),
            detail(3, "Cough", TmSystem::Siddha, MappingStatus::Verified, true),
            detail(4, "Cough", TmSystem::Unani, MappingStatus::RejectedOrphan, false),
            detail(5, "Rash", TmSystem::Unani, MappingStatus::RejectedCorrection, false),
        ]);
        assert_eq!(
            stats,
            CurationStats {
                review: 1,
                master_map: 0,
                verified: 1,
                rejected: 2
            }
        );
    }

    #[test]
    fn completeness_buckets_by_system_coverage() {
        let completeness = count_completeness(&[
            detail(1, "Fever", TmSystem::Ayurveda, MappingStatus::Suggested, true),
            detail(2, "Fever", TmSystem::Siddha, MappingStatus::Suggested, true),
            detail(3, "Fever", TmSystem::Unani, MappingStatus::Suggested, true),
            detail(4, "Cough", TmSystem::Unani, MappingStatus::Suggested, true),
            detail(5, "Cough", TmSystem::Unani, MappingStatus::Suggested, false),
        ]);
        assert_eq!(completeness.three_systems, 1);
        assert_eq!(completeness.two_systems, 0);
        assert_eq!(completeness.one_system, 1);
    }

    #[test]
    fn rejections_split_by_kind() {
        let queues = split_rejections(&[
            detail(1, "Fever", TmSystem::Ayurveda, MappingStatus::RejectedCorrection, false),
            detail(2, "Fever", TmSystem::Ayurveda, MappingStatus::RejectedOrphan, false),
        ]);
        assert_eq!(queues.needs_correction[0].mapping_id, 1);
        assert_eq!(queues.no_mapping[0].mapping_id, 2);
    }
}
