//! Ingestion-side attachment of AI suggestions

use crate::{
    db::CurationStore,
    metrics,
    models::{
        Candidate, LifecycleAction, Mapping, MappingStatus, NewMapping, NewStagingRow, NewTerm,
        StagingRow,
    },
    services::{
        audit::AuditService,
        external::{assess_or_placeholder, AiVerifier, TermPayload},
        lifecycle::planning::primary_for_new,
        registry::RegistryService,
    },
    Error, Result,
};
use std::sync::Arc;
use validator::Validate;

const ATTACH_REASON: &str = "ingestion promote";

/// Capitalize the first letter of every word, lowercase the rest.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn CurationStore>,
    registry: RegistryService,
    audit: AuditService,
    verifier: Arc<dyn AiVerifier>,
}

impl IngestionService {
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

    /// Attach a suggestion as a `suggested` mapping
    ///
    /// # Arguments
    /// * `candidate` - Term, target ICD and optional AI assessment
    /// * `force_primary` - Mark primary even when the (ICD, system) already has one
    /// * `enrich` - Run the AI verifier when the candidate carries no assessment
    /// * `actor` - Recorded on the audit row
    ///
    /// # Errors
    /// * `Validation` - Invalid candidate, or the (ICD, term) edge already exists
    pub async fn attach_candidate(
        &self,
        candidate: &Candidate,
        force_primary: bool,
        enrich: bool,
        actor: &str,
    ) -> Result<Mapping> {
        let result = self
            .attach_inner(candidate, force_primary, enrich, actor)
            .await;
        metrics::record_operation("attach_candidate", &result);
        result
    }

    async fn attach_inner(
        &self,
        candidate: &Candidate,
        force_primary: bool,
        enrich: bool,
        actor: &str,
    ) -> Result<Mapping> {
        candidate.validate()?;
        if candidate.term.trim().is_empty() || candidate.icd_name.trim().is_empty() {
            return Err(Error::Validation(
                "candidate needs both a term and an ICD name".to_string(),
            ));
        }

        let (icd, created_icd) = self
            .store
            .ensure_icd(
                candidate.icd_name.trim(),
                non_empty(&candidate.icd_code),
                None,
            )
            .await?;

        let term = self
            .store
            .ensure_term(&NewTerm {
                key: candidate.term_key(),
                short_definition: candidate.short_definition.clone(),
                long_definition: candidate.long_definition.clone(),
                vernacular: candidate.vernacular.clone(),
            })
            .await?;

        if self.store.find_mapping(icd.id, term.id).await?.is_some() {
            return Err(Error::Validation(format!(
                "{} is already mapped to '{}'",
                term.key(),
                icd.name
            )));
        }

        let existing = self.store.mappings_for_icd(icd.id).await?;
        let is_primary = primary_for_new(&existing, candidate.system, force_primary);

        let assessment = match candidate.assessment() {
            Some(assessment) => Some(assessment),
            None if enrich => Some(
                assess_or_placeholder(self.verifier.as_ref(), &icd.name, &TermPayload::from(&term))
                    .await,
            ),
            None => None,
        };

        let mapping = self
            .store
            .insert_mapping(&NewMapping {
                icd_id: icd.id,
                term_id: term.id,
                system: candidate.system,
                status: MappingStatus::Suggested,
                is_primary,
                assessment,
            })
            .await?;

        metrics::MAPPING_TRANSITIONS_TOTAL
            .with_label_values(&[MappingStatus::Suggested.as_str()])
            .inc();
        self.audit
            .record(
                mapping.id,
                LifecycleAction::Promote,
                Some(actor),
                Some(ATTACH_REASON),
            )
            .await;
        self.registry.recompute_touched([icd.id]).await;

        tracing::info!(
            icd = %icd.name,
            term = %term.key(),
            is_primary,
            created_icd,
            "Candidate attached"
        );
        Ok(mapping)
    }

    /// Store a raw ingestion row for later enrichment and promotion
    pub async fn stage_row(&self, row: &NewStagingRow) -> Result<StagingRow> {
        if row.source_term.trim().is_empty() {
            return Err(Error::Validation(
                "staging row needs a source term".to_string(),
            ));
        }
        let staged = self.store.insert_staging_row(row).await?;
        tracing::debug!(row_id = staged.id, term = %staged.source_term, "Row staged");
        Ok(staged)
    }

    /// Attach a staging row as a suggestion
    ///
    /// Without an inferred ICD name the title-cased source term is used.
    ///
    /// # Errors
    /// * `NotFound` - Unknown row id
    /// * `Validation` - The row was already promoted
    pub async fn promote_staging_row(
        &self,
        row_id: i64,
        force_primary: bool,
        actor: &str,
    ) -> Result<Mapping> {
        let row = self
            .store
            .staging_row(row_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("staging row {row_id}")))?;

        if let Some(icd) = &row.promoted_icd {
            return Err(Error::Validation(format!(
                "staging row {row_id} was already promoted to '{icd}'"
            )));
        }

        let icd_name = non_empty(&row.suggested_icd_name)
            .map(str::to_string)
            .unwrap_or_else(|| title_case(&row.source_term));

        let assessment = row.assessment();
        let candidate = Candidate {
            system: row.system,
            term: row.source_term.clone(),
            code: row.source_code.clone(),
            icd_name: icd_name.clone(),
            icd_code: row.icd_code.clone(),
            short_definition: row.short_definition.clone(),
            long_definition: row.long_definition.clone(),
            vernacular: row.vernacular.clone(),
            confidence: assessment.as_ref().map(|a| i64::from(a.confidence)),
            justification: assessment.map(|a| a.justification),
        };

        let mapping = self
            .attach_candidate(&candidate, force_primary, false, actor)
            .await?;
        self.store.mark_promoted(row_id, &icd_name).await?;
        Ok(mapping)
    }
}
