//! Curator intent and curation read-models

use super::mapping::{AiAssessment, MappingStatus};
use super::registry::{TermKey, TmSystem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Reference to a suggested term within one system of a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRef {
    pub term: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl TermRef {
    pub fn new(term: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            term: term.into(),
            code: code.map(str::to_string),
        }
    }

    pub fn key(&self, system: TmSystem) -> TermKey {
        TermKey {
            system,
            term: self.term.clone(),
            code: self.code.clone(),
        }
    }
}

/// Why a suggestion was turned down.
///
/// `orphan` means the ICD entry has no counterpart in this system; anything
/// else means the suggestion points at the wrong ICD entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RejectionReason {
    Orphan,
    Correction,
}

impl From<String> for RejectionReason {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("orphan") {
            RejectionReason::Orphan
        } else {
            RejectionReason::Correction
        }
    }
}

impl From<RejectionReason> for String {
    fn from(value: RejectionReason) -> Self {
        value.as_str().to_string()
    }
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Orphan => "orphan",
            RejectionReason::Correction => "correction",
        }
    }

    pub fn status(&self) -> MappingStatus {
        match self {
            RejectionReason::Orphan => MappingStatus::RejectedOrphan,
            RejectionReason::Correction => MappingStatus::RejectedCorrection,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedSuggestion {
    #[serde(flatten)]
    pub term: TermRef,
    pub reason: RejectionReason,
}

/// Curator decision for one system of an ICD entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDecision {
    #[serde(default)]
    pub primary: Option<TermRef>,
    #[serde(default)]
    pub aliases: Vec<TermRef>,
    #[serde(default)]
    pub rejected: Vec<RejectedSuggestion>,
}

/// Curator decisions for one ICD entry, applied as one atomic group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurationDecision {
    pub icd_name: String,
    #[serde(default)]
    pub systems: BTreeMap<TmSystem, SystemDecision>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub icd_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    pub reason: String,
}

/// Result of a curation batch; partial application is expected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurationReport {
    pub applied_groups: Vec<String>,
    pub mappings_updated: usize,
    pub skipped: Vec<SkippedItem>,
}

/// Request to move a `rejected_correction` mapping to another ICD entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapRequest {
    pub term: TermKey,
    /// ICD the rejected mapping currently points at; required when the term
    /// has more than one rejected mapping.
    #[serde(default)]
    pub from_icd: Option<String>,
    pub destination_icd: String,
    #[serde(default)]
    pub is_new_icd: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapOutcome {
    pub mapping_id: i64,
    pub destination_icd: String,
    pub status: MappingStatus,
    pub is_primary: bool,
    /// The move landed on an existing (ICD, term) row.
    pub merged: bool,
    pub created_icd: bool,
}

/// Suggestion handed over by ingestion for attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Candidate {
    pub system: TmSystem,
    #[validate(length(min = 1))]
    pub term: String,
    #[serde(default)]
    pub code: Option<String>,
    #[validate(length(min = 1))]
    pub icd_name: String,
    #[serde(default)]
    pub icd_code: Option<String>,
    #[serde(default)]
    pub short_definition: Option<String>,
    #[serde(default)]
    pub long_definition: Option<String>,
    #[serde(default)]
    pub vernacular: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, max = 100))]
    pub confidence: Option<i64>,
    #[serde(default)]
    pub justification: Option<String>,
}

impl Candidate {
    pub fn term_key(&self) -> TermKey {
        TermKey {
            system: self.system,
            term: self.term.clone(),
            code: self.code.clone(),
        }
    }

    /// Assessment carried by the candidate, if ingestion already ran inference.
    pub fn assessment(&self) -> Option<AiAssessment> {
        match (&self.justification, self.confidence) {
            (None, None) => None,
            (justification, confidence) => Some(AiAssessment::new(
                justification.clone().unwrap_or_else(|| "N/A".to_string()),
                confidence.unwrap_or(0),
            )),
        }
    }
}

/// One term as shown inside a [`SystemMapping`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSummary {
    pub term: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_confidence: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_justification: Option<String>,
}

impl TermSummary {
    pub fn new(term: impl Into<String>, code: Option<String>) -> Self {
        Self {
            term: term.into(),
            code,
            mapping_id: None,
            ai_confidence: None,
            ai_justification: None,
        }
    }
}

/// Primary term and ordered aliases of one system for one ICD entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMapping {
    pub primary: Option<TermSummary>,
    pub aliases: Vec<TermSummary>,
}

impl SystemMapping {
    /// Place a term; a second primary is shown as an alias.
    pub fn push(&mut self, term: TermSummary, is_primary: bool) {
        if is_primary && self.primary.is_none() {
            self.primary = Some(term);
        } else {
            self.aliases.push(term);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.aliases.is_empty()
    }

    pub fn len(&self) -> usize {
        usize::from(self.primary.is_some()) + self.aliases.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasterRowStatus {
    Staged,
    Verified,
}

/// One ICD entry of the master map (staged and verified mappings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterMapRow {
    pub icd_name: String,
    pub icd_code: Option<String>,
    pub row_status: MasterRowStatus,
    pub systems: BTreeMap<TmSystem, SystemMapping>,
}

/// Suggestions awaiting review, grouped by ICD entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRow {
    pub icd_name: String,
    pub icd_code: Option<String>,
    pub systems: BTreeMap<TmSystem, SystemMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedMapping {
    pub mapping_id: i64,
    pub icd_name: String,
    pub system: TmSystem,
    pub term: String,
    pub code: Option<String>,
    pub status: MappingStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedQueues {
    /// `rejected_correction`: eligible for remap.
    pub needs_correction: Vec<RejectedMapping>,
    /// `rejected_orphan`: terminal.
    pub no_mapping: Vec<RejectedMapping>,
}

/// Counts shown on the curation dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurationStats {
    /// ICD entries with at least one suggestion.
    pub review: usize,
    /// ICD entries with at least one staged mapping.
    pub master_map: usize,
    /// ICD entries with at least one verified mapping.
    pub verified: usize,
    /// Rejected mappings of either kind.
    pub rejected: usize,
}

/// Number of ICD entries whose suggestions span three, two or one systems.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completeness {
    pub three_systems: usize,
    pub two_systems: usize,
    pub one_system: usize,
}
