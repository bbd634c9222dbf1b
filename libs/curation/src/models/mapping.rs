//! The term to ICD edge and its curation state machine

use super::registry::{TmSystem, TraditionalTerm};
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Curation status of a mapping.
///
/// ```text
/// suggested -> staged | rejected_correction | rejected_orphan
/// staged <-> verified
/// staged | verified -> suggested            (revert)
/// rejected_correction -> suggested | staged (remap only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Suggested,
    Staged,
    Verified,
    RejectedCorrection,
    RejectedOrphan,
}

impl MappingStatus {
    pub const ALL: [MappingStatus; 5] = [
        MappingStatus::Suggested,
        MappingStatus::Staged,
        MappingStatus::Verified,
        MappingStatus::RejectedCorrection,
        MappingStatus::RejectedOrphan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::Suggested => "suggested",
            MappingStatus::Staged => "staged",
            MappingStatus::Verified => "verified",
            MappingStatus::RejectedCorrection => "rejected_correction",
            MappingStatus::RejectedOrphan => "rejected_orphan",
        }
    }

    /// Staged and verified rows are the ones the single-primary rule covers.
    pub fn is_curated(&self) -> bool {
        matches!(self, MappingStatus::Staged | MappingStatus::Verified)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            MappingStatus::RejectedCorrection | MappingStatus::RejectedOrphan
        )
    }

    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: MappingStatus) -> bool {
        use MappingStatus::*;
        matches!(
            (self, next),
            (Suggested, Staged)
                | (Suggested, RejectedCorrection)
                | (Suggested, RejectedOrphan)
                | (Staged, Verified)
                | (Verified, Staged)
                | (Staged, Suggested)
                | (Verified, Suggested)
                | (RejectedCorrection, Suggested)
                | (RejectedCorrection, Staged)
        )
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MappingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown mapping status '{s}'")))
    }
}

/// Justification and confidence produced by the AI verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiAssessment {
    pub justification: String,
    /// 0..=100
    pub confidence: i32,
}

impl AiAssessment {
    pub fn new(justification: impl Into<String>, confidence: i64) -> Self {
        Self {
            justification: justification.into(),
            confidence: confidence.clamp(0, 100) as i32,
        }
    }

    /// Placeholder stored when the verifier could not be reached.
    pub fn unavailable() -> Self {
        Self {
            justification: "N/A".to_string(),
            confidence: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub id: i64,
    pub icd_id: i64,
    pub term_id: i64,
    /// Denormalized from the term so the single-primary rule can be indexed.
    pub system: TmSystem,
    pub status: MappingStatus,
    pub is_primary: bool,
    pub ai_confidence: Option<i32>,
    pub ai_justification: Option<String>,
    pub curated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Mapping {
    /// Counts against the one-primary-per-(ICD, system) rule.
    pub fn holds_primary(&self) -> bool {
        self.is_primary && self.status.is_curated()
    }
}

/// A mapping joined with its anchors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDetail {
    pub mapping: Mapping,
    pub icd_name: String,
    pub icd_code: Option<String>,
    pub term: TraditionalTerm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMapping {
    pub icd_id: i64,
    pub term_id: i64,
    pub system: TmSystem,
    pub status: MappingStatus,
    pub is_primary: bool,
    pub assessment: Option<AiAssessment>,
}

/// Full target state of one mapping row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingUpdate {
    pub id: i64,
    pub icd_id: i64,
    pub status: MappingStatus,
    pub is_primary: bool,
    /// `None` leaves the stored assessment untouched.
    pub assessment: Option<AiAssessment>,
    /// Stamp `curated_at` with the write time.
    pub curated: bool,
}

impl MappingUpdate {
    /// Start from the row's current state.
    pub fn from_mapping(mapping: &Mapping) -> Self {
        Self {
            id: mapping.id,
            icd_id: mapping.icd_id,
            status: mapping.status,
            is_primary: mapping.is_primary,
            assessment: None,
            curated: false,
        }
    }
}

/// One step of an atomic write set.
///
/// Steps apply in order, so demotions must precede the promotion they make room for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingChange {
    Update(MappingUpdate),
    Delete(i64),
}

impl MappingChange {
    pub fn mapping_id(&self) -> i64 {
        match self {
            MappingChange::Update(update) => update.id,
            MappingChange::Delete(id) => *id,
        }
    }
}
