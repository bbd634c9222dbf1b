//! Ingestion staging rows awaiting promotion

use super::mapping::AiAssessment;
use super::registry::TmSystem;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceStatus {
    Queued,
    Done,
    Error,
}

impl InferenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceStatus::Queued => "queued",
            InferenceStatus::Done => "done",
            InferenceStatus::Error => "error",
        }
    }
}

impl FromStr for InferenceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(InferenceStatus::Queued),
            "done" => Ok(InferenceStatus::Done),
            "error" => Ok(InferenceStatus::Error),
            other => Err(Error::Validation(format!(
                "unknown inference status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingRow {
    pub id: i64,
    pub system: TmSystem,
    pub source_term: String,
    pub source_code: Option<String>,
    pub suggested_icd_name: Option<String>,
    pub icd_code: Option<String>,
    pub short_definition: Option<String>,
    pub long_definition: Option<String>,
    pub vernacular: Option<String>,
    pub ai_confidence: Option<i32>,
    pub ai_justification: Option<String>,
    pub inference_status: Option<InferenceStatus>,
    /// ICD entry the row was attached to, once promoted.
    pub promoted_icd: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StagingRow {
    pub fn is_promoted(&self) -> bool {
        self.promoted_icd.is_some()
    }

    pub fn assessment(&self) -> Option<AiAssessment> {
        match (&self.ai_justification, self.ai_confidence) {
            (None, None) => None,
            (justification, confidence) => Some(AiAssessment::new(
                justification.clone().unwrap_or_else(|| "N/A".to_string()),
                i64::from(confidence.unwrap_or(0)),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStagingRow {
    pub system: TmSystem,
    pub source_term: String,
    #[serde(default)]
    pub source_code: Option<String>,
    #[serde(default)]
    pub suggested_icd_name: Option<String>,
    #[serde(default)]
    pub icd_code: Option<String>,
    #[serde(default)]
    pub short_definition: Option<String>,
    #[serde(default)]
    pub long_definition: Option<String>,
    #[serde(default)]
    pub vernacular: Option<String>,
}

/// Result of one inference run, written back by row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceUpdate {
    pub status: InferenceStatus,
    /// Left untouched when `None`.
    pub assessment: Option<AiAssessment>,
}

impl InferenceUpdate {
    pub fn queued() -> Self {
        Self {
            status: InferenceStatus::Queued,
            assessment: None,
        }
    }
}
