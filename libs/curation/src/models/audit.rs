use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    /// Candidate attached from ingestion.
    Promote,
    /// Approved by a curator.
    Verify,
    Reject,
    /// Primary flag changed as a side effect of another approval.
    Modify,
    Remap,
}

impl LifecycleAction {
    pub const ALL: [LifecycleAction; 5] = [
        LifecycleAction::Promote,
        LifecycleAction::Verify,
        LifecycleAction::Reject,
        LifecycleAction::Modify,
        LifecycleAction::Remap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Promote => "promote",
            LifecycleAction::Verify => "verify",
            LifecycleAction::Reject => "reject",
            LifecycleAction::Modify => "modify",
            LifecycleAction::Remap => "remap",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LifecycleAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown lifecycle action '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingAudit {
    pub id: i64,
    pub mapping_id: i64,
    pub action: LifecycleAction,
    pub actor: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAudit {
    pub mapping_id: i64,
    pub action: LifecycleAction,
    pub actor: Option<String>,
    pub reason: Option<String>,
}
