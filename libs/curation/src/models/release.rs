//! ConceptMap releases and their elements

use super::registry::TmSystem;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ConceptMap relationship between source term and target ICD entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Equivalence {
    Relatedto,
    #[default]
    Equivalent,
    Equal,
    Wider,
    Subsumes,
    Narrower,
    Specializes,
    Inexact,
    Unmatched,
    Disjoint,
}

impl Equivalence {
    pub const ALL: [Equivalence; 10] = [
        Equivalence::Relatedto,
        Equivalence::Equivalent,
        Equivalence::Equal,
        Equivalence::Wider,
        Equivalence::Subsumes,
        Equivalence::Narrower,
        Equivalence::Specializes,
        Equivalence::Inexact,
        Equivalence::Unmatched,
        Equivalence::Disjoint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Equivalence::Relatedto => "relatedto",
            Equivalence::Equivalent => "equivalent",
            Equivalence::Equal => "equal",
            Equivalence::Wider => "wider",
            Equivalence::Subsumes => "subsumes",
            Equivalence::Narrower => "narrower",
            Equivalence::Specializes => "specializes",
            Equivalence::Inexact => "inexact",
            Equivalence::Unmatched => "unmatched",
            Equivalence::Disjoint => "disjoint",
        }
    }
}

impl fmt::Display for Equivalence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Equivalence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Equivalence::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown equivalence '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMapRelease {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    #[serde(flatten)]
    pub release: ConceptMapRelease,
    pub element_count: u64,
}

/// Point-in-time copy of one verified mapping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementData {
    pub icd_name: String,
    pub icd_code: Option<String>,
    pub system: TmSystem,
    pub term: String,
    /// Source NAMASTE code; informational, not compared by diffs.
    pub term_code: Option<String>,
    pub equivalence: Equivalence,
    pub is_primary: bool,
    pub active: bool,
}

impl ElementData {
    pub fn key(&self) -> ElementKey {
        ElementKey {
            system: self.system,
            term: self.term.clone(),
            icd_name: self.icd_name.clone(),
        }
    }

    /// Whether any of the compared attributes differ. A missing ICD code equals an empty one.
    pub fn differs_from(&self, other: &ElementData) -> bool {
        self.icd_code.as_deref().unwrap_or("") != other.icd_code.as_deref().unwrap_or("")
            || self.equivalence != other.equivalence
            || self.is_primary != other.is_primary
            || self.active != other.active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMapElement {
    pub id: i64,
    pub release_id: i64,
    #[serde(flatten)]
    pub data: ElementData,
}

/// Identity of an element across releases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementKey {
    pub system: TmSystem,
    pub term: String,
    pub icd_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementChange {
    pub before: ElementData,
    pub after: ElementData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDiff {
    pub from: Option<String>,
    pub to: String,
    pub added: Vec<ElementData>,
    pub removed: Vec<ElementData>,
    pub changed: Vec<ElementChange>,
    pub summary: DiffSummary,
}

impl ReleaseDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Narrowing applied when listing release elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementFilter {
    /// Case-insensitive exact match.
    pub icd_name: Option<String>,
    pub system: Option<TmSystem>,
}

impl ElementFilter {
    pub fn matches(&self, element: &ElementData) -> bool {
        let icd_ok = self
            .icd_name
            .as_ref()
            .map_or(true, |name| crate::cache::same_text(&element.icd_name, name));
        let system_ok = self.system.map_or(true, |system| element.system == system);
        icd_ok && system_ok
    }
}
