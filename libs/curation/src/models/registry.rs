//! Anchor entities: ICD-11 entries and traditional-medicine terms

use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Traditional-medicine system a NAMASTE term belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TmSystem {
    Ayurveda,
    Siddha,
    Unani,
}

impl TmSystem {
    pub const ALL: [TmSystem; 3] = [TmSystem::Ayurveda, TmSystem::Siddha, TmSystem::Unani];

    pub fn as_str(&self) -> &'static str {
        match self {
            TmSystem::Ayurveda => "ayurveda",
            TmSystem::Siddha => "siddha",
            TmSystem::Unani => "unani",
        }
    }
}

impl fmt::Display for TmSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TmSystem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ayurveda" => Ok(TmSystem::Ayurveda),
            "siddha" => Ok(TmSystem::Siddha),
            "unani" => Ok(TmSystem::Unani),
            other => Err(Error::Validation(format!(
                "unknown traditional medicine system '{other}'"
            ))),
        }
    }
}

/// Coarse curation state of an ICD entry, derived from its mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IcdStatus {
    Orphaned,
    Mapped,
    Pending,
}

impl IcdStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IcdStatus::Orphaned => "orphaned",
            IcdStatus::Mapped => "mapped",
            IcdStatus::Pending => "pending",
        }
    }
}

impl FromStr for IcdStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "orphaned" => Ok(IcdStatus::Orphaned),
            "mapped" => Ok(IcdStatus::Mapped),
            "pending" => Ok(IcdStatus::Pending),
            other => Err(Error::Validation(format!("unknown ICD status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcdEntry {
    pub id: i64,
    pub name: String,
    pub who_code: Option<String>,
    pub description: Option<String>,
    pub tm2_code: Option<String>,
    pub tm2_title: Option<String>,
    pub tm2_definition: Option<String>,
    pub status: IcdStatus,
    pub created_at: DateTime<Utc>,
}

/// Manually curated ICD entry.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewIcd {
    #[validate(length(min = 1, max = 512))]
    pub name: String,
    pub description: Option<String>,
}

/// Fields written back by WHO enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcdEnrichment {
    pub who_code: Option<String>,
    pub description: Option<String>,
    pub tm2_code: Option<String>,
    pub tm2_title: Option<String>,
    pub tm2_definition: Option<String>,
}

impl IcdEnrichment {
    pub fn is_empty(&self) -> bool {
        self.who_code.is_none()
            && self.description.is_none()
            && self.tm2_code.is_none()
            && self.tm2_title.is_none()
            && self.tm2_definition.is_none()
    }

    /// Keep only the fields that differ from what the entry already carries.
    pub fn changes_for(&self, entry: &IcdEntry) -> IcdEnrichment {
        fn changed(new: &Option<String>, old: &Option<String>) -> Option<String> {
            match new {
                Some(v) if !v.trim().is_empty() && Some(v) != old.as_ref() => Some(v.clone()),
                _ => None,
            }
        }

        IcdEnrichment {
            who_code: changed(&self.who_code, &entry.who_code),
            description: changed(&self.description, &entry.description),
            tm2_code: changed(&self.tm2_code, &entry.tm2_code),
            tm2_title: changed(&self.tm2_title, &entry.tm2_title),
            tm2_definition: changed(&self.tm2_definition, &entry.tm2_definition),
        }
    }
}

/// Identity of a traditional term: (system, term text, source code).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TermKey {
    pub system: TmSystem,
    pub term: String,
    pub code: Option<String>,
}

impl TermKey {
    pub fn new(system: TmSystem, term: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            system,
            term: term.into(),
            code: code.map(str::to_string),
        }
    }

    /// Code used for identity comparisons; absent codes compare as empty.
    pub fn code_key(&self) -> &str {
        self.code.as_deref().unwrap_or("")
    }
}

impl fmt::Display for TermKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}:{} ({})", self.system, self.term, code),
            None => write!(f, "{}:{}", self.system, self.term),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraditionalTerm {
    pub id: i64,
    pub system: TmSystem,
    pub term: String,
    pub code: Option<String>,
    pub short_definition: Option<String>,
    pub long_definition: Option<String>,
    /// Devanagari, Tamil or Arabic spelling.
    pub vernacular: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TraditionalTerm {
    pub fn key(&self) -> TermKey {
        TermKey {
            system: self.system,
            term: self.term.clone(),
            code: self.code.clone(),
        }
    }
}

/// Term payload for find-or-create; definitions only back-fill empty fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTerm {
    pub key: TermKey,
    pub short_definition: Option<String>,
    pub long_definition: Option<String>,
    pub vernacular: Option<String>,
}

impl NewTerm {
    pub fn bare(key: TermKey) -> Self {
        Self {
            key,
            short_definition: None,
            long_definition: None,
            vernacular: None,
        }
    }
}
