//! PostgreSQL implementation of the curation storage traits
//!
//! The trait impls live next to each concern (`registry.rs`, `mappings.rs`,
//! `audit.rs`, `releases.rs`, `staging.rs`); this module holds the shared
//! struct and row decoding.

use crate::{
    models::{
        ConceptMapElement, ConceptMapRelease, ElementData, IcdEntry, Mapping, MappingDetail,
        StagingRow, TraditionalTerm,
    },
    Error, Result,
};
use sqlx::{postgres::PgRow, PgPool, Row};

pub(crate) const ICD_COLUMNS: &str = "id, name, who_code, description, tm2_code, tm2_title, \
     tm2_definition, status, created_at";

pub(crate) const TERM_COLUMNS: &str =
    "id, system, term, code, short_definition, long_definition, vernacular, created_at";

pub(crate) const MAPPING_COLUMNS: &str = "id, icd_id, term_id, system, status, is_primary, \
     ai_confidence, ai_justification, curated_at, created_at";

/// Mapping joined with its ICD entry (`i`) and term (`t`).
pub(crate) const MAPPING_DETAIL_SELECT: &str = "SELECT m.id, m.icd_id, m.term_id, m.system, \
     m.status, m.is_primary, m.ai_confidence, m.ai_justification, m.curated_at, m.created_at, \
     i.name AS icd_name, i.who_code AS icd_code, \
     t.term AS t_term, t.code AS t_code, t.short_definition AS t_short_definition, \
     t.long_definition AS t_long_definition, t.vernacular AS t_vernacular, \
     t.created_at AS t_created_at \
     FROM mappings m \
     JOIN icd_entries i ON i.id = m.icd_id \
     JOIN traditional_terms t ON t.id = m.term_id";

pub(crate) const MAPPING_DETAIL_ORDER: &str = "ORDER BY i.name, m.system, m.id";

pub(crate) const RELEASE_COLUMNS: &str = "id, name, version, notes, created_at, published_at";

pub(crate) const ELEMENT_COLUMNS: &str = "id, release_id, icd_name, icd_code, system, term, \
     term_code, equivalence, is_primary, active";

pub(crate) const STAGING_COLUMNS: &str = "id, system, source_term, source_code, \
     suggested_icd_name, icd_code, short_definition, long_definition, vernacular, \
     ai_confidence, ai_justification, inference_status, promoted_icd, created_at";

/// PostgreSQL-backed curation store
#[derive(Clone)]
pub struct PostgresCurationStore {
    pub(crate) pool: PgPool,
}

impl PostgresCurationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn text<T: std::str::FromStr<Err = Error>>(row: &PgRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column).map_err(Error::Database)?;
    raw.parse()
}

pub(crate) fn icd_from_row(row: &PgRow) -> Result<IcdEntry> {
    Ok(IcdEntry {
        id: row.get("id"),
        name: row.get("name"),
        who_code: row.get("who_code"),
        description: row.get("description"),
        tm2_code: row.get("tm2_code"),
        tm2_title: row.get("tm2_title"),
        tm2_definition: row.get("tm2_definition"),
        status: text(row, "status")?,
        created_at: row.get("created_at"),
    })
}

pub(crate) fn term_from_row(row: &PgRow) -> Result<TraditionalTerm> {
    Ok(TraditionalTerm {
        id: row.get("id"),
        system: text(row, "system")?,
        term: row.get("term"),
        code: row.get("code"),
        short_definition: row.get("short_definition"),
        long_definition: row.get("long_definition"),
        vernacular: row.get("vernacular"),
        created_at: row.get("created_at"),
    })
}

pub(crate) fn mapping_from_row(row: &PgRow) -> Result<Mapping> {
    Ok(Mapping {
        id: row.get("id"),
        icd_id: row.get("icd_id"),
        term_id: row.get("term_id"),
        system: text(row, "system")?,
        status: text(row, "status")?,
        is_primary: row.get("is_primary"),
        ai_confidence: row.get("ai_confidence"),
        ai_justification: row.get("ai_justification"),
        curated_at: row.get("curated_at"),
        created_at: row.get("created_at"),
    })
}

pub(crate) fn mapping_detail_from_row(row: &PgRow) -> Result<MappingDetail> {
    let mapping = mapping_from_row(row)?;
    let term = TraditionalTerm {
        id: mapping.term_id,
        system: mapping.system,
        term: row.get("t_term"),
        code: row.get("t_code"),
        short_definition: row.get("t_short_definition"),
        long_definition: row.get("t_long_definition"),
        vernacular: row.get("t_vernacular"),
        created_at: row.get("t_created_at"),
    };

    Ok(MappingDetail {
        icd_name: row.get("icd_name"),
        icd_code: row.get("icd_code"),
        mapping,
        term,
    })
}

pub(crate) fn release_from_row(row: &PgRow) -> Result<ConceptMapRelease> {
    Ok(ConceptMapRelease {
        id: row.get("id"),
        name: row.get("name"),
        version: row.get("version"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        published_at: row.get("published_at"),
    })
}

pub(crate) fn element_from_row(row: &PgRow) -> Result<ConceptMapElement> {
    Ok(ConceptMapElement {
        id: row.get("id"),
        release_id: row.get("release_id"),
        data: ElementData {
            icd_name: row.get("icd_name"),
            icd_code: row.get("icd_code"),
            system: text(row, "system")?,
            term: row.get("term"),
            term_code: row.get("term_code"),
            equivalence: text(row, "equivalence")?,
            is_primary: row.get("is_primary"),
            active: row.get("active"),
        },
    })
}

pub(crate) fn staging_from_row(row: &PgRow) -> Result<StagingRow> {
    let inference_status: Option<String> = row.get("inference_status");
    Ok(StagingRow {
        id: row.get("id"),
        system: text(row, "system")?,
        source_term: row.get("source_term"),
        source_code: row.get("source_code"),
        suggested_icd_name: row.get("suggested_icd_name"),
        icd_code: row.get("icd_code"),
        short_definition: row.get("short_definition"),
        long_definition: row.get("long_definition"),
        vernacular: row.get("vernacular"),
        ai_confidence: row.get("ai_confidence"),
        ai_justification: row.get("ai_justification"),
        inference_status: inference_status.map(|s| s.parse()).transpose()?,
        promoted_icd: row.get("promoted_icd"),
        created_at: row.get("created_at"),
    })
}
