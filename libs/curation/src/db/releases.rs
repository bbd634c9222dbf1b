//! ConceptMap release and element queries

use super::store::{
    element_from_row, release_from_row, PostgresCurationStore, ELEMENT_COLUMNS, RELEASE_COLUMNS,
};
use super::traits::ReleaseStore;
use crate::{
    models::{ConceptMapElement, ConceptMapRelease, ElementData, ReleaseSummary},
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

#[async_trait]
impl ReleaseStore for PostgresCurationStore {
    async fn find_release(&self, version: &str) -> Result<Option<ConceptMapRelease>> {
        let row = sqlx::query(&format!(
            "SELECT {RELEASE_COLUMNS} FROM concept_map_releases WHERE version = $1"
        ))
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(release_from_row).transpose()
    }

    async fn ensure_release(
        &self,
        name: &str,
        version: &str,
        notes: Option<&str>,
    ) -> Result<(ConceptMapRelease, bool)> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO concept_map_releases (name, version, notes)
             VALUES ($1, $2, $3)
             ON CONFLICT (version) DO NOTHING
             RETURNING {RELEASE_COLUMNS}"
        ))
        .bind(name)
        .bind(version)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = inserted {
            return Ok((release_from_row(&row)?, true));
        }

        match self.find_release(version).await? {
            Some(release) => Ok((release, false)),
            None => Err(Error::Internal(format!(
                "release '{version}' vanished during find-or-create"
            ))),
        }
    }

    async fn latest_release(&self) -> Result<Option<ConceptMapRelease>> {
        let row = sqlx::query(&format!(
            "SELECT {RELEASE_COLUMNS} FROM concept_map_releases
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(release_from_row).transpose()
    }

    async fn previous_release(&self, before: DateTime<Utc>) -> Result<Option<ConceptMapRelease>> {
        let row = sqlx::query(&format!(
            "SELECT {RELEASE_COLUMNS} FROM concept_map_releases
             WHERE created_at < $1
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(before)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(release_from_row).transpose()
    }

    async fn list_releases(&self) -> Result<Vec<ReleaseSummary>> {
        let rows = sqlx::query(
            "SELECT r.id, r.name, r.version, r.notes, r.created_at, r.published_at,
                    COUNT(e.id) AS element_count
             FROM concept_map_releases r
             LEFT JOIN concept_map_elements e ON e.release_id = r.id
             GROUP BY r.id
             ORDER BY r.created_at DESC, r.id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                let count: i64 = row.get("element_count");
                Ok(ReleaseSummary {
                    release: release_from_row(row)?,
                    element_count: count.max(0) as u64,
                })
            })
            .collect()
    }

    async fn replace_elements(&self, release_id: i64, elements: &[ElementData]) -> Result<u64> {
        let mut icd_names = Vec::with_capacity(elements.len());
        let mut icd_codes = Vec::with_capacity(elements.len());
        let mut systems = Vec::with_capacity(elements.len());
        let mut terms = Vec::with_capacity(elements.len());
        let mut term_codes = Vec::with_capacity(elements.len());
        let mut equivalences = Vec::with_capacity(elements.len());
        let mut primaries = Vec::with_capacity(elements.len());
        let mut actives = Vec::with_capacity(elements.len());

        for element in elements {
            icd_names.push(element.icd_name.clone());
            icd_codes.push(element.icd_code.clone());
            systems.push(element.system.as_str().to_string());
            terms.push(element.term.clone());
            term_codes.push(element.term_code.clone());
            equivalences.push(element.equivalence.as_str().to_string());
            primaries.push(element.is_primary);
            actives.push(element.active);
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM concept_map_elements WHERE release_id = $1")
            .bind(release_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let inserted = sqlx::query(
            "INSERT INTO concept_map_elements
                (release_id, icd_name, icd_code, system, term, term_code, equivalence, is_primary, active)
             SELECT $1, t.icd_name, t.icd_code, t.system, t.term, t.term_code, t.equivalence, t.is_primary, t.active
             FROM UNNEST($2::text[], $3::text[], $4::text[], $5::text[], $6::text[], $7::text[], $8::bool[], $9::bool[])
                AS t(icd_name, icd_code, system, term, term_code, equivalence, is_primary, active)",
        )
        .bind(release_id)
        .bind(&icd_names)
        .bind(&icd_codes)
        .bind(&systems)
        .bind(&terms)
        .bind(&term_codes)
        .bind(&equivalences)
        .bind(&primaries)
        .bind(&actives)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        tx.commit().await.map_err(Error::Database)?;

        Ok(inserted)
    }

    async fn release_elements(&self, release_id: i64) -> Result<Vec<ConceptMapElement>> {
        let rows = sqlx::query(&format!(
            "SELECT {ELEMENT_COLUMNS} FROM concept_map_elements
             WHERE release_id = $1
             ORDER BY icd_name, system, term, id"
        ))
        .bind(release_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(element_from_row).collect()
    }

    async fn mark_published(
        &self,
        release_id: i64,
        at: DateTime<Utc>,
    ) -> Result<ConceptMapRelease> {
        let row = sqlx::query(&format!(
            "UPDATE concept_map_releases SET published_at = $2
             WHERE id = $1
             RETURNING {RELEASE_COLUMNS}"
        ))
        .bind(release_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => release_from_row(&row),
            None => Err(Error::NotFound(format!("release {release_id}"))),
        }
    }
}
