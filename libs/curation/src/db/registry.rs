//! ICD entry and traditional term queries

use super::store::{icd_from_row, term_from_row, PostgresCurationStore, ICD_COLUMNS, TERM_COLUMNS};
use super::traits::{PurgeCounts, TermRegistry};
use crate::{
    models::{IcdEnrichment, IcdEntry, IcdStatus, NewTerm, TermKey, TraditionalTerm},
    Error, Result,
};
use async_trait::async_trait;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl TermRegistry for PostgresCurationStore {
    async fn find_icd(&self, name: &str) -> Result<Option<IcdEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {ICD_COLUMNS} FROM icd_entries WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(icd_from_row).transpose()
    }

    async fn find_icd_ignore_case(&self, name: &str) -> Result<Option<IcdEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {ICD_COLUMNS} FROM icd_entries WHERE lower(name) = lower($1)
             ORDER BY (name = $1) DESC, id
             LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(icd_from_row).transpose()
    }

    async fn get_icd(&self, id: i64) -> Result<Option<IcdEntry>> {
        let row = sqlx::query(&format!("SELECT {ICD_COLUMNS} FROM icd_entries WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(icd_from_row).transpose()
    }

    async fn ensure_icd(
        &self,
        name: &str,
        who_code: Option<&str>,
        description: Option<&str>,
    ) -> Result<(IcdEntry, bool)> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO icd_entries (name, who_code, description)
             VALUES ($1, $2, $3)
             ON CONFLICT (name) DO NOTHING
             RETURNING {ICD_COLUMNS}"
        ))
        .bind(name)
        .bind(who_code)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = inserted {
            return Ok((icd_from_row(&row)?, true));
        }

        // Existing entry: only back-fill a missing WHO code
        let row = sqlx::query(&format!(
            "UPDATE icd_entries
             SET who_code = COALESCE(NULLIF(who_code, ''), $2)
             WHERE name = $1
             RETURNING {ICD_COLUMNS}"
        ))
        .bind(name)
        .bind(who_code)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok((icd_from_row(&row)?, false))
    }

    async fn insert_icd(&self, name: &str, description: Option<&str>) -> Result<IcdEntry> {
        let row = sqlx::query(&format!(
            "INSERT INTO icd_entries (name, description, status)
             VALUES ($1, $2, 'orphaned')
             RETURNING {ICD_COLUMNS}"
        ))
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::Validation(format!("ICD entry '{name}' already exists"))
            } else {
                Error::Database(e)
            }
        })?;

        icd_from_row(&row)
    }

    async fn list_icds(&self) -> Result<Vec<IcdEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ICD_COLUMNS} FROM icd_entries ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(icd_from_row).collect()
    }

    async fn update_icd_enrichment(
        &self,
        id: i64,
        enrichment: &IcdEnrichment,
    ) -> Result<IcdEntry> {
        let row = sqlx::query(&format!(
            "UPDATE icd_entries SET
                who_code = COALESCE($2, who_code),
                description = COALESCE($3, description),
                tm2_code = COALESCE($4, tm2_code),
                tm2_title = COALESCE($5, tm2_title),
                tm2_definition = COALESCE($6, tm2_definition)
             WHERE id = $1
             RETURNING {ICD_COLUMNS}"
        ))
        .bind(id)
        .bind(&enrichment.who_code)
        .bind(&enrichment.description)
        .bind(&enrichment.tm2_code)
        .bind(&enrichment.tm2_title)
        .bind(&enrichment.tm2_definition)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => icd_from_row(&row),
            None => Err(Error::NotFound(format!("ICD entry {id}"))),
        }
    }

    async fn set_icd_status(&self, id: i64, status: IcdStatus) -> Result<()> {
        sqlx::query("UPDATE icd_entries SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn find_term(&self, key: &TermKey) -> Result<Option<TraditionalTerm>> {
        let row = sqlx::query(&format!(
            "SELECT {TERM_COLUMNS} FROM traditional_terms
             WHERE system = $1 AND term = $2 AND COALESCE(code, '') = $3"
        ))
        .bind(key.system.as_str())
        .bind(&key.term)
        .bind(key.code_key())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(term_from_row).transpose()
    }

    async fn ensure_term(&self, term: &NewTerm) -> Result<TraditionalTerm> {
        let row = sqlx::query(&format!(
            "INSERT INTO traditional_terms
                (system, term, code, short_definition, long_definition, vernacular)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (system, term, (COALESCE(code, ''))) DO UPDATE SET
                short_definition = COALESCE(NULLIF(traditional_terms.short_definition, ''), EXCLUDED.short_definition),
                long_definition = COALESCE(NULLIF(traditional_terms.long_definition, ''), EXCLUDED.long_definition),
                vernacular = COALESCE(NULLIF(traditional_terms.vernacular, ''), EXCLUDED.vernacular)
             RETURNING {TERM_COLUMNS}"
        ))
        .bind(term.key.system.as_str())
        .bind(&term.key.term)
        .bind(&term.key.code)
        .bind(&term.short_definition)
        .bind(&term.long_definition)
        .bind(&term.vernacular)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        term_from_row(&row)
    }

    async fn purge_registry(&self) -> Result<PurgeCounts> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let mappings = sqlx::query("DELETE FROM mappings")
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();
        let terms = sqlx::query("DELETE FROM traditional_terms")
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();
        let icd_entries = sqlx::query("DELETE FROM icd_entries")
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected();

        tx.commit().await.map_err(Error::Database)?;

        Ok(PurgeCounts {
            mappings,
            terms,
            icd_entries,
        })
    }
}
