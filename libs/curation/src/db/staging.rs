use super::store::{staging_from_row, PostgresCurationStore, STAGING_COLUMNS};
use super::traits::StagingStore;
use crate::{
    models::{InferenceUpdate, NewStagingRow, StagingRow},
    Error, Result,
};
use async_trait::async_trait;

#[async_trait]
impl StagingStore for PostgresCurationStore {
    async fn insert_staging_row(&self, row: &NewStagingRow) -> Result<StagingRow> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO ingestion_rows
                (system, source_term, source_code, suggested_icd_name, icd_code,
                 short_definition, long_definition, vernacular)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {STAGING_COLUMNS}"
        ))
        .bind(row.system.as_str())
        .bind(&row.source_term)
        .bind(&row.source_code)
        .bind(&row.suggested_icd_name)
        .bind(&row.icd_code)
        .bind(&row.short_definition)
        .bind(&row.long_definition)
        .bind(&row.vernacular)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        staging_from_row(&inserted)
    }

    async fn staging_row(&self, id: i64) -> Result<Option<StagingRow>> {
        let row = sqlx::query(&format!(
            "SELECT {STAGING_COLUMNS} FROM ingestion_rows WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(staging_from_row).transpose()
    }

    async fn record_inference(&self, id: i64, update: &InferenceUpdate) -> Result<()> {
        let result = sqlx::query(
            "UPDATE ingestion_rows SET
                inference_status = $2,
                ai_justification = COALESCE($3, ai_justification),
                ai_confidence = COALESCE($4, ai_confidence)
             WHERE id = $1",
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(update.assessment.as_ref().map(|a| a.justification.as_str()))
        .bind(update.assessment.as_ref().map(|a| a.confidence))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("staging row {id}")));
        }
        Ok(())
    }

    async fn mark_promoted(&self, id: i64, icd_name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE ingestion_rows SET promoted_icd = $2 WHERE id = $1")
            .bind(id)
            .bind(icd_name)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("staging row {id}")));
        }
        Ok(())
    }
}
