//! Mapping edge queries and atomic write sets

use super::store::{
    mapping_detail_from_row, mapping_from_row, PostgresCurationStore, MAPPING_COLUMNS,
    MAPPING_DETAIL_ORDER, MAPPING_DETAIL_SELECT,
};
use super::traits::MappingStore;
use crate::{
    models::{Mapping, MappingChange, MappingDetail, MappingStatus, MappingUpdate, NewMapping},
    Error, Result,
};
use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

fn status_list(statuses: &[MappingStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

impl PostgresCurationStore {
    async fn apply_update(
        tx: &mut Transaction<'_, Postgres>,
        update: &MappingUpdate,
    ) -> Result<()> {
        let (justification, confidence) = match &update.assessment {
            Some(a) => (Some(a.justification.as_str()), Some(a.confidence)),
            None => (None, None),
        };

        let result = sqlx::query(
            "UPDATE mappings SET
                icd_id = $2,
                status = $3,
                is_primary = $4,
                ai_justification = COALESCE($5, ai_justification),
                ai_confidence = COALESCE($6, ai_confidence),
                curated_at = CASE WHEN $7 THEN clock_timestamp() ELSE curated_at END
             WHERE id = $1",
        )
        .bind(update.id)
        .bind(update.icd_id)
        .bind(update.status.as_str())
        .bind(update.is_primary)
        .bind(justification)
        .bind(confidence)
        .bind(update.curated)
        .execute(&mut **tx)
        .await
        .map_err(Error::from_storage)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("mapping {}", update.id)));
        }
        Ok(())
    }

    async fn apply_delete(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM mappings WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(Error::from_storage)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("mapping {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl MappingStore for PostgresCurationStore {
    async fn get_mapping(&self, id: i64) -> Result<Option<Mapping>> {
        let row = sqlx::query(&format!("SELECT {MAPPING_COLUMNS} FROM mappings WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(mapping_from_row).transpose()
    }

    async fn find_mapping(&self, icd_id: i64, term_id: i64) -> Result<Option<Mapping>> {
        let row = sqlx::query(&format!(
            "SELECT {MAPPING_COLUMNS} FROM mappings WHERE icd_id = $1 AND term_id = $2"
        ))
        .bind(icd_id)
        .bind(term_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(mapping_from_row).transpose()
    }

    async fn mappings_for_icd(&self, icd_id: i64) -> Result<Vec<MappingDetail>> {
        let rows = sqlx::query(&format!(
            "{MAPPING_DETAIL_SELECT} WHERE m.icd_id = $1 {MAPPING_DETAIL_ORDER}"
        ))
        .bind(icd_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(mapping_detail_from_row).collect()
    }

    async fn mappings_for_term(&self, term_id: i64) -> Result<Vec<MappingDetail>> {
        let rows = sqlx::query(&format!(
            "{MAPPING_DETAIL_SELECT} WHERE m.term_id = $1 {MAPPING_DETAIL_ORDER}"
        ))
        .bind(term_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(mapping_detail_from_row).collect()
    }

    async fn mappings_with_status(
        &self,
        statuses: &[MappingStatus],
    ) -> Result<Vec<MappingDetail>> {
        let rows = sqlx::query(&format!(
            "{MAPPING_DETAIL_SELECT} WHERE m.status = ANY($1) {MAPPING_DETAIL_ORDER}"
        ))
        .bind(status_list(statuses))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(mapping_detail_from_row).collect()
    }

    async fn insert_mapping(&self, mapping: &NewMapping) -> Result<Mapping> {
        let row = sqlx::query(&format!(
            "INSERT INTO mappings
                (icd_id, term_id, system, status, is_primary, ai_justification, ai_confidence)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {MAPPING_COLUMNS}"
        ))
        .bind(mapping.icd_id)
        .bind(mapping.term_id)
        .bind(mapping.system.as_str())
        .bind(mapping.status.as_str())
        .bind(mapping.is_primary)
        .bind(mapping.assessment.as_ref().map(|a| a.justification.as_str()))
        .bind(mapping.assessment.as_ref().map(|a| a.confidence))
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from_storage)?;

        mapping_from_row(&row)
    }

    async fn apply_changes(&self, changes: &[MappingChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for change in changes {
            match change {
                MappingChange::Update(update) => Self::apply_update(&mut tx, update).await?,
                MappingChange::Delete(id) => Self::apply_delete(&mut tx, *id).await?,
            }
        }

        tx.commit().await.map_err(Error::from_storage)?;
        Ok(())
    }

    async fn transition_status(
        &self,
        icd_id: Option<i64>,
        from: &[MappingStatus],
        to: MappingStatus,
        clear_primary: bool,
    ) -> Result<Vec<Mapping>> {
        let rows = sqlx::query(&format!(
            "UPDATE mappings SET
                status = $1,
                is_primary = CASE WHEN $2 THEN FALSE ELSE is_primary END,
                curated_at = clock_timestamp()
             WHERE status = ANY($3) AND ($4::BIGINT IS NULL OR icd_id = $4)
             RETURNING {MAPPING_COLUMNS}"
        ))
        .bind(to.as_str())
        .bind(clear_primary)
        .bind(status_list(from))
        .bind(icd_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from_storage)?;

        rows.iter().map(mapping_from_row).collect()
    }
}
