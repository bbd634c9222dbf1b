use super::store::PostgresCurationStore;
use super::traits::AuditLog;
use crate::{
    models::{MappingAudit, NewAudit},
    Error, Result,
};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, Row};

fn audit_from_row(row: &PgRow) -> Result<MappingAudit> {
    let action: String = row.get("action");
    Ok(MappingAudit {
        id: row.get("id"),
        mapping_id: row.get("mapping_id"),
        action: action.parse()?,
        actor: row.get("actor"),
        reason: row.get("reason"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl AuditLog for PostgresCurationStore {
    async fn append_audit(&self, entry: &NewAudit) -> Result<MappingAudit> {
        let row = sqlx::query(
            "INSERT INTO mapping_audit (mapping_id, action, actor, reason)
             VALUES ($1, $2, $3, $4)
             RETURNING id, mapping_id, action, actor, reason, created_at",
        )
        .bind(entry.mapping_id)
        .bind(entry.action.as_str())
        .bind(&entry.actor)
        .bind(&entry.reason)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        audit_from_row(&row)
    }

    async fn audit_for_mapping(&self, mapping_id: i64) -> Result<Vec<MappingAudit>> {
        let rows = sqlx::query(
            "SELECT id, mapping_id, action, actor, reason, created_at
             FROM mapping_audit
             WHERE mapping_id = $1
             ORDER BY id",
        )
        .bind(mapping_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(audit_from_row).collect()
    }
}
