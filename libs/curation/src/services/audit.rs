//! Audit trail writer
//!
//! Appends one row per recorded lifecycle action. Rows are never updated.
//! Failures to write are logged and swallowed so auditing never blocks curation.

use crate::{
    db::CurationStore,
    models::{LifecycleAction, MappingAudit, NewAudit},
    Result,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn CurationStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn CurationStore>) -> Self {
        Self { store }
    }

    /// Append one audit row.
    pub async fn record(
        &self,
        mapping_id: i64,
        action: LifecycleAction,
        actor: Option<&str>,
        reason: Option<&str>,
    ) {
        let entry = NewAudit {
            mapping_id,
            action,
            actor: actor.map(str::to_string),
            reason: reason.map(str::to_string),
        };

        if let Err(e) = self.store.append_audit(&entry).await {
            tracing::warn!(
                mapping_id,
                action = %action,
                error = %e,
                "Failed to write audit entry"
            );
        }
    }

    /// Audit rows of one mapping, oldest first.
    pub async fn history(&self, mapping_id: i64) -> Result<Vec<MappingAudit>> {
        self.store.audit_for_mapping(mapping_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryCurationStore;

    #[tokio::test]
    async fn history_keeps_insertion_order() {
        let store: Arc<dyn CurationStore> = Arc::new(InMemoryCurationStore::new());
        let audit = AuditService::new(store);

        audit
            .record(7, LifecycleAction::Promote, Some("system"), Some("ingestion promote"))
            .await;
        audit
            .record(7, LifecycleAction::Verify, Some("dr.rao"), None)
            .await;
        audit.record(8, LifecycleAction::Reject, None, None).await;

        let history = audit.history(7).await.unwrap();
        let actions: Vec<_> = history.iter().map(|a| a.action).collect();
        assert_eq!(
            actions,
            vec![LifecycleAction::Promote, LifecycleAction::Verify]
        );
        assert_eq!(history[0].reason.as_deref(), Some("ingestion promote"));
    }
}
