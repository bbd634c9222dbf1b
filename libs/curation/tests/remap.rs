//! Remapping of rejected_correction terms

mod support;

use async_trait::async_trait;
use ayusync_curation::{
    db::{InMemoryCurationStore, MappingStore},
    models::{
        AiAssessment, IcdStatus, LifecycleAction, Mapping, MappingChange, MappingStatus,
        MappingUpdate, RemapRequest, TermKey, TmSystem,
    },
    services::{AiVerifier, TermPayload, WhoEnrichment},
    AppState, Config, Error,
};
use std::sync::{Arc, Mutex};
use support::{constants::*, *};

/// Verifier that promotes a pending mapping to staged primary while it is consulted
struct PromotingVerifier {
    store: Arc<InMemoryCurationStore>,
    pending: Mutex<Option<Mapping>>,
}

#[async_trait]
impl AiVerifier for PromotingVerifier {
    async fn verify(
        &self,
        icd_name: &str,
        term: &TermPayload,
    ) -> ayusync_curation::Result<AiAssessment> {
        let pending = self.pending.lock().unwrap().take();
        if let Some(mapping) = pending {
            let mut update = MappingUpdate::from_mapping(&mapping);
            update.status = MappingStatus::Staged;
            update.is_primary = true;
            update.curated = true;
            self.store
                .apply_changes(&[MappingChange::Update(update)])
                .await?;
        }
        Ok(AiAssessment::new(
            format!("{} corresponds to {icd_name}", term.term),
            64,
        ))
    }
}

fn request(term: &str, destination: &str) -> RemapRequest {
    RemapRequest {
        term: TermKey::new(TmSystem::Unani, term, None),
        from_icd: None,
        destination_icd: destination.to_string(),
        is_new_icd: false,
    }
}

/// Suggest `term` under `icd` and reject it as pointing at the wrong entry.
async fn reject_for_correction(state: &AppState, icd: &str, term: &str) -> anyhow::Result<()> {
    suggest(state, icd, TmSystem::Unani, term, None).await?;
    state
        .lifecycle
        .submit_curation(
            &[DecisionBuilder::new(icd)
                .reject(TmSystem::Unani, term, "wrong icd")
                .build()],
            CURATOR,
        )
        .await?;
    assert_mapping(state, icd, TmSystem::Unani, term, MappingStatus::RejectedCorrection, false)
        .await
}

#[tokio::test]
async fn remap_onto_staged_destination_becomes_staged_primary() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    reject_for_correction(state, FEVER, "Humma").await?;
    suggest(state, COUGH, TmSystem::Unani, "Sual", None).await?;
    state
        .lifecycle
        .submit_curation(
            &[DecisionBuilder::new(COUGH)
                .alias(TmSystem::Unani, "Sual", None)
                .build()],
            CURATOR,
        )
        .await?;

    let outcome = state
        .lifecycle
        .remap_rejected_term(&request("Humma", COUGH), CURATOR)
        .await?;
    assert_eq!(outcome.status, MappingStatus::Staged);
    assert!(outcome.is_primary);
    assert!(!outcome.merged);
    assert!(!outcome.created_icd);

    assert_mapping(state, COUGH, TmSystem::Unani, "Humma", MappingStatus::Staged, true).await?;
    assert_single_primary(state).await?;

    let moved = mapping_of(state, COUGH, TmSystem::Unani, "Humma").await?;
    assert_eq!(moved.mapping.ai_confidence, Some(72));
    assert_eq!(app.verifier.calls(), 1);

    let history = state.review.audit_history(outcome.mapping_id).await?;
    let last = history.last().expect("remap audit row");
    assert_eq!(last.action, LifecycleAction::Remap);
    assert_eq!(last.actor.as_deref(), Some(CURATOR));

    assert_eq!(state.registry.require_icd(FEVER).await?.status, IcdStatus::Orphaned);
    assert_eq!(state.registry.require_icd(COUGH).await?.status, IcdStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn remap_respects_existing_staged_primary() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    reject_for_correction(state, FEVER, "Humma").await?;
    suggest(state, COUGH, TmSystem::Unani, "Sual", None).await?;
    state
        .lifecycle
        .submit_curation(
            &[DecisionBuilder::new(COUGH)
                .primary(TmSystem::Unani, "Sual", None)
                .build()],
            CURATOR,
        )
        .await?;

    let outcome = state
        .lifecycle
        .remap_rejected_term(&request("Humma", COUGH), CURATOR)
        .await?;
    assert_eq!(outcome.status, MappingStatus::Staged);
    assert!(!outcome.is_primary);
    assert_single_primary(state).await
}

#[tokio::test]
async fn remap_without_staged_destination_becomes_suggestion() -> anyhow::Result<()> {
    let app = TestApp::with_verifier(FakeVerifier::failing());
    let state = &app.state;

    reject_for_correction(state, FEVER, "Humma").await?;
    suggest(state, COUGH, TmSystem::Unani, "Sual", None).await?;

    let outcome = state
        .lifecycle
        .remap_rejected_term(&request("Humma", COUGH), CURATOR)
        .await?;
    assert_eq!(outcome.status, MappingStatus::Suggested);
    assert!(!outcome.is_primary);

    let moved = mapping_of(state, COUGH, TmSystem::Unani, "Humma").await?;
    assert_eq!(moved.mapping.ai_justification.as_deref(), Some("N/A"));
    assert_eq!(moved.mapping.ai_confidence, Some(0));
    Ok(())
}

#[tokio::test]
async fn remap_creates_new_icd_only_when_asked() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    reject_for_correction(state, FEVER, "Humma").await?;

    assert!(matches!(
        state
            .lifecycle
            .remap_rejected_term(&request("Humma", "Intermittent fever"), CURATOR)
            .await,
        Err(Error::NotFound(_))
    ));
    assert!(state.store.find_icd("Intermittent fever").await?.is_none());

    let mut create = request("Humma", "Intermittent fever");
    create.is_new_icd = true;
    let outcome = state.lifecycle.remap_rejected_term(&create, CURATOR).await?;
    assert!(outcome.created_icd);
    assert_eq!(outcome.status, MappingStatus::Suggested);

    let created = state.registry.require_icd("Intermittent fever").await?;
    assert_eq!(
        created.description.as_deref(),
        Some("Newly added during re-mapping.")
    );
    assert_eq!(created.status, IcdStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn remap_merges_onto_existing_edge() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    suggest(state, COUGH, TmSystem::Unani, "Humma", None).await?;
    reject_for_correction(state, FEVER, "Humma").await?;
    let existing = mapping_of(state, COUGH, TmSystem::Unani, "Humma").await?;
    let rejected = mapping_of(state, FEVER, TmSystem::Unani, "Humma").await?;

    let outcome = state
        .lifecycle
        .remap_rejected_term(&request("Humma", COUGH), CURATOR)
        .await?;
    assert!(outcome.merged);
    assert_eq!(outcome.mapping_id, existing.mapping.id);
    assert!(state.store.get_mapping(rejected.mapping.id).await?.is_none());

    let fever = state.registry.require_icd(FEVER).await?;
    assert!(state.store.mappings_for_icd(fever.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn ambiguous_origin_needs_from_icd() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    reject_for_correction(state, FEVER, "Humma").await?;
    reject_for_correction(state, "Rash", "Humma").await?;
    suggest(state, COUGH, TmSystem::Unani, "Sual", None).await?;

    assert!(matches!(
        state
            .lifecycle
            .remap_rejected_term(&request("Humma", COUGH), CURATOR)
            .await,
        Err(Error::Validation(_))
    ));

    let mut pinned = request("Humma", COUGH);
    pinned.from_icd = Some("Rash".to_string());
    state.lifecycle.remap_rejected_term(&pinned, CURATOR).await?;

    assert_mapping(state, FEVER, TmSystem::Unani, "Humma", MappingStatus::RejectedCorrection, false)
        .await?;
    assert_mapping(state, COUGH, TmSystem::Unani, "Humma", MappingStatus::Suggested, false).await
}

#[tokio::test]
async fn only_correction_rejections_can_be_remapped() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    suggest(state, FEVER, TmSystem::Unani, "Humma", None).await?;
    suggest(state, COUGH, TmSystem::Unani, "Sual", None).await?;

    assert!(matches!(
        state
            .lifecycle
            .remap_rejected_term(&request("Humma", COUGH), CURATOR)
            .await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        state
            .lifecycle
            .remap_rejected_term(&request("Unseen", COUGH), CURATOR)
            .await,
        Err(Error::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn remap_sees_primary_staged_during_verification() -> anyhow::Result<()> {
    init_tracing();
    let store = Arc::new(InMemoryCurationStore::new());
    let verifier = Arc::new(PromotingVerifier {
        store: store.clone(),
        pending: Mutex::new(None),
    });
    let state = AppState::with_collaborators(
        Config::default(),
        store.clone(),
        verifier.clone() as Arc<dyn AiVerifier>,
        Arc::new(FakeWho::default()) as Arc<dyn WhoEnrichment>,
    );

    reject_for_correction(&state, FEVER, "Humma").await?;
    suggest(&state, COUGH, TmSystem::Unani, "Sual", None).await?;
    state
        .lifecycle
        .submit_curation(
            &[DecisionBuilder::new(COUGH)
                .alias(TmSystem::Unani, "Sual", None)
                .build()],
            CURATOR,
        )
        .await?;
    let sual = mapping_of(&state, COUGH, TmSystem::Unani, "Sual").await?;
    assert!(!sual.mapping.is_primary);
    *verifier.pending.lock().unwrap() = Some(sual.mapping);

    let outcome = state
        .lifecycle
        .remap_rejected_term(&request("Humma", COUGH), CURATOR)
        .await?;
    assert_eq!(outcome.status, MappingStatus::Staged);
    assert!(!outcome.is_primary);

    assert_mapping(&state, COUGH, TmSystem::Unani, "Sual", MappingStatus::Staged, true).await?;
    assert_mapping(&state, COUGH, TmSystem::Unani, "Humma", MappingStatus::Staged, false).await?;
    assert_single_primary(&state).await
}
