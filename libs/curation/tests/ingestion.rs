//! Attachment, staging rows, enrichment workers, registry and dashboards

mod support;

use ayusync_curation::{
    models::{
        IcdStatus, InferenceStatus, LifecycleAction, MappingStatus, NewIcd, NewStagingRow,
        TmSystem,
    },
    Error,
};
use support::{constants::*, *};

fn staging_row(term: &str, icd: Option<&str>) -> NewStagingRow {
    NewStagingRow {
        system: TmSystem::Ayurveda,
        source_term: term.to_string(),
        source_code: Some("AY-7".to_string()),
        suggested_icd_name: icd.map(str::to_string),
        icd_code: None,
        short_definition: Some("fever caused by vata".to_string()),
        long_definition: None,
        vernacular: None,
    }
}

#[tokio::test]
async fn first_suggestion_per_system_is_primary() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    let first = suggest(state, FEVER, TmSystem::Ayurveda, "Jvara", None).await?;
    let second = suggest(state, FEVER, TmSystem::Ayurveda, "Santapa", None).await?;
    let other_system = suggest(state, FEVER, TmSystem::Siddha, "Suram", None).await?;
    assert!(first.is_primary);
    assert!(!second.is_primary);
    assert!(other_system.is_primary);
    assert_eq!(first.status, MappingStatus::Suggested);
    assert_eq!(first.ai_confidence, Some(80));

    let forced = state
        .ingestion
        .attach_candidate(
            &CandidateBuilder::new(TmSystem::Ayurveda, "Tapa", FEVER).build(),
            true,
            false,
            CURATOR,
        )
        .await?;
    assert!(forced.is_primary);
    // Forcing does not demote the existing suggestion
    assert_mapping(state, FEVER, TmSystem::Ayurveda, "Jvara", MappingStatus::Suggested, true)
        .await?;

    let history = state.review.audit_history(forced.id).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, LifecycleAction::Promote);
    assert_eq!(history[0].reason.as_deref(), Some("ingestion promote"));

    assert_eq!(state.registry.require_icd(FEVER).await?.status, IcdStatus::Pending);
    assert_eq!(app.verifier.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn attach_rejects_duplicates_and_blank_input() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    suggest(state, FEVER, TmSystem::Unani, "Humma", None).await?;
    assert!(matches!(
        suggest(state, FEVER, TmSystem::Unani, "Humma", None)
            .await
            .map_err(|e| e.downcast::<Error>()),
        Err(Ok(Error::Validation(_)))
    ));

    let blank = CandidateBuilder::new(TmSystem::Unani, "   ", FEVER).build();
    assert!(matches!(
        state
            .ingestion
            .attach_candidate(&blank, false, false, CURATOR)
            .await,
        Err(Error::Validation(_))
    ));

    let out_of_range = CandidateBuilder::new(TmSystem::Unani, "Sual", COUGH)
        .confidence(140)
        .build();
    assert!(matches!(
        state
            .ingestion
            .attach_candidate(&out_of_range, false, false, CURATOR)
            .await,
        Err(Error::Validation(_))
    ));
    assert!(state.store.find_icd(COUGH).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn enrich_runs_verifier_only_without_assessment() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    let candidate = CandidateBuilder::new(TmSystem::Siddha, "Suram", FEVER)
        .code("SI-1")
        .icd_code("MG26")
        .short_definition("rise in body heat")
        .build();
    let mapping = state
        .ingestion
        .attach_candidate(&candidate, false, true, "system")
        .await?;
    assert_eq!(app.verifier.calls(), 1);
    assert_eq!(mapping.ai_confidence, Some(72));
    assert_eq!(
        mapping.ai_justification.as_deref(),
        Some("Suram corresponds to Fever")
    );

    let icd = state.registry.require_icd(FEVER).await?;
    assert_eq!(icd.who_code.as_deref(), Some("MG26"));
    let detail = mapping_of(state, FEVER, TmSystem::Siddha, "Suram").await?;
    assert_eq!(detail.icd_code.as_deref(), Some("MG26"));
    assert_eq!(detail.term.short_definition.as_deref(), Some("rise in body heat"));

    let assessed = CandidateBuilder::new(TmSystem::Siddha, "Kaichal", FEVER)
        .confidence(55)
        .build();
    state
        .ingestion
        .attach_candidate(&assessed, false, true, "system")
        .await?;
    assert_eq!(app.verifier.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn staging_row_promotes_once_with_title_cased_fallback() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    let row = state
        .ingestion
        .stage_row(&staging_row("vataja jvara", None))
        .await?;
    assert!(!row.is_promoted());

    let mapping = state
        .ingestion
        .promote_staging_row(row.id, false, CURATOR)
        .await?;
    assert!(mapping.is_primary);
    assert_eq!(mapping.ai_confidence, None);

    let icd = state.registry.require_icd("Vataja Jvara").await?;
    assert_eq!(icd.id, mapping.icd_id);
    let promoted = state.store.staging_row(row.id).await?;
    assert_eq!(
        promoted.and_then(|r| r.promoted_icd).as_deref(),
        Some("Vataja Jvara")
    );

    assert!(matches!(
        state.ingestion.promote_staging_row(row.id, false, CURATOR).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        state.ingestion.promote_staging_row(9_999, false, CURATOR).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        state.ingestion.stage_row(&staging_row(" ", None)).await,
        Err(Error::Validation(_))
    ));
    Ok(())
}

#[tokio::test]
async fn enrichment_pool_writes_back_and_promotion_keeps_assessment() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    let rows = vec![
        state
            .ingestion
            .stage_row(&staging_row("Vataja Jvara", Some(FEVER)))
            .await?,
        state
            .ingestion
            .stage_row(&staging_row("kasa", None))
            .await?,
    ];

    let pool = state.enrichment_pool();
    assert_eq!(pool.worker_count(), 4);
    for row in &rows {
        pool.submit(row).await?;
    }
    pool.shutdown().await;
    assert_eq!(app.verifier.calls(), 2);

    let first = state
        .store
        .staging_row(rows[0].id)
        .await?
        .expect("first row");
    assert_eq!(first.inference_status, Some(InferenceStatus::Done));
    assert_eq!(first.ai_confidence, Some(72));
    assert_eq!(
        first.ai_justification.as_deref(),
        Some("Vataja Jvara corresponds to Fever")
    );

    let second = state
        .store
        .staging_row(rows[1].id)
        .await?
        .expect("second row");
    assert_eq!(
        second.ai_justification.as_deref(),
        Some("kasa corresponds to Kasa")
    );

    let mapping = state
        .ingestion
        .promote_staging_row(rows[0].id, false, CURATOR)
        .await?;
    assert_eq!(mapping.ai_confidence, Some(72));
    Ok(())
}

#[tokio::test]
async fn failed_enrichment_marks_row_error() -> anyhow::Result<()> {
    let app = TestApp::with_verifier(FakeVerifier::failing());
    let state = &app.state;

    let row = state
        .ingestion
        .stage_row(&staging_row("Jvara", Some(FEVER)))
        .await?;
    let pool = state.enrichment_pool();
    pool.submit(&row).await?;
    pool.shutdown().await;

    let stored = state.store.staging_row(row.id).await?.expect("row");
    assert_eq!(stored.inference_status, Some(InferenceStatus::Error));
    assert_eq!(stored.ai_justification.as_deref(), Some("N/A"));
    assert_eq!(stored.ai_confidence, Some(0));
    Ok(())
}

#[tokio::test]
async fn registry_add_enrich_and_reset() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    let added = state
        .registry
        .add_icd(NewIcd {
            name: "  Fever ".to_string(),
            description: Some(String::new()),
        })
        .await?;
    assert_eq!(added.name, FEVER);
    assert_eq!(added.description, None);
    assert_eq!(added.status, IcdStatus::Orphaned);

    assert!(matches!(
        state
            .registry
            .add_icd(NewIcd {
                name: "FEVER".to_string(),
                description: None,
            })
            .await,
        Err(Error::Validation(_))
    ));

    let enriched = state.registry.enrich_icd(FEVER).await?;
    assert_eq!(enriched.who_code.as_deref(), Some("WHO-5"));
    assert_eq!(enriched.description.as_deref(), Some("Fever (WHO)"));

    state
        .registry
        .add_icd(NewIcd {
            name: "Unknown entity".to_string(),
            description: Some("curated by hand".to_string()),
        })
        .await?;
    let untouched = state.registry.enrich_icd("Unknown entity").await?;
    assert_eq!(untouched.who_code, None);
    assert_eq!(untouched.description.as_deref(), Some("curated by hand"));

    assert!(matches!(
        state.registry.enrich_icd("Missing").await,
        Err(Error::NotFound(_))
    ));

    suggest(state, FEVER, TmSystem::Ayurveda, "Jvara", None).await?;
    let counts = state.registry.full_reset().await?;
    assert_eq!(counts.mappings, 1);
    assert_eq!(counts.terms, 1);
    assert_eq!(counts.icd_entries, 2);
    assert!(state.registry.list_icds().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn dashboards_count_icd_entries() -> anyhow::Result<()> {
    let app = TestApp::new();
    let state = &app.state;

    suggest(state, FEVER, TmSystem::Ayurveda, "Jvara", None).await?;
    suggest(state, FEVER, TmSystem::Siddha, "Suram", None).await?;
    suggest(state, FEVER, TmSystem::Unani, "Humma", None).await?;
    suggest(state, COUGH, TmSystem::Ayurveda, "Kasa", None).await?;
    suggest(state, COUGH, TmSystem::Unani, "Sual", None).await?;
    suggest(state, ABDOMINAL_DISTENSION, TmSystem::Siddha, "Vayu", None).await?;

    let completeness = state.review.completeness().await?;
    assert_eq!(completeness.three_systems, 1);
    assert_eq!(completeness.two_systems, 1);
    assert_eq!(completeness.one_system, 1);

    state
        .lifecycle
        .submit_curation(
            &[DecisionBuilder::new(COUGH)
                .primary(TmSystem::Ayurveda, "Kasa", None)
                .reject(TmSystem::Unani, "Sual", "orphan")
                .build()],
            CURATOR,
        )
        .await?;

    let stats = state.review.stats().await?;
    assert_eq!(stats.review, 2);
    assert_eq!(stats.master_map, 1);
    assert_eq!(stats.verified, 0);
    assert_eq!(stats.rejected, 1);

    let master = state.review.master_map().await?;
    assert_eq!(master.len(), 1);
    assert_eq!(master[0].icd_name, COUGH);
    let ayurveda = &master[0].systems[&TmSystem::Ayurveda];
    assert_eq!(ayurveda.primary.as_ref().map(|t| t.term.as_str()), Some("Kasa"));

    let queue = state.review.review_queue().await?;
    let names: Vec<_> = queue.iter().map(|row| row.icd_name.as_str()).collect();
    assert_eq!(names, vec![ABDOMINAL_DISTENSION, FEVER]);

    assert_eq!(
        state.registry.verified_icd_names().await?,
        Vec::<String>::new()
    );
    state.lifecycle.commit_to_master().await?;
    assert_eq!(state.registry.verified_icd_names().await?, vec![COUGH]);
    Ok(())
}
