use super::builders::CandidateBuilder;
use async_trait::async_trait;
use ayusync_curation::{
    models::{AiAssessment, IcdEnrichment, Mapping, TmSystem},
    services::{AiVerifier, TermPayload, WhoEnrichment},
    AppState, Error, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Common test constants
pub mod constants {
    pub const CURATOR: &str = "dr.sharma";
    pub const ABDOMINAL_DISTENSION: &str = "Abdominal distension";
    pub const FEVER: &str = "Fever";
    pub const COUGH: &str = "Cough";
}

/// Verifier with a fixed confidence that counts its calls
pub struct FakeVerifier {
    confidence: i64,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeVerifier {
    pub fn new(confidence: i64) -> Self {
        Self {
            confidence,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            confidence: 0,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiVerifier for FakeVerifier {
    async fn verify(&self, icd_name: &str, term: &TermPayload) -> Result<AiAssessment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::ExternalService("verifier offline".to_string()));
        }
        Ok(AiAssessment::new(
            format!("{} corresponds to {icd_name}", term.term),
            self.confidence,
        ))
    }
}

/// WHO lookup answering from the ICD name
#[derive(Default)]
pub struct FakeWho;

#[async_trait]
impl WhoEnrichment for FakeWho {
    async fn enrich(&self, icd_name: &str) -> Result<IcdEnrichment> {
        if icd_name.starts_with("Unknown") {
            return Err(Error::ExternalService("no WHO entity".to_string()));
        }
        Ok(IcdEnrichment {
            who_code: Some(format!("WHO-{}", icd_name.len())),
            description: Some(format!("{icd_name} (WHO)")),
            ..Default::default()
        })
    }
}

/// Attach one suggestion for `term` under `icd`
pub async fn suggest(
    state: &AppState,
    icd: &str,
    system: TmSystem,
    term: &str,
    code: Option<&str>,
) -> anyhow::Result<Mapping> {
    let mut builder = CandidateBuilder::new(system, term, icd).confidence(80);
    if let Some(code) = code {
        builder = builder.code(code);
    }
    let mapping = state
        .ingestion
        .attach_candidate(&builder.build(), false, false, "system")
        .await?;
    Ok(mapping)
}
