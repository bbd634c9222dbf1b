use ayusync_curation::models::{
    Candidate, CurationDecision, RejectedSuggestion, RejectionReason, SystemDecision, TermRef,
    TmSystem,
};
use std::collections::BTreeMap;

/// Builder for ingestion candidates
pub struct CandidateBuilder {
    candidate: Candidate,
}

impl CandidateBuilder {
    pub fn new(system: TmSystem, term: &str, icd_name: &str) -> Self {
        Self {
            candidate: Candidate {
                system,
                term: term.to_string(),
                code: None,
                icd_name: icd_name.to_string(),
                icd_code: None,
                short_definition: None,
                long_definition: None,
                vernacular: None,
                confidence: None,
                justification: None,
            },
        }
    }

    pub fn code(mut self, code: &str) -> Self {
        self.candidate.code = Some(code.to_string());
        self
    }

    pub fn icd_code(mut self, code: &str) -> Self {
        self.candidate.icd_code = Some(code.to_string());
        self
    }

    pub fn short_definition(mut self, text: &str) -> Self {
        self.candidate.short_definition = Some(text.to_string());
        self
    }

    pub fn confidence(mut self, confidence: i64) -> Self {
        self.candidate.confidence = Some(confidence);
        self.candidate.justification = Some("ingestion model".to_string());
        self
    }

    pub fn build(self) -> Candidate {
        self.candidate
    }
}

/// Builder for one ICD group of a curation batch
pub struct DecisionBuilder {
    icd_name: String,
    systems: BTreeMap<TmSystem, SystemDecision>,
}

impl DecisionBuilder {
    pub fn new(icd_name: &str) -> Self {
        Self {
            icd_name: icd_name.to_string(),
            systems: BTreeMap::new(),
        }
    }

    fn system(&mut self, system: TmSystem) -> &mut SystemDecision {
        self.systems.entry(system).or_default()
    }

    pub fn primary(mut self, system: TmSystem, term: &str, code: Option<&str>) -> Self {
        self.system(system).primary = Some(TermRef::new(term, code));
        self
    }

    pub fn alias(mut self, system: TmSystem, term: &str, code: Option<&str>) -> Self {
        self.system(system).aliases.push(TermRef::new(term, code));
        self
    }

    pub fn reject(mut self, system: TmSystem, term: &str, reason: &str) -> Self {
        self.system(system).rejected.push(RejectedSuggestion {
            term: TermRef::new(term, None),
            reason: RejectionReason::from(reason.to_string()),
        });
        self
    }

    pub fn build(self) -> CurationDecision {
        CurationDecision {
            icd_name: self.icd_name,
            systems: self.systems,
        }
    }
}
