//! Domain models shared by the stores and services

pub mod audit;
pub mod curation;
pub mod mapping;
pub mod registry;
pub mod release;
pub mod staging;

pub use audit::{LifecycleAction, MappingAudit, NewAudit};
pub use curation::{
    Candidate, Completeness, CurationDecision, CurationReport, CurationStats, MasterMapRow,
    MasterRowStatus, RejectedMapping, RejectedQueues, RejectedSuggestion, RejectionReason,
    RemapOutcome, RemapRequest, ReviewRow, SkippedItem, SystemDecision, SystemMapping, TermRef,
    TermSummary,
};
pub use mapping::{
    AiAssessment, Mapping, MappingChange, MappingDetail, MappingStatus, MappingUpdate, NewMapping,
};
pub use registry::{
    IcdEnrichment, IcdEntry, IcdStatus, NewIcd, NewTerm, TermKey, TmSystem, TraditionalTerm,
};
pub use release::{
    ConceptMapElement, ConceptMapRelease, DiffSummary, ElementChange, ElementData, ElementFilter,
    ElementKey, Equivalence, ReleaseDiff, ReleaseSummary,
};
pub use staging::{InferenceStatus, InferenceUpdate, NewStagingRow, StagingRow};
