//! Error types for the curation engine

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Name of the partial unique index guarding one primary per (ICD, system).
pub const SINGLE_PRIMARY_CONSTRAINT: &str = "mappings_single_primary";

/// Name of the unique key on (ICD, term) edges.
pub const UNIQUE_EDGE_CONSTRAINT: &str = "mappings_icd_term_unique";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Primary exclusivity at risk: {0}")]
    InvariantRisk(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Nothing eligible: {0}")]
    EmptySet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::Validation(errors.to_string())
    }
}

impl Error {
    /// Translate a storage error, lifting constraint violations into domain errors.
    pub fn from_storage(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match db.constraint() {
                Some(SINGLE_PRIMARY_CONSTRAINT) => {
                    return Error::InvariantRisk(
                        "another primary already exists for this ICD and system".to_string(),
                    );
                }
                Some(UNIQUE_EDGE_CONSTRAINT) => {
                    return Error::Validation(
                        "a mapping already links this ICD entry and term".to_string(),
                    );
                }
                _ => {}
            }
        }
        Error::Database(err)
    }

    /// Short machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not-found",
            Error::Validation(_) => "invalid",
            Error::InvariantRisk(_) => "conflict",
            Error::ExternalService(_) => "transient",
            Error::EmptySet(_) => "empty",
            Error::Config(_) => "config",
            Error::Database(_)
            | Error::Migration(_)
            | Error::Internal(_)
            | Error::Other(_) => "exception",
        }
    }

    /// Build the structured result handed back to callers.
    ///
    /// Internal failures are logged and replaced by a generic message.
    pub fn outcome(&self) -> Outcome {
        let message = match self {
            Error::Database(_) | Error::Migration(_) | Error::Internal(_) | Error::Other(_) => {
                tracing::error!("Internal error: {}", self);
                "Internal error".to_string()
            }
            _ => self.to_string(),
        };

        Outcome {
            status: OutcomeStatus::Error,
            code: self.code().to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Structured status/message pair returned for every user-visible operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub code: String,
    pub message: String,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            code: "ok".to_string(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

impl<T> From<&Result<T>> for Outcome {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Outcome::success("ok"),
            Err(e) => e.outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_keeps_its_message() {
        let outcome = Error::NotFound("ICD 'Fever' not found".into()).outcome();
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert_eq!(outcome.code, "not-found");
        assert_eq!(outcome.message, "Not found: ICD 'Fever' not found");
    }

    #[test]
    fn internal_errors_are_masked() {
        let outcome = Error::Internal("pool poisoned".into()).outcome();
        assert_eq!(outcome.code, "exception");
        assert_eq!(outcome.message, "Internal error");
    }

    #[test]
    fn outcome_serializes_lowercase_status() {
        let json = serde_json::to_value(Outcome::success("committed 3")).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "committed 3");
    }
}
