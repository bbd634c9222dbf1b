//! External collaborators: AI verifier and WHO enrichment
//!
//! Both are consumed through traits. Calls return explicit `Result`s; the
//! call sites decide how to degrade (placeholder assessment, unenriched entry).

use crate::{
    config::ServiceEndpointConfig,
    metrics,
    models::{AiAssessment, IcdEnrichment, TmSystem, TraditionalTerm},
    Error, Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Term details sent to the AI verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermPayload {
    pub system: TmSystem,
    pub term: String,
    pub code: Option<String>,
    pub short_definition: Option<String>,
    pub long_definition: Option<String>,
}

impl From<&TraditionalTerm> for TermPayload {
    fn from(term: &TraditionalTerm) -> Self {
        Self {
            system: term.system,
            term: term.term.clone(),
            code: term.code.clone(),
            short_definition: term.short_definition.clone(),
            long_definition: term.long_definition.clone(),
        }
    }
}

#[async_trait]
pub trait AiVerifier: Send + Sync {
    /// Assess how well `term` matches the ICD entry `icd_name`
    ///
    /// # Errors
    /// * `ExternalService` - The verifier could not produce an assessment
    async fn verify(&self, icd_name: &str, term: &TermPayload) -> Result<AiAssessment>;
}

#[async_trait]
pub trait WhoEnrichment: Send + Sync {
    /// Look up WHO code and description for an ICD entry name
    ///
    /// # Errors
    /// * `ExternalService` - The lookup failed
    async fn enrich(&self, icd_name: &str) -> Result<IcdEnrichment>;
}

/// Run the verifier, substituting the `N/A`/0 placeholder on failure.
pub async fn assess_or_placeholder(
    verifier: &dyn AiVerifier,
    icd_name: &str,
    term: &TermPayload,
) -> AiAssessment {
    match verifier.verify(icd_name, term).await {
        Ok(assessment) => {
            metrics::EXTERNAL_CALLS_TOTAL
                .with_label_values(&["ai", "ok"])
                .inc();
            assessment
        }
        Err(e) => {
            metrics::EXTERNAL_CALLS_TOTAL
                .with_label_values(&["ai", "error"])
                .inc();
            tracing::warn!(icd = %icd_name, term = %term.term, error = %e, "AI verification unavailable, storing placeholder");
            AiAssessment::unavailable()
        }
    }
}

/// Verifier used when no endpoint is configured; every call fails.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredVerifier;

#[async_trait]
impl AiVerifier for UnconfiguredVerifier {
    async fn verify(&self, _icd_name: &str, _term: &TermPayload) -> Result<AiAssessment> {
        Err(Error::ExternalService(
            "AI verifier is not configured".to_string(),
        ))
    }
}

/// WHO client used when no endpoint is configured; every call fails.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredWho;

#[async_trait]
impl WhoEnrichment for UnconfiguredWho {
    async fn enrich(&self, _icd_name: &str) -> Result<IcdEnrichment> {
        Err(Error::ExternalService(
            "WHO enrichment is not configured".to_string(),
        ))
    }
}

fn build_client(config: &ServiceEndpointConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
}

fn authorized(
    request: reqwest::RequestBuilder,
    api_key: Option<&str>,
) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) => request.bearer_auth(key),
        None => request,
    }
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    icd_name: &'a str,
    term: &'a TermPayload,
}

#[derive(Deserialize)]
struct VerifyResponse {
    justification: String,
    confidence: i64,
}

/// JSON-over-HTTP AI verifier
pub struct HttpAiVerifier {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    api_key: Option<String>,
}

impl HttpAiVerifier {
    pub fn new(endpoint: &str, config: &ServiceEndpointConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            endpoint: reqwest::Url::parse(endpoint)
                .map_err(|e| Error::Config(format!("invalid AI verifier endpoint: {e}")))?,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl AiVerifier for HttpAiVerifier {
    async fn verify(&self, icd_name: &str, term: &TermPayload) -> Result<AiAssessment> {
        let request = self
            .client
            .post(self.endpoint.clone())
            .json(&VerifyRequest { icd_name, term });

        let response = authorized(request, self.api_key.as_deref())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::ExternalService(format!("AI verifier request failed: {e}")))?;

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| Error::ExternalService(format!("AI verifier returned malformed JSON: {e}")))?;

        Ok(AiAssessment::new(body.justification, body.confidence))
    }
}

#[derive(Serialize)]
struct EnrichRequest<'a> {
    icd_name: &'a str,
}

/// JSON-over-HTTP WHO enrichment client
pub struct HttpWhoClient {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    api_key: Option<String>,
}

impl HttpWhoClient {
    pub fn new(endpoint: &str, config: &ServiceEndpointConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            endpoint: reqwest::Url::parse(endpoint)
                .map_err(|e| Error::Config(format!("invalid WHO endpoint: {e}")))?,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl WhoEnrichment for HttpWhoClient {
    async fn enrich(&self, icd_name: &str) -> Result<IcdEnrichment> {
        let request = self
            .client
            .post(self.endpoint.clone())
            .json(&EnrichRequest { icd_name });

        let response = authorized(request, self.api_key.as_deref())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::ExternalService(format!("WHO lookup failed: {e}")))?;

        response
            .json::<IcdEnrichment>()
            .await
            .map_err(|e| Error::ExternalService(format!("WHO lookup returned malformed JSON: {e}")))
    }
}

pub fn ai_verifier_from_config(config: &ServiceEndpointConfig) -> Result<Arc<dyn AiVerifier>> {
    Ok(match &config.endpoint {
        Some(endpoint) => Arc::new(HttpAiVerifier::new(endpoint, config)?),
        None => Arc::new(UnconfiguredVerifier),
    })
}

pub fn who_client_from_config(config: &ServiceEndpointConfig) -> Result<Arc<dyn WhoEnrichment>> {
    Ok(match &config.endpoint {
        Some(endpoint) => Arc::new(HttpWhoClient::new(endpoint, config)?),
        None => Arc::new(UnconfiguredWho),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TermPayload {
        TermPayload {
            system: TmSystem::Ayurveda,
            term: "Jvara".into(),
            code: Some("AAA-1".into()),
            short_definition: None,
            long_definition: None,
        }
    }

    #[tokio::test]
    async fn unconfigured_verifier_degrades_to_placeholder() {
        let assessment = assess_or_placeholder(&UnconfiguredVerifier, "Fever", &payload()).await;
        assert_eq!(assessment, AiAssessment::unavailable());
    }

    #[tokio::test]
    async fn unconfigured_who_reports_external_error() {
        let err = UnconfiguredWho.enrich("Fever").await.unwrap_err();
        assert!(matches!(err, Error::ExternalService(_)));
    }

    #[test]
    fn missing_endpoint_selects_unconfigured_clients() {
        let config = ServiceEndpointConfig::default();
        assert!(ai_verifier_from_config(&config).is_ok());
        assert!(who_client_from_config(&config).is_ok());
    }
}
