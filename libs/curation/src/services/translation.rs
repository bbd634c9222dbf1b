//! Release-scoped NAMASTE ↔ ICD-11 lookups behind the translation cache

use crate::{
    cache::{cache_key, same_text, CacheStats, Direction, TranslationCache},
    config::CacheConfig,
    db::CurationStore,
    models::{ConceptMapRelease, ElementData, Equivalence, SystemMapping, TermSummary, TmSystem},
    services::release::ReleaseService,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// ICD target of a traditional-medicine term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardTranslation {
    pub release: String,
    pub system: TmSystem,
    pub term: String,
    pub term_code: Option<String>,
    pub icd_name: String,
    pub icd_code: Option<String>,
    pub equivalence: Equivalence,
    pub is_primary: bool,
}

/// Traditional-medicine terms of one ICD entry, per system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcdTranslation {
    pub release: String,
    pub icd_name: String,
    pub icd_code: Option<String>,
    pub systems: BTreeMap<TmSystem, SystemMapping>,
}

#[derive(Debug, Clone)]
pub enum CachedTranslation {
    Forward(ForwardTranslation),
    Reverse(IcdTranslation),
}

fn forward_match(
    release: &ConceptMapRelease,
    elements: &[ElementData],
    system: TmSystem,
    identifier: &str,
) -> Option<ForwardTranslation> {
    let matches_identifier = |e: &&ElementData| {
        e.system == system
            && (same_text(&e.term, identifier)
                || e
                    .term_code
                    .as_deref()
                    .is_some_and(|code| same_text(code, identifier)))
    };

    let best = elements
        .iter()
        .filter(matches_identifier)
        .min_by(|a, b| (!a.is_primary, &a.icd_name).cmp(&(!b.is_primary, &b.icd_name)))?;

    Some(ForwardTranslation {
        release: release.version.clone(),
        system: best.system,
        term: best.term.clone(),
        term_code: best.term_code.clone(),
        icd_name: best.icd_name.clone(),
        icd_code: best.icd_code.clone(),
        equivalence: best.equivalence,
        is_primary: best.is_primary,
    })
}

fn reverse_match(
    release: &ConceptMapRelease,
    elements: &[ElementData],
    identifier: &str,
) -> Option<IcdTranslation> {
    let anchor = elements.iter().find(|e| {
        same_text(&e.icd_name, identifier)
            || e
                .icd_code
                .as_deref()
                .is_some_and(|code| same_text(code, identifier))
    })?;

    let mut systems: BTreeMap<TmSystem, SystemMapping> = BTreeMap::new();
    for element in elements.iter().filter(|e| e.icd_name == anchor.icd_name) {
        systems
            .entry(element.system)
            .or_default()
            .push(
                TermSummary::new(element.term.clone(), element.term_code.clone()),
                element.is_primary,
            );
    }

    Some(IcdTranslation {
        release: release.version.clone(),
        icd_name: anchor.icd_name.clone(),
        icd_code: anchor.icd_code.clone(),
        systems,
    })
}

#[derive(Clone)]
pub struct TranslationService {
    store: Arc<dyn CurationStore>,
    releases: ReleaseService,
    cache: Arc<TranslationCache<CachedTranslation>>,
}

impl TranslationService {
    pub fn new(
        store: Arc<dyn CurationStore>,
        releases: ReleaseService,
        cache: Arc<TranslationCache<CachedTranslation>>,
    ) -> Self {
        Self {
            store,
            releases,
            cache,
        }
    }

    pub fn with_config(
        store: Arc<dyn CurationStore>,
        releases: ReleaseService,
        config: &CacheConfig,
    ) -> Self {
        let cache = TranslationCache::new(config.ttl(), config.max_entries);
        Self::new(store, releases, Arc::new(cache))
    }

    async fn elements(&self, release: &ConceptMapRelease) -> Result<Vec<ElementData>> {
        Ok(self
            .store
            .release_elements(release.id)
            .await?
            .into_iter()
            .map(|e| e.data)
            .collect())
    }

    /// Map a NAMASTE code or term to its ICD target
    ///
    /// Matches the term text or source code case-insensitively; a primary mapping
    /// wins over aliases. Without `release` the latest release is used.
    ///
    /// # Errors
    /// * `NotFound` - No release exists, or nothing matches
    pub async fn translate(
        &self,
        release: Option<&str>,
        system: TmSystem,
        code_or_term: &str,
    ) -> Result<ForwardTranslation> {
        let identifier = code_or_term.trim();
        let key = cache_key(release, Direction::Forward, &format!("{system}:{identifier}"));
        if let Some(CachedTranslation::Forward(hit)) = self.cache.get(&key) {
            return Ok(hit);
        }

        let resolved = self.releases.resolve(release).await?;
        let elements = self.elements(&resolved).await?;
        let found = forward_match(&resolved, &elements, system, identifier).ok_or_else(|| {
            Error::NotFound(format!(
                "{system} term '{identifier}' in release '{}'",
                resolved.version
            ))
        })?;

        self.cache.set(key, CachedTranslation::Forward(found.clone()));
        Ok(found)
    }

    /// Map an ICD name or code to its terms, grouped per system
    ///
    /// # Errors
    /// * `NotFound` - No release exists, or the ICD entry has no elements
    pub async fn reverse(&self, release: Option<&str>, icd: &str) -> Result<IcdTranslation> {
        let identifier = icd.trim();
        let key = cache_key(release, Direction::Reverse, identifier);
        if let Some(CachedTranslation::Reverse(hit)) = self.cache.get(&key) {
            return Ok(hit);
        }

        let resolved = self.releases.resolve(release).await?;
        let elements = self.elements(&resolved).await?;
        let found = reverse_match(&resolved, &elements, identifier).ok_or_else(|| {
            Error::NotFound(format!(
                "ICD entry '{identifier}' in release '{}'",
                resolved.version
            ))
        })?;

        self.cache.set(key, CachedTranslation::Reverse(found.clone()));
        Ok(found)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn release() -> ConceptMapRelease {
        ConceptMapRelease {
            id: 1,
            name: "namaste-to-icd11".into(),
            version: "v1".into(),
            notes: None,
            created_at: Utc::now(),
            published_at: None,
        }
    }

    fn element(icd: &str, system: TmSystem, term: &str, code: &str, primary: bool) -> ElementData {
        ElementData {
            icd_name: icd.into(),
            icd_code: Some(format!("{icd}-code")),
            system,
            term: term.into(),
            term_code: Some(code.into()),
            equivalence: Equivalence::Equivalent,
            is_primary: primary,
            active: true,
        }
    }

    #[test]
    fn forward_prefers_primary() {
        let elements = vec![
            element("Cough", TmSystem::Ayurveda, "Kasa", "AY-9", false),
            element("Fever", TmSystem::Ayurveda, "Kasa", "AY-9", true),
        ];
        let found = forward_match(&release(), &elements, TmSystem::Ayurveda, "ay-9").unwrap();
        assert_eq!(found.icd_name, "Fever");
        assert!(found.is_primary);
    }

    #[test]
    fn forward_is_scoped_to_system() {
        let elements = vec![element("Fever", TmSystem::Siddha, "Suram", "SI-1", true)];
        assert!(forward_match(&release(), &elements, TmSystem::Unani, "Suram").is_none());
        assert!(forward_match(&release(), &elements, TmSystem::Siddha, "suram").is_some());
    }

    #[test]
    fn matching_folds_diacritics() {
        let elements = vec![
            element("Asthma", TmSystem::Ayurveda, "Śvāsa", "AY-5", true),
            element("Sjögren syndrome", TmSystem::Ayurveda, "Śuṣkatā", "AY-6", true),
        ];
        let found = forward_match(&release(), &elements, TmSystem::Ayurveda, "ŚVĀSA").unwrap();
        assert_eq!(found.icd_name, "Asthma");

        let found = reverse_match(&release(), &elements, "SJÖGREN SYNDROME").unwrap();
        assert_eq!(found.systems[&TmSystem::Ayurveda].len(), 1);
    }

    #[test]
    fn reverse_groups_terms_per_system() {
        let elements = vec![
            element("Fever", TmSystem::Ayurveda, "Jvara", "AY-1", false),
            element("Fever", TmSystem::Ayurveda, "Santapa", "AY-2", true),
            element("Fever", TmSystem::Siddha, "Suram", "SI-1", true),
            element("Rash", TmSystem::Siddha, "Other", "SI-2", true),
        ];
        let found = reverse_match(&release(), &elements, "fever-code").unwrap();
        assert_eq!(found.icd_name, "Fever");

        let ayurveda = &found.systems[&TmSystem::Ayurveda];
        assert_eq!(ayurveda.primary.as_ref().map(|t| t.term.as_str()), Some("Santapa"));
        assert_eq!(ayurveda.aliases.len(), 1);
        assert_eq!(found.systems[&TmSystem::Siddha].len(), 1);
    }
}
