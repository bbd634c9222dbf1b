use anyhow::Context as _;
use ayusync_curation::{
    models::{MappingDetail, MappingStatus, TmSystem},
    AppState,
};
use std::collections::HashMap;

/// Assert at most one staged/verified primary per (ICD, system)
pub async fn assert_single_primary(state: &AppState) -> anyhow::Result<()> {
    let curated = state
        .store
        .mappings_with_status(&[MappingStatus::Staged, MappingStatus::Verified])
        .await?;

    let mut primaries: HashMap<(String, TmSystem), usize> = HashMap::new();
    for detail in curated.iter().filter(|d| d.mapping.is_primary) {
        *primaries
            .entry((detail.icd_name.clone(), detail.mapping.system))
            .or_default() += 1;
    }

    for ((icd, system), count) in primaries {
        assert!(
            count <= 1,
            "expected at most one primary for ({icd}, {system}), found {count}"
        );
    }
    Ok(())
}

/// Find the mapping of `term` under `icd`
pub async fn mapping_of(
    state: &AppState,
    icd: &str,
    system: TmSystem,
    term: &str,
) -> anyhow::Result<MappingDetail> {
    let entry = state
        .store
        .find_icd(icd)
        .await?
        .with_context(|| format!("ICD entry {icd}"))?;
    state
        .store
        .mappings_for_icd(entry.id)
        .await?
        .into_iter()
        .find(|d| d.mapping.system == system && d.term.term == term)
        .with_context(|| format!("mapping {system}/{term} under {icd}"))
}

/// Assert status and primary flag of one mapping
pub async fn assert_mapping(
    state: &AppState,
    icd: &str,
    system: TmSystem,
    term: &str,
    status: MappingStatus,
    is_primary: bool,
) -> anyhow::Result<()> {
    let detail = mapping_of(state, icd, system, term).await?;
    assert_eq!(
        (detail.mapping.status, detail.mapping.is_primary),
        (status, is_primary),
        "unexpected state for {system}/{term} under {icd}"
    );
    Ok(())
}
