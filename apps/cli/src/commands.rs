//! Execution of parsed commands against the curation services.

use std::path::Path;

use anyhow::Context;
use ayusync_curation::{
    models::{
        Candidate, CurationDecision, ElementFilter, NewIcd, NewStagingRow, RemapRequest, TermKey,
    },
    AppState, Error, Outcome,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::cli::{Command, RemapArgs};

fn to_json<T: Serialize>(value: &T) -> ayusync_curation::Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Internal(format!("serialize output: {e}")))
}

/// Read a JSON array, or a single object as a one-element array.
fn read_items<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let items = match value {
        Value::Array(items) => items,
        single => vec![single],
    };
    items
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| format!("Unexpected content in {}", path.display()))
}

fn remap_request(args: &RemapArgs) -> RemapRequest {
    RemapRequest {
        term: TermKey::new(args.system, args.term.trim(), args.code.as_deref()),
        from_icd: args.from_icd.clone(),
        destination_icd: args.destination.trim().to_string(),
        is_new_icd: args.new_icd,
    }
}

/// Command inputs read from disk before the store is opened.
pub enum Input {
    None,
    Decisions(Vec<CurationDecision>),
    Candidates(Vec<Candidate>),
    StagingRows(Vec<NewStagingRow>),
}

pub fn load_input(command: &Command) -> anyhow::Result<Input> {
    Ok(match command {
        Command::Submit { file, .. } => Input::Decisions(read_items(file)?),
        Command::Attach { file, .. } => Input::Candidates(read_items(file)?),
        Command::Stage { file } => Input::StagingRows(read_items(file)?),
        _ => Input::None,
    })
}

/// Run one command and return its JSON result
///
/// Domain failures come back as `Err` so the caller can print an [`Outcome`].
pub async fn run(
    state: &AppState,
    command: &Command,
    input: Input,
) -> ayusync_curation::Result<Value> {
    match (command, input) {
        (Command::Submit { actor, .. }, Input::Decisions(decisions)) => {
            let report = state.lifecycle.submit_curation(&decisions, actor).await?;
            to_json(&report)
        }
        (Command::Commit, _) => {
            let count = state.lifecycle.commit_to_master().await?;
            to_json(&Outcome::success(format!(
                "Committed {count} staged mappings to master."
            )))
        }
        (Command::Undo { icd }, _) => {
            let count = state.lifecycle.undo_verification(icd).await?;
            to_json(&Outcome::success(format!(
                "Moved {count} verified mappings of '{icd}' back to staged."
            )))
        }
        (Command::Revert { icd }, _) => {
            let count = state.lifecycle.revert_master_mapping(icd).await?;
            to_json(&Outcome::success(format!(
                "Sent {count} mappings of '{icd}' back to review."
            )))
        }
        (Command::Remap(args), _) => {
            let outcome = state
                .lifecycle
                .remap_rejected_term(&remap_request(args), &args.actor)
                .await?;
            to_json(&outcome)
        }
        (
            Command::Attach {
                force_primary,
                enrich,
                actor,
                ..
            },
            Input::Candidates(candidates),
        ) => {
            let mut results = Vec::with_capacity(candidates.len());
            for candidate in &candidates {
                let result = state
                    .ingestion
                    .attach_candidate(candidate, *force_primary, *enrich, actor)
                    .await;
                results.push(match result {
                    Ok(mapping) => to_json(&mapping)?,
                    Err(e) => to_json(&e.outcome())?,
                });
            }
            Ok(Value::Array(results))
        }
        (Command::Stage { .. }, Input::StagingRows(rows)) => {
            let mut staged = Vec::with_capacity(rows.len());
            for row in &rows {
                staged.push(state.ingestion.stage_row(row).await?);
            }
            to_json(&staged)
        }
        (
            Command::Promote {
                row_id,
                force_primary,
                actor,
            },
            _,
        ) => {
            let mapping = state
                .ingestion
                .promote_staging_row(*row_id, *force_primary, actor)
                .await?;
            to_json(&mapping)
        }
        (Command::EnrichRows { row_ids }, _) => enrich_rows(state, row_ids).await,
        (Command::Refresh { version, notes }, _) => {
            let count = state
                .releases
                .refresh_release(version, notes.as_deref())
                .await?;
            to_json(&Outcome::success(format!(
                "Release '{version}' holds {count} elements."
            )))
        }
        (Command::Diff { version, from }, _) => {
            to_json(&state.releases.diff_release(version, from.as_deref()).await?)
        }
        (Command::Releases, _) => to_json(&state.releases.list_releases().await?),
        (
            Command::Elements {
                version,
                icd,
                system,
            },
            _,
        ) => {
            let filter = ElementFilter {
                icd_name: icd.clone(),
                system: *system,
            };
            to_json(&state.releases.release_elements(version, &filter).await?)
        }
        (Command::Publish { version }, _) => {
            to_json(&state.releases.publish_release(version).await?)
        }
        (
            Command::Translate {
                system,
                code_or_term,
                release,
            },
            _,
        ) => to_json(
            &state
                .translation
                .translate(release.as_deref(), *system, code_or_term)
                .await?,
        ),
        (Command::Reverse { icd, release }, _) => {
            to_json(&state.translation.reverse(release.as_deref(), icd).await?)
        }
        (Command::Stats, _) => to_json(&state.review.stats().await?),
        (Command::Completeness, _) => to_json(&state.review.completeness().await?),
        (Command::Review, _) => to_json(&state.review.review_queue().await?),
        (Command::MasterMap, _) => to_json(&state.review.master_map().await?),
        (Command::Rejected, _) => to_json(&state.review.rejected_mappings().await?),
        (Command::History { mapping_id }, _) => {
            to_json(&state.review.audit_history(*mapping_id).await?)
        }
        (Command::AddIcd { name, description }, _) => {
            let entry = state
                .registry
                .add_icd(NewIcd {
                    name: name.clone(),
                    description: description.clone(),
                })
                .await?;
            to_json(&entry)
        }
        (Command::EnrichIcd { name }, _) => to_json(&state.registry.enrich_icd(name).await?),
        (Command::Reset { yes }, _) => {
            if !*yes {
                return Err(Error::Validation(
                    "reset deletes every mapping, term and ICD entry; pass --yes to confirm"
                        .to_string(),
                ));
            }
            let counts = state.registry.full_reset().await?;
            to_json(&counts)
        }
        (Command::Submit { .. } | Command::Attach { .. } | Command::Stage { .. }, _) => Err(
            Error::Internal("command input was not loaded".to_string()),
        ),
    }
}

async fn enrich_rows(state: &AppState, row_ids: &[i64]) -> ayusync_curation::Result<Value> {
    let mut rows = Vec::with_capacity(row_ids.len());
    for id in row_ids {
        let row = state
            .store
            .staging_row(*id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("staging row {id}")))?;
        rows.push(row);
    }

    let pool = state.enrichment_pool();
    for row in &rows {
        pool.submit(row).await?;
    }
    pool.shutdown().await;

    let mut enriched = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(current) = state.store.staging_row(row.id).await? {
            enriched.push(current);
        }
    }
    to_json(&enriched)
}
