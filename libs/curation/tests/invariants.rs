//! Random operation sequences must keep the single-primary rule and ICD status in step

mod support;

use ayusync_curation::{
    models::{MappingStatus, RemapRequest, TermKey, TmSystem},
    services::registry::derive_icd_status,
    AppState,
};
use proptest::prelude::*;
use std::collections::HashMap;
use support::{constants::CURATOR, *};

const ICDS: [&str; 3] = ["Fever", "Cough", "Headache"];
const SYSTEMS: [TmSystem; 2] = [TmSystem::Ayurveda, TmSystem::Unani];
const TERMS: [&str; 3] = ["T0", "T1", "T2"];

#[derive(Debug, Clone)]
enum Op {
    Suggest {
        icd: usize,
        system: usize,
        term: usize,
        force_primary: bool,
    },
    Approve {
        icd: usize,
        system: usize,
        primary: Option<usize>,
        alias: Option<usize>,
    },
    Reject {
        icd: usize,
        system: usize,
        term: usize,
        orphan: bool,
    },
    Commit,
    Undo(usize),
    Revert(usize),
    Remap {
        system: usize,
        term: usize,
        destination: usize,
    },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let icd = 0..ICDS.len();
    let system = 0..SYSTEMS.len();
    let term = 0..TERMS.len();
    prop_oneof![
        3 => (icd.clone(), system.clone(), term.clone(), any::<bool>()).prop_map(
            |(icd, system, term, force_primary)| Op::Suggest {
                icd,
                system,
                term,
                force_primary
            }
        ),
        3 => (
            icd.clone(),
            system.clone(),
            proptest::option::of(term.clone()),
            proptest::option::of(term.clone())
        )
            .prop_map(|(icd, system, primary, alias)| Op::Approve {
                icd,
                system,
                primary,
                alias
            }),
        1 => (icd.clone(), system.clone(), term.clone(), any::<bool>()).prop_map(
            |(icd, system, term, orphan)| Op::Reject {
                icd,
                system,
                term,
                orphan
            }
        ),
        2 => Just(Op::Commit),
        1 => icd.clone().prop_map(Op::Undo),
        1 => icd.clone().prop_map(Op::Revert),
        1 => (system, term, icd).prop_map(|(system, term, destination)| Op::Remap {
            system,
            term,
            destination
        }),
    ]
}

/// Apply one operation; domain errors are expected and ignored
async fn apply(state: &AppState, op: &Op) {
    let _ = match *op {
        Op::Suggest {
            icd,
            system,
            term,
            force_primary,
        } => {
            let candidate = CandidateBuilder::new(SYSTEMS[system], TERMS[term], ICDS[icd]).build();
            state
                .ingestion
                .attach_candidate(&candidate, force_primary, false, "system")
                .await
                .map(|_| ())
        }
        Op::Approve {
            icd,
            system,
            primary,
            alias,
        } => {
            let mut decision = DecisionBuilder::new(ICDS[icd]);
            if let Some(primary) = primary {
                decision = decision.primary(SYSTEMS[system], TERMS[primary], None);
            }
            if let Some(alias) = alias {
                decision = decision.alias(SYSTEMS[system], TERMS[alias], None);
            }
            state
                .lifecycle
                .submit_curation(&[decision.build()], CURATOR)
                .await
                .map(|_| ())
        }
        Op::Reject {
            icd,
            system,
            term,
            orphan,
        } => {
            let reason = if orphan { "orphan" } else { "wrong icd" };
            let decision = DecisionBuilder::new(ICDS[icd])
                .reject(SYSTEMS[system], TERMS[term], reason)
                .build();
            state
                .lifecycle
                .submit_curation(&[decision], CURATOR)
                .await
                .map(|_| ())
        }
        Op::Commit => state.lifecycle.commit_to_master().await.map(|_| ()),
        Op::Undo(icd) => state.lifecycle.undo_verification(ICDS[icd]).await.map(|_| ()),
        Op::Revert(icd) => state
            .lifecycle
            .revert_master_mapping(ICDS[icd])
            .await
            .map(|_| ()),
        Op::Remap {
            system,
            term,
            destination,
        } => {
            let request = RemapRequest {
                term: TermKey::new(SYSTEMS[system], TERMS[term], None),
                from_icd: None,
                destination_icd: ICDS[destination].to_string(),
                is_new_icd: true,
            };
            state
                .lifecycle
                .remap_rejected_term(&request, CURATOR)
                .await
                .map(|_| ())
        }
    };
}

/// Primary counts per (ICD, system) among staged and verified rows, and ICD status drift
async fn check(state: &AppState) -> anyhow::Result<(HashMap<(String, TmSystem), usize>, Vec<String>)> {
    let curated = state
        .store
        .mappings_with_status(&[MappingStatus::Staged, MappingStatus::Verified])
        .await?;
    let mut primaries = HashMap::new();
    for detail in curated.iter().filter(|d| d.mapping.is_primary) {
        *primaries
            .entry((detail.icd_name.clone(), detail.mapping.system))
            .or_insert(0) += 1;
    }

    let mut drifted = Vec::new();
    for icd in state.registry.list_icds().await? {
        let mappings = state.store.mappings_for_icd(icd.id).await?;
        let expected = derive_icd_status(mappings.iter().map(|d| d.mapping.status));
        if icd.status != expected {
            drifted.push(icd.name);
        }
    }
    Ok((primaries, drifted))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn single_primary_and_status_hold_after_every_operation(
        ops in prop::collection::vec(op_strategy(), 1..40)
    ) {
        let app = TestApp::new();
        for op in &ops {
            let (primaries, drifted) = tokio_test::block_on(async {
                apply(&app.state, op).await;
                check(&app.state).await
            })
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

            for ((icd, system), count) in primaries {
                prop_assert!(
                    count <= 1,
                    "{} primaries for ({}, {}) after {:?}", count, icd, system, op
                );
            }
            prop_assert!(drifted.is_empty(), "status drift on {:?} after {:?}", drifted, op);
        }
    }
}
