//! Element-level comparison of two releases

use crate::models::{DiffSummary, ElementChange, ElementData, ElementKey, ReleaseDiff};
use std::collections::BTreeMap;

fn grouped(elements: Vec<ElementData>) -> BTreeMap<ElementKey, Vec<ElementData>> {
    let mut groups: BTreeMap<ElementKey, Vec<ElementData>> = BTreeMap::new();
    for element in elements {
        groups.entry(element.key()).or_default().push(element);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.term_code.cmp(&b.term_code));
    }
    groups
}

fn compare(before: ElementData, after: ElementData, changed: &mut Vec<ElementChange>) {
    if before.differs_from(&after) {
        changed.push(ElementChange { before, after });
    }
}

/// Compare a baseline release against a target
///
/// Elements are matched on (system, term, ICD name). Terms that share text and
/// differ only in source code land on the same key; such a group is paired by
/// `term_code`, and unpaired members count as added or removed. A matched pair
/// counts as changed when ICD code, equivalence, primary flag or active flag
/// differ. Output lists are ordered by key, then source code.
pub fn diff_elements(
    from: Option<&str>,
    to: &str,
    baseline: Vec<ElementData>,
    target: Vec<ElementData>,
) -> ReleaseDiff {
    let mut baseline = grouped(baseline);
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = Vec::new();

    for (key, after_group) in grouped(target) {
        let mut before_group = baseline.remove(&key).unwrap_or_default();

        if before_group.len() == 1 && after_group.len() == 1 {
            if let (Some(before), Some(after)) = (before_group.pop(), after_group.into_iter().next())
            {
                compare(before, after, &mut changed);
            }
            continue;
        }

        if before_group.len() > 1 || after_group.len() > 1 {
            tracing::debug!(
                system = %key.system,
                term = %key.term,
                icd = %key.icd_name,
                "Several elements share a diff key, pairing by source code"
            );
        }

        for after in after_group {
            match before_group
                .iter()
                .position(|before| before.term_code == after.term_code)
            {
                Some(index) => compare(before_group.remove(index), after, &mut changed),
                None => added.push(after),
            }
        }
        removed.extend(before_group);
    }

    removed.extend(baseline.into_values().flatten());
    removed.sort_by(|a, b| (a.key(), &a.term_code).cmp(&(b.key(), &b.term_code)));

    ReleaseDiff {
        from: from.map(str::to_string),
        to: to.to_string(),
        summary: DiffSummary {
            added: added.len(),
            removed: removed.len(),
            changed: changed.len(),
        },
        added,
        removed,
        changed,
    }
}
