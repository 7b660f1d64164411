//! Expansion of source-specific branch sets.
//!
//! A branch set whose `applyToSources` names a zone table is replaced by one
//! numeric branch set per active zone of that table, each applying to a
//! single zone id.

use crate::branch::BranchSet;
use crate::constants::{ALL_SOURCES, APPLY_TO_SOURCES, MEGATHRUST_SUFFIX};
use crate::error::Result;
use crate::expression::ModelList;
use crate::zone::Zone;

fn applies_to_all(branch_set: &BranchSet) -> bool {
    branch_set
        .apply_to()
        .get(APPLY_TO_SOURCES)
        .is_none_or(|target| target == ALL_SOURCES)
}

fn has_megathrust_twin(zone: &Zone, zones: &[Zone]) -> bool {
    let twin = format!("{}{MEGATHRUST_SUFFIX}", zone.id);
    zones.iter().any(|z| z.id == twin)
}

fn expand_one(branch_set: &BranchSet, zones: &[Zone]) -> Result<Vec<BranchSet>> {
    let mut out = Vec::new();
    for zone in zones.iter().filter(|z| z.is_active()) {
        if branch_set.kind().is_max_mag() && has_megathrust_twin(zone, zones) {
            tracing::debug!(zone_id = %zone.id, "megathrust twin, skipping max-magnitude branch set");
            continue;
        }
        let expanded = if branch_set.is_collapsible() {
            let resolved = branch_set.models().resolve(&zone.attribute_names());
            let values = resolved.evaluate(zone).map_err(|err| err.in_zone(&zone.id))?;
            let mut numeric = BranchSet::new(
                branch_set.kind().clone(),
                ModelList::from_values(&values)?,
                Some(branch_set.weights()),
            )?;
            for (key, value) in branch_set.apply_to() {
                numeric = numeric.with_apply_to(key, value);
            }
            numeric
        } else {
            branch_set.clone()
        };
        out.push(expanded.with_apply_to(APPLY_TO_SOURCES, &zone.id));
    }
    Ok(out)
}

/// Expand every branch set that applies to a zone table known to `lookup`.
///
/// Branch sets applying to `all` sources (or naming no sources) come first,
/// then the rest; each group keeps tree order. Targets `lookup` does not know
/// pass through unchanged.
pub fn expand_sources<'a>(
    tree: &[BranchSet],
    lookup: impl Fn(&str) -> Option<&'a [Zone]>,
) -> Result<Vec<BranchSet>> {
    let mut expanded = Vec::with_capacity(tree.len());
    for branch_set in tree {
        let table = branch_set
            .apply_to()
            .get(APPLY_TO_SOURCES)
            .and_then(|target| lookup(target));
        match table {
            Some(zones) => {
                let rows = expand_one(branch_set, zones)?;
                tracing::debug!(
                    uncertainty = %branch_set.kind(),
                    branch_sets = rows.len(),
                    "expanded source-specific branch set"
                );
                expanded.extend(rows);
            }
            None => expanded.push(branch_set.clone()),
        }
    }

    let (mut all, specific): (Vec<BranchSet>, Vec<BranchSet>) =
        expanded.into_iter().partition(applies_to_all);
    all.extend(specific);
    Ok(all)
}
