//! Collapse of magnitude/rate logic-tree branches into one discretized
//! occurrence-rate vector per zone.
//!
//! For every active zone the base truncated GR distribution is forked across
//! each collapsible branch set in tree order. Every fork is discretized onto
//! a common bin grid (shorter forks zero-padded at the high-magnitude end)
//! and the weighted sum of the forks becomes the zone's `occurRates`.
//! Branch sets of any other kind are handed back untouched as the remaining
//! tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::branch::{BranchSet, Fork, branch_forks};
use crate::constants::{DEFAULT_BIN_WIDTH, DEFAULT_SIG_FIGS};
use crate::error::{CollapseError, Result};
use crate::mfd::TruncatedGr;
use crate::precision::limit_precision_all;
use crate::zone::Zone;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollapseConfig {
    pub bin_width: f64,
    pub sig_figs: usize,
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            bin_width: DEFAULT_BIN_WIDTH,
            sig_figs: DEFAULT_SIG_FIGS,
        }
    }
}

/// Per-fork rates of one zone, one zero-padded column per fork.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateMatrix {
    num_bins: usize,
    columns: Vec<Vec<f64>>,
}

impl RateMatrix {
    pub fn from_forks(forks: &[Fork]) -> Self {
        let columns: Vec<Vec<f64>> = forks
            .iter()
            .map(|fork| fork.mfd.map(|mfd| mfd.rates()).unwrap_or_default())
            .collect();
        Self::from_columns(columns)
    }

    /// Pad ragged columns with zeros up to the longest.
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Self {
        let num_bins = columns.iter().map(Vec::len).max().unwrap_or(0);
        let columns = columns
            .into_iter()
            .map(|mut column| {
                column.resize(num_bins, 0.0);
                column
            })
            .collect();
        Self { num_bins, columns }
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn num_forks(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, fork: usize) -> &[f64] {
        &self.columns[fork]
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Rates of every fork in one bin.
    pub fn row(&self, bin: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[bin]).collect()
    }

    /// `Σ_i column_i * weight_i`, bin by bin.
    pub fn weighted_sum(&self, weights: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.num_bins];
        for (column, weight) in self.columns.iter().zip(weights) {
            for (acc, rate) in out.iter_mut().zip(column) {
                *acc += rate * weight;
            }
        }
        out
    }
}

/// Full-resolution view of one zone's forks, kept for diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub struct ForkBreakdown {
    /// Centre of the first magnitude bin.
    pub first_mag: f64,
    pub bin_width: f64,
    pub rates: RateMatrix,
    pub weights: Vec<f64>,
    pub labels: Vec<String>,
}

impl ForkBreakdown {
    /// Bin centres for the rows of `rates`.
    pub fn magnitudes(&self) -> Vec<f64> {
        (0..self.rates.num_bins())
            .map(|i| self.first_mag + i as f64 * self.bin_width)
            .collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Number of forks with a null distribution.
    pub fn null_forks(&self) -> usize {
        self.rates
            .columns()
            .iter()
            .filter(|c| c.iter().all(|&r| r == 0.0))
            .count()
    }
}

/// A zone with its collapsed occurrence rates.
#[derive(Clone, Debug, PartialEq)]
pub struct CollapsedZone {
    pub zone: Zone,
    pub occur_rates: Vec<f64>,
    pub mag_bin: f64,
}

/// Everything a collapse run produces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollapseOutcome {
    /// Active zones, in input order.
    pub zones: Vec<CollapsedZone>,
    /// Non-collapsible branch sets, in tree order.
    pub remaining: Vec<BranchSet>,
    /// Fork weights per zone, parallel to `zones`.
    pub weights: Vec<Vec<f64>>,
    /// Fork labels; the branch structure is the same for every zone.
    pub labels: Vec<String>,
    breakdowns: BTreeMap<String, ForkBreakdown>,
    last_zone: Option<String>,
}

impl CollapseOutcome {
    /// Rebuild an outcome without diagnostics, e.g. from an export.
    pub fn from_parts(
        zones: Vec<CollapsedZone>,
        remaining: Vec<BranchSet>,
        weights: Vec<Vec<f64>>,
        labels: Vec<String>,
    ) -> Self {
        Self {
            zones,
            remaining,
            weights,
            labels,
            breakdowns: BTreeMap::new(),
            last_zone: None,
        }
    }

    pub fn zone(&self, zone_id: &str) -> Option<&CollapsedZone> {
        self.zones.iter().find(|z| z.zone.id == zone_id)
    }

    /// Fork breakdown of any processed zone.
    pub fn breakdown(&self, zone_id: &str) -> Option<&ForkBreakdown> {
        self.breakdowns.get(zone_id)
    }

    /// Fork breakdown of the last zone processed.
    pub fn last_breakdown(&self) -> Option<&ForkBreakdown> {
        self.last_zone.as_deref().and_then(|id| self.breakdown(id))
    }

    fn push(&mut self, zone: &Zone, occur_rates: Vec<f64>, breakdown: ForkBreakdown) {
        self.weights.push(breakdown.weights.clone());
        self.labels = breakdown.labels.clone();
        self.zones.push(CollapsedZone {
            zone: zone.clone(),
            occur_rates,
            mag_bin: breakdown.bin_width,
        });
        self.breakdowns.insert(zone.id.clone(), breakdown);
        self.last_zone = Some(zone.id.clone());
    }
}

/// Split a tree into collapsible branch sets and the remaining ones,
/// preserving order within each.
pub fn partition_tree(tree: &[BranchSet]) -> (Vec<&BranchSet>, Vec<BranchSet>) {
    let (collapsible, remaining): (Vec<&BranchSet>, Vec<&BranchSet>) =
        tree.iter().partition(|b| b.is_collapsible());
    (collapsible, remaining.into_iter().cloned().collect())
}

/// Fork one zone across the collapsible branch sets and collapse the forks.
///
/// A failing branch application is logged with the full zone record and run
/// once more inside a debug span before the error propagates, so the
/// evaluator's traces for the faulting zone end up in the log.
pub fn collapse_zone(
    zone: &Zone,
    collapsible: &[&BranchSet],
    config: &CollapseConfig,
) -> Result<(Vec<f64>, ForkBreakdown)> {
    let base = TruncatedGr::new(zone.mmin, zone.mmax, zone.a, zone.b, config.bin_width)
        .map_err(|err| {
            tracing::error!(zone = %zone.record(), error = %err, "invalid base distribution");
            err.in_zone(&zone.id)
        })?;

    let mut forks = vec![Fork::root(base)];
    for branch_set in collapsible {
        forks = branch_forks(&forks, branch_set, zone)
            .or_else(|err| {
                tracing::error!(
                    zone = %zone.record(),
                    uncertainty = %branch_set.kind(),
                    model = %branch_set.models(),
                    error = %err,
                    "branch application failed"
                );
                let _retry = tracing::debug_span!("retry", zone_id = %zone.id).entered();
                branch_forks(&forks, branch_set, zone)
            })
            .map_err(|err| err.in_zone(&zone.id))?;
    }

    let rates = RateMatrix::from_forks(&forks);
    let weights: Vec<f64> = forks.iter().map(|f| f.weight).collect();
    let collapsed = limit_precision_all(&rates.weighted_sum(&weights), config.sig_figs);

    let breakdown = ForkBreakdown {
        first_mag: base.min_max_mag().0,
        bin_width: config.bin_width,
        rates,
        weights,
        labels: forks.into_iter().map(|f| f.label).collect(),
    };
    if breakdown.rates.num_bins() == 0 {
        tracing::warn!(zone_id = %zone.id, "every fork is null, collapsed rates are empty");
    }
    tracing::debug!(
        zone_id = %zone.id,
        forks = breakdown.rates.num_forks(),
        null_forks = breakdown.null_forks(),
        bins = breakdown.rates.num_bins(),
        "collapsed zone"
    );

    Ok((collapsed, breakdown))
}

/// Collapse every active zone (`mmax != 0`) across the tree's collapsible
/// branch sets.
///
/// Any zone failing aborts the whole run; a missing zone would silently
/// corrupt downstream hazard totals. Active zones must have unique ids.
pub fn collapse_sources(
    zones: &[Zone],
    tree: &[BranchSet],
    config: &CollapseConfig,
) -> Result<CollapseOutcome> {
    let (collapsible, remaining) = partition_tree(tree);
    let mut outcome = CollapseOutcome {
        remaining,
        ..CollapseOutcome::default()
    };

    let mut inactive = 0usize;
    for zone in zones {
        if !zone.is_active() {
            inactive += 1;
            continue;
        }
        if outcome.breakdowns.contains_key(&zone.id) {
            tracing::error!(zone_id = %zone.id, "duplicate zone id");
            return Err(CollapseError::DuplicateZone {
                zone_id: zone.id.clone(),
            });
        }
        let (occur_rates, breakdown) = collapse_zone(zone, &collapsible, config)?;
        outcome.push(zone, occur_rates, breakdown);
    }

    tracing::info!(
        zones = outcome.zones.len(),
        inactive,
        collapsed_branch_sets = collapsible.len(),
        remaining_branch_sets = outcome.remaining.len(),
        forks = outcome.labels.len(),
        "collapsed logic tree"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gmpe() -> BranchSet {
        BranchSet::parse("gmpeModel", "['Toro2002', 'Campbell2003']", None).unwrap()
    }

    #[test]
    fn test_rate_matrix_pads_columns() {
        let matrix = RateMatrix::from_columns(vec![vec![3.0, 2.0, 1.0], vec![], vec![4.0]]);
        assert_eq!(matrix.num_bins(), 3);
        assert_eq!(matrix.num_forks(), 3);
        assert_eq!(matrix.column(1), &[0.0, 0.0, 0.0]);
        assert_eq!(matrix.column(2), &[4.0, 0.0, 0.0]);
        assert_eq!(matrix.row(0), vec![3.0, 0.0, 4.0]);
    }

    #[test]
    fn test_weighted_sum() {
        let matrix = RateMatrix::from_columns(vec![vec![2.0, 1.0], vec![4.0]]);
        assert_eq!(matrix.weighted_sum(&[0.5, 0.5]), vec![3.0, 0.5]);
    }

    #[test]
    fn test_empty_matrix() {
        let matrix = RateMatrix::from_forks(&[]);
        assert_eq!(matrix.num_bins(), 0);
        assert!(matrix.weighted_sum(&[]).is_empty());
    }

    #[test]
    fn test_partition_keeps_order() {
        let tree = vec![
            BranchSet::parse("bGRRelative", "[-0.1, 0.1]", None).unwrap(),
            gmpe(),
            BranchSet::parse("maxMagGRRelative", "[0]", None).unwrap(),
            BranchSet::parse("sourceModel", "['areal.xml']", None).unwrap(),
        ];
        let (collapsible, remaining) = partition_tree(&tree);
        assert_eq!(collapsible, vec![&tree[0], &tree[2]]);
        assert_eq!(remaining, vec![tree[1].clone(), tree[3].clone()]);
    }

    #[test]
    fn test_collapse_zone_without_branches() {
        let zone = Zone::new("z", 4.5, 8.0, 5.0, 1.0);
        let (rates, breakdown) = collapse_zone(&zone, &[], &CollapseConfig::default()).unwrap();
        assert_eq!(breakdown.weights, vec![1.0]);
        assert_eq!(breakdown.labels, vec![String::new()]);
        assert_eq!(rates.len(), 35);
        let expected = 10f64.powf(0.5) - 10f64.powf(0.4);
        assert_relative_eq!(rates[0], expected, max_relative = 1e-4);
        assert_relative_eq!(breakdown.first_mag, 4.55, epsilon = 1e-9);
        assert_relative_eq!(breakdown.magnitudes()[34], 7.95, epsilon = 1e-9);
    }

    #[test]
    fn test_collapse_zone_invalid_base_reports_zone() {
        let zone = Zone::new("tiny", 4.5, 4.52, 5.0, 1.0);
        let err = collapse_zone(&zone, &[], &CollapseConfig::default()).unwrap_err();
        assert!(err.to_string().starts_with("zone tiny: invalid distribution"));
    }

    #[test]
    fn test_last_breakdown_and_lookup() {
        let zones = vec![
            Zone::new("a", 4.5, 7.0, 4.0, 1.0),
            Zone::new("off", 4.5, 0.0, 4.0, 1.0),
            Zone::new("b", 4.5, 8.0, 5.0, 0.9),
        ];
        let tree = vec![BranchSet::parse("bGRRelative", "[-0.1, 0.1]", None).unwrap()];
        let outcome = collapse_sources(&zones, &tree, &CollapseConfig::default()).unwrap();

        assert_eq!(outcome.zones.len(), 2);
        assert!(outcome.zone("off").is_none());
        assert!(outcome.breakdown("off").is_none());
        assert_eq!(outcome.breakdown("a").unwrap().rates.num_bins(), 25);
        assert_eq!(outcome.last_breakdown(), outcome.breakdown("b"));
        assert_eq!(outcome.labels, vec!["-0.1", "0.1"]);
        assert_eq!(outcome.weights, vec![vec![0.5, 0.5], vec![0.5, 0.5]]);
    }

    #[test]
    fn test_duplicate_zone_id_is_rejected() {
        let zones = vec![
            Zone::new("a", 4.5, 7.0, 4.0, 1.0),
            Zone::new("a", 4.5, 0.0, 4.0, 1.0),
            Zone::new("b", 4.5, 8.0, 5.0, 0.9),
        ];
        let config = CollapseConfig::default();
        // an inactive twin never reaches the outcome
        assert!(collapse_sources(&zones, &[], &config).is_ok());

        let zones = vec![
            Zone::new("a", 4.5, 7.0, 4.0, 1.0),
            Zone::new("b", 4.5, 8.0, 5.0, 0.9),
            Zone::new("a", 4.5, 7.5, 4.2, 1.0),
        ];
        let err = collapse_sources(&zones, &[], &config).unwrap_err();
        assert_eq!(
            err,
            CollapseError::DuplicateZone {
                zone_id: "a".to_string()
            }
        );
    }
}
