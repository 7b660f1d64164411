//! Integration tests exercising the full collapse pipeline:
//! parse tree → fork zones → collapse rates → export, across module boundaries.

use approx::assert_relative_eq;
use ltc_core::{
    BranchSet, CollapseConfig, CollapseError, Fork, TruncatedGr, Zone, branch_forks,
    collapse_sources, export_json, import_json, normalize_weights,
};

fn config() -> CollapseConfig {
    CollapseConfig::default()
}

fn reference_zone() -> Zone {
    Zone::new("ref", 4.5, 8.0, 5.0, 1.0).with_uncertainty(0.1, 0.3)
}

fn weight_sum(weights: &[f64]) -> f64 {
    weights.iter().sum()
}

/// Fork weights sum to one however many collapsible sets are stacked.
#[test]
fn fork_weights_sum_to_one() {
    let sets = [
        BranchSet::parse("bGRRelative", "['-stdb', 0, 'stdb']", Some(&[0.2, 0.6, 0.2])).unwrap(),
        BranchSet::parse("maxMagGRRelative", "[-0.2, 0.2]", Some(&[0.3, 0.7])).unwrap(),
        BranchSet::parse(
            "abGRAbsolute",
            "[['a', 'b'], ['a + 0.1', 'b'], ['a - 0.1', 'b']]",
            Some(&[1.0, 1.0, 1.0]),
        )
        .unwrap(),
    ];

    for depth in 1..=sets.len() {
        let outcome = collapse_sources(&[reference_zone()], &sets[..depth], &config()).unwrap();
        let weights = &outcome.weights[0];
        let expected_forks: usize = sets[..depth].iter().map(|s| s.models().len()).product();
        assert_eq!(weights.len(), expected_forks);
        assert_relative_eq!(weight_sum(weights), 1.0, epsilon = 1e-6);
    }
}

/// The collapsed vector is sized to the longest fork; shorter forks add zero
/// in the bins they do not reach.
#[test]
fn rate_vector_sized_to_longest_fork() {
    let zone = reference_zone();
    let tree = vec![
        BranchSet::parse("maxMagGRRelative", "[-0.5, 0, 0.5]", Some(&[0.25, 0.5, 0.25])).unwrap(),
    ];
    let outcome = collapse_sources(std::slice::from_ref(&zone), &tree, &config()).unwrap();
    let rates = &outcome.zones[0].occur_rates;

    let longest = TruncatedGr::new(4.5, 8.5, 5.0, 1.0, 0.1).unwrap();
    assert_eq!(rates.len(), longest.num_bins());
    assert_eq!(rates.len(), 40);

    // The top five bins are only reached by the +0.5 fork.
    let top = longest.rates();
    for bin in 35..40 {
        assert_relative_eq!(rates[bin], 0.25 * top[bin], max_relative = 1e-4);
    }

    let breakdown = outcome.breakdown("ref").unwrap();
    assert_eq!(breakdown.rates.num_bins(), 40);
    assert!(breakdown.rates.column(0)[30..].iter().all(|&r| r == 0.0));
    assert!(breakdown.rates.column(2)[39] > 0.0);
}

/// An attribute missing from the zone table evaluates as zero.
#[test]
fn missing_attribute_matches_explicit_zero() {
    let zone = reference_zone();
    let implicit = vec![BranchSet::parse("bGRRelative", "['stdx', 0.1]", None).unwrap()];
    let explicit = vec![BranchSet::parse("bGRRelative", "[0, 0.1]", None).unwrap()];

    let a = collapse_sources(std::slice::from_ref(&zone), &implicit, &config()).unwrap();
    let b = collapse_sources(std::slice::from_ref(&zone), &explicit, &config()).unwrap();
    assert_eq!(a.zones[0].occur_rates, b.zones[0].occur_rates);

    let with_column = zone.clone().with_attribute("stdx", 0.0);
    let c = collapse_sources(&[with_column], &implicit, &config()).unwrap();
    assert_eq!(a.zones[0].occur_rates, c.zones[0].occur_rates);
}

/// A branch driving mmax below one bin nulls its fork instead of failing.
#[test]
fn degenerate_branch_becomes_null_fork() {
    let zone = reference_zone();
    let tree = vec![
        BranchSet::parse("maxMagGRRelative", "[-3.5, 0]", Some(&[0.4, 0.6])).unwrap(),
        BranchSet::parse("bGRRelative", "[-0.1, 0.1]", None).unwrap(),
    ];
    let outcome = collapse_sources(std::slice::from_ref(&zone), &tree, &config()).unwrap();
    let breakdown = outcome.breakdown("ref").unwrap();

    assert_eq!(breakdown.rates.num_forks(), 4);
    assert_eq!(breakdown.null_forks(), 2);
    assert_relative_eq!(breakdown.total_weight(), 1.0, epsilon = 1e-6);
    assert_eq!(breakdown.labels[0], "-3.5, -0.1");

    // Only the surviving 60% contributes.
    let alone = collapse_sources(&[zone], &tree[1..], &config()).unwrap();
    for (got, full) in outcome.zones[0].occur_rates.iter().zip(&alone.zones[0].occur_rates) {
        assert_relative_eq!(*got, 0.6 * full, max_relative = 2e-4);
    }
}

/// Only a degenerate branch leaves an empty rate vector, not an error.
#[test]
fn all_null_forks_collapse_to_empty() {
    let tree = vec![BranchSet::parse("maxMagGRAbsolute", "[4.5]", None).unwrap()];
    let outcome = collapse_sources(&[reference_zone()], &tree, &config()).unwrap();
    assert!(outcome.zones[0].occur_rates.is_empty());
    assert_eq!(outcome.weights[0], vec![1.0]);
}

/// A tree without collapsible sets leaves zones unforked and the tree intact.
#[test]
fn passthrough_tree_is_unchanged() {
    let tree = vec![
        BranchSet::parse("gmpeModel", "['Toro2002', 'Campbell2003']", Some(&[0.5, 0.5]))
            .unwrap()
            .with_apply_to("applyToTectonicRegionType", "Stable Shallow Crust"),
        BranchSet::parse("sourceModel", "['areal.xml', 'smoothed.xml']", None).unwrap(),
    ];
    let zones = vec![reference_zone(), Zone::new("quiet", 4.5, 0.0, 5.0, 1.0)];
    let outcome = collapse_sources(&zones, &tree, &config()).unwrap();

    assert_eq!(outcome.remaining, tree);
    assert_eq!(outcome.zones.len(), 1);
    assert_eq!(outcome.weights, vec![vec![1.0]]);
    assert_eq!(outcome.labels, vec![String::new()]);

    let base = TruncatedGr::new(4.5, 8.0, 5.0, 1.0, 0.1).unwrap();
    let expected: Vec<f64> = base
        .rates()
        .iter()
        .map(|&r| ltc_core::limit_precision(r, 5))
        .collect();
    assert_eq!(outcome.zones[0].occur_rates, expected);
}

/// Three b-value forks agree at the minimum magnitude and fan out towards
/// the maximum.
#[test]
fn b_value_forks_pivot_on_min_mag() {
    let zone = reference_zone();
    let set = BranchSet::parse("bGRRelative", "[-0.1, 0.0, 0.1]", None).unwrap();
    let base = TruncatedGr::new(zone.mmin, zone.mmax, zone.a, zone.b, 0.1).unwrap();
    let forks = branch_forks(&[Fork::root(base)], &set, &zone).unwrap();

    assert_eq!(forks.len(), 3);
    let anchor = 10f64.powf(zone.a - zone.b * zone.mmin);
    for (fork, b) in forks.iter().zip([0.9, 1.0, 1.1]) {
        let mfd = fork.mfd.expect("b-value forks are never null");
        assert_relative_eq!(mfd.b_val, b, epsilon = 1e-12);
        assert_relative_eq!(mfd.cumulative_rate(zone.mmin), anchor, max_relative = 1e-12);
    }

    let outcome = collapse_sources(std::slice::from_ref(&zone), &[set], &config()).unwrap();
    let breakdown = outcome.breakdown("ref").unwrap();
    let spread = |bin: usize| {
        let row = breakdown.rates.row(bin);
        let max = row.iter().cloned().fold(f64::MIN, f64::max);
        let min = row.iter().cloned().fold(f64::MAX, f64::min);
        (max - min) / max
    };
    let last = breakdown.rates.num_bins() - 1;
    assert!(spread(last) > spread(0));
    assert!(spread(last) > 0.5, "forks should diverge near mmax");
    assert_eq!(breakdown.weights, vec![0.334, 0.333, 0.333]);
}

#[test]
fn weights_round_to_exact_sum() {
    let weights = normalize_weights(&[0.3333, 0.3334, 0.3333]).unwrap();
    let set = BranchSet::parse("bGRRelative", "[-0.1, 0, 0.1]", Some(&[0.3333, 0.3334, 0.3333]))
        .unwrap();
    assert_eq!(set.weights(), weights.as_slice());
    let millis: i64 = weights.iter().map(|w| (w * 1000.0).round() as i64).sum();
    assert_eq!(millis, 1000);
}

#[test]
fn failing_zone_aborts_run_with_zone_id() {
    let zones = vec![
        reference_zone(),
        Zone::new("steep", 4.5, 7.0, 3.0, 0.05),
    ];
    let tree = vec![BranchSet::parse("bGRRelative", "[-0.1, 0.1]", None).unwrap()];
    let err = collapse_sources(&zones, &tree, &config()).unwrap_err();
    match err {
        CollapseError::Zone { zone_id, source } => {
            assert_eq!(zone_id, "steep");
            assert!(matches!(*source, CollapseError::InvalidDistribution { .. }));
        }
        other => panic!("expected zone error, got {other:?}"),
    }
}

#[test]
fn text_attribute_is_malformed() {
    let zone = reference_zone().with_attribute("region", "craton");
    let tree = vec![BranchSet::parse("bGRRelative", "['region']", None).unwrap()];
    let err = collapse_sources(&[zone], &tree, &config()).unwrap_err();
    assert!(err.to_string().contains("zone ref: malformed model"));
}

#[test]
fn export_import_keeps_remaining_tree() {
    let tree = vec![
        BranchSet::parse("bGRRelative", "[-0.1, 0.1]", None).unwrap(),
        BranchSet::parse("gmpeModel", "['Toro2002']", None).unwrap(),
    ];
    let outcome = collapse_sources(&[reference_zone()], &tree, &config()).unwrap();
    let json = export_json(&outcome).unwrap();
    let imported = import_json(&json).unwrap();
    assert_eq!(imported.remaining, vec![tree[1].clone()]);
    assert_eq!(imported.labels, vec!["-0.1", "0.1"]);
}
