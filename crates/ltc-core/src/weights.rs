//! Branch weight normalization and model filtering.

use std::collections::BTreeMap;

use crate::branch::{BranchSet, UncertaintyKind};
use crate::constants::WEIGHT_DECIMALS;
use crate::error::{CollapseError, Result};
use crate::expression::parse_expr;
use crate::precision::round_decimals;

/// Normalize weights to sum to one, rounded to three decimals.
///
/// The first weight absorbs the rounding residue so the rounded weights sum
/// to exactly 1.000.
pub fn normalize_weights(raw: &[f64]) -> Result<Vec<f64>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(bad) = raw.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(CollapseError::InvalidWeights {
            reason: format!("weight {bad} is not a non-negative number"),
        });
    }
    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        return Err(CollapseError::InvalidWeights {
            reason: format!("weights {raw:?} sum to zero"),
        });
    }

    let mut weights: Vec<f64> = raw
        .iter()
        .map(|w| round_decimals(w / total, WEIGHT_DECIMALS))
        .collect();
    let rest: f64 = weights[1..].iter().sum();
    weights[0] = round_decimals(1.0 - rest, WEIGHT_DECIMALS);
    Ok(weights)
}

/// Weights for `count` models: the given ones when they line up with the
/// models, uniform otherwise.
pub fn default_weights(weights: Option<&[f64]>, count: usize) -> Vec<f64> {
    match weights {
        Some(w) if w.len() == count => w.to_vec(),
        Some(w) => {
            tracing::warn!(
                weights = w.len(),
                models = count,
                "weight count does not match model count, using equal weights"
            );
            vec![1.0; count]
        }
        None => vec![1.0; count],
    }
}

/// Options for [`models_with_weights`].
#[derive(Clone, Debug, Default)]
pub struct ModelOptions {
    /// Prepended to model names in log messages, e.g. the branch set id.
    pub prefix: Option<String>,
    /// Drop models that fail validation for their uncertainty type.
    pub validate: bool,
    /// Models to drop by name.
    pub omit: Vec<String>,
    /// Whole-model substitutions, applied before omission.
    pub sub: BTreeMap<String, String>,
}

impl ModelOptions {
    pub fn validated() -> Self {
        Self {
            validate: true,
            ..Self::default()
        }
    }

    fn name(&self, index: usize, model: &str) -> String {
        let name = format!("model {} \"{model}\"", index + 1);
        match &self.prefix {
            Some(prefix) => format!("{prefix} {name}"),
            None => name,
        }
    }
}

/// Pair models with weights after substitution, omission and validation,
/// renormalizing the survivors.
///
/// `source_exists` decides whether a `sourceModel` branch names an existing
/// source model file; the caller owns the filesystem.
pub fn models_with_weights(
    kind: &UncertaintyKind,
    models: &[String],
    weights: Option<&[f64]>,
    options: &ModelOptions,
    source_exists: impl Fn(&str) -> bool,
) -> Result<Vec<(String, f64)>> {
    let weights = default_weights(weights, models.len());

    let mut pairs: Vec<(usize, String, f64)> = models
        .iter()
        .zip(weights)
        .enumerate()
        .map(|(i, (model, weight))| {
            let model = match options.sub.get(model) {
                Some(replacement) => {
                    tracing::info!("substituting {replacement} for {model}");
                    replacement.clone()
                }
                None => model.clone(),
            };
            (i, model, weight)
        })
        .collect();

    pairs.retain(|(i, model, _)| {
        let keep = !options.omit.contains(model);
        if !keep {
            tracing::info!("omitting {}", options.name(*i, model));
        }
        keep
    });

    if options.validate {
        pairs.retain(|(i, model, _)| match validate_model(kind, model, &source_exists) {
            Ok(()) => true,
            Err(reason) => {
                tracing::warn!("{} {reason}, omitting", options.name(*i, model));
                false
            }
        });
    }

    let raw: Vec<f64> = pairs.iter().map(|(_, _, w)| *w).collect();
    let normalized = normalize_weights(&raw)?;
    Ok(pairs
        .into_iter()
        .zip(normalized)
        .map(|((_, model, _), weight)| (model, weight))
        .collect())
}

/// Run [`models_with_weights`] over every branch set of a tree.
///
/// Branch sets left without any model are dropped; untouched branch sets are
/// kept verbatim.
pub fn filter_tree(
    tree: &[BranchSet],
    options: &ModelOptions,
    source_exists: impl Fn(&str) -> bool,
) -> Result<Vec<BranchSet>> {
    let mut out = Vec::with_capacity(tree.len());
    for (i, branch_set) in tree.iter().enumerate() {
        let options = ModelOptions {
            prefix: Some(format!("branch set {}", i + 1)),
            ..options.clone()
        };
        let models = branch_set.models().labels();
        let pairs = models_with_weights(
            branch_set.kind(),
            &models,
            Some(branch_set.weights()),
            &options,
            &source_exists,
        )?;
        if pairs.is_empty() {
            tracing::warn!(
                uncertainty = %branch_set.kind(),
                "branch set {} has no models left, dropping it",
                i + 1
            );
            continue;
        }

        let (names, weights): (Vec<String>, Vec<f64>) = pairs.into_iter().unzip();
        if names == models && weights == branch_set.weights() {
            out.push(branch_set.clone());
            continue;
        }
        let mut filtered = BranchSet::parse(
            branch_set.kind().as_str(),
            &format!("[{}]", names.join(", ")),
            Some(&weights),
        )?;
        for (key, value) in branch_set.apply_to() {
            filtered = filtered.with_apply_to(key, value);
        }
        out.push(filtered);
    }
    Ok(out)
}

fn validate_model(
    kind: &UncertaintyKind,
    model: &str,
    source_exists: &impl Fn(&str) -> bool,
) -> std::result::Result<(), String> {
    if let Some(required) = kind.model_length() {
        let expr = parse_expr(model).map_err(|e| e.to_string())?;
        let size = expr.size();
        if size != required {
            return Err(format!("has {size} elements instead of {required}"));
        }
        return Ok(());
    }
    match kind {
        UncertaintyKind::Other(name) if name == "sourceModel" && !source_exists(model) => {
            Err("not found".to_string())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_rounding_residue() {
        let weights = normalize_weights(&[0.3333, 0.3334, 0.3333]).unwrap();
        assert_eq!(weights, vec![0.334, 0.333, 0.333]);
        let total: f64 = weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-12, "sum was {total}");
    }

    #[test]
    fn test_normalize_unnormalized_input() {
        let weights = normalize_weights(&[1.0, 1.0, 2.0]).unwrap();
        assert_eq!(weights, vec![0.25, 0.25, 0.5]);
    }

    #[test]
    fn test_normalize_thirds() {
        let weights = normalize_weights(&[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(weights, vec![0.334, 0.333, 0.333]);
    }

    #[test]
    fn test_normalize_rejects_bad_weights() {
        assert!(normalize_weights(&[0.5, -0.1]).is_err());
        assert!(normalize_weights(&[0.0, 0.0]).is_err());
        assert!(normalize_weights(&[f64::NAN]).is_err());
        assert_eq!(normalize_weights(&[]).unwrap(), Vec::<f64>::new());
    }

    #[test]
    fn test_default_weights() {
        assert_eq!(default_weights(None, 3), vec![1.0; 3]);
        assert_eq!(default_weights(Some(&[0.2, 0.8]), 3), vec![1.0; 3]);
        assert_eq!(default_weights(Some(&[0.2, 0.8]), 2), vec![0.2, 0.8]);
    }

    #[test]
    fn test_models_with_weights_uniform() {
        let models = strings(&["-0.1", "0", "0.1"]);
        let pairs = models_with_weights(
            &UncertaintyKind::BGrRelative,
            &models,
            None,
            &ModelOptions::validated(),
            |_| true,
        )
        .unwrap();
        let weights: Vec<f64> = pairs.iter().map(|(_, w)| *w).collect();
        assert_eq!(weights, vec![0.334, 0.333, 0.333]);
    }

    #[test]
    fn test_models_with_weights_drops_wrong_size() {
        let models = strings(&["[4.0, 1.0]", "[4.2]", "[4.4, 0.9]"]);
        let pairs = models_with_weights(
            &UncertaintyKind::AbGrAbsolute,
            &models,
            Some(&[0.25, 0.5, 0.25]),
            &ModelOptions::validated(),
            |_| true,
        )
        .unwrap();
        assert_eq!(
            pairs,
            vec![("[4.0, 1.0]".to_string(), 0.5), ("[4.4, 0.9]".to_string(), 0.5)]
        );
    }

    #[test]
    fn test_models_with_weights_omit_and_sub() {
        let options = ModelOptions {
            prefix: Some("bs1".into()),
            omit: strings(&["Campbell2003"]),
            sub: [("Atkinson2006".to_string(), "AtkinsonBoore2006".to_string())]
                .into_iter()
                .collect(),
            ..ModelOptions::default()
        };
        let models = strings(&["Atkinson2006", "Campbell2003", "Toro2002"]);
        let pairs = models_with_weights(
            &UncertaintyKind::from("gmpeModel"),
            &models,
            None,
            &options,
            |_| true,
        )
        .unwrap();
        let names: Vec<&str> = pairs.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(names, vec!["AtkinsonBoore2006", "Toro2002"]);
        assert_eq!(pairs[0].1 + pairs[1].1, 1.0);
    }

    #[test]
    fn test_models_with_weights_missing_source_model() {
        let models = strings(&["a.xml", "b.xml"]);
        let pairs = models_with_weights(
            &UncertaintyKind::from("sourceModel"),
            &models,
            None,
            &ModelOptions::validated(),
            |path| path == "b.xml",
        )
        .unwrap();
        assert_eq!(pairs, vec![("b.xml".to_string(), 1.0)]);
    }

    #[test]
    fn test_models_with_weights_all_omitted() {
        let models = strings(&["x"]);
        let options = ModelOptions {
            omit: strings(&["x"]),
            ..ModelOptions::default()
        };
        let pairs =
            models_with_weights(&UncertaintyKind::from("gmpeModel"), &models, None, &options, |_| true)
                .unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_filter_tree() {
        let tree = vec![
            BranchSet::parse("gmpeModel", "['Atkinson2006', 'Campbell2003', 'Toro2002']", None)
                .unwrap()
                .with_apply_to("applyToTectonicRegionType", "Stable Shallow Crust"),
            BranchSet::parse("bGRRelative", "[-0.1, 0.1]", None).unwrap(),
            BranchSet::parse("gmpeModel", "['Campbell2003']", None).unwrap(),
        ];
        let options = ModelOptions {
            omit: strings(&["Campbell2003"]),
            sub: [("Atkinson2006".to_string(), "AtkinsonBoore2006".to_string())]
                .into_iter()
                .collect(),
            ..ModelOptions::validated()
        };
        let filtered = filter_tree(&tree, &options, |_| true).unwrap();

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].models().labels(), vec!["AtkinsonBoore2006", "Toro2002"]);
        assert_eq!(filtered[0].weights(), &[0.501, 0.499]);
        assert_eq!(
            filtered[0].apply_to()["applyToTectonicRegionType"],
            "Stable Shallow Crust"
        );
        assert_eq!(filtered[1], tree[1]);
    }

    proptest! {
        #[test]
        fn normalized_weights_sum_to_one(raw in prop::collection::vec(0.01f64..10.0, 1..12)) {
            let weights = normalize_weights(&raw).unwrap();
            let total: f64 = weights.iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-9, "sum {}", total);
            prop_assert_eq!(weights.len(), raw.len());
        }
    }
}
