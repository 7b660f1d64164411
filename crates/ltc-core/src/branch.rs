//! Logic-tree branch sets and their application to a zone's forks.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::LABEL_SEPARATOR;
use crate::error::{CollapseError, Result};
use crate::expression::{ModelList, ModelValue};
use crate::mfd::{MfdModification, TruncatedGr};
use crate::weights::{default_weights, normalize_weights};
use crate::zone::Zone;

/// The uncertainty axis a branch set describes.
///
/// The four magnitude/rate kinds are collapsible; anything else (GMPE
/// choice, source model choice, ...) passes through to the remaining tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UncertaintyKind {
    BGrRelative,
    MaxMagGrRelative,
    MaxMagGrAbsolute,
    AbGrAbsolute,
    Other(String),
}

/// The collapsible subset of [`UncertaintyKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollapsibleKind {
    BGrRelative,
    MaxMagGrRelative,
    MaxMagGrAbsolute,
    AbGrAbsolute,
}

impl UncertaintyKind {
    pub fn as_str(&self) -> &str {
        match self {
            UncertaintyKind::BGrRelative => "bGRRelative",
            UncertaintyKind::MaxMagGrRelative => "maxMagGRRelative",
            UncertaintyKind::MaxMagGrAbsolute => "maxMagGRAbsolute",
            UncertaintyKind::AbGrAbsolute => "abGRAbsolute",
            UncertaintyKind::Other(name) => name.as_str(),
        }
    }

    pub fn collapsible(&self) -> Option<CollapsibleKind> {
        match self {
            UncertaintyKind::BGrRelative => Some(CollapsibleKind::BGrRelative),
            UncertaintyKind::MaxMagGrRelative => Some(CollapsibleKind::MaxMagGrRelative),
            UncertaintyKind::MaxMagGrAbsolute => Some(CollapsibleKind::MaxMagGrAbsolute),
            UncertaintyKind::AbGrAbsolute => Some(CollapsibleKind::AbGrAbsolute),
            UncertaintyKind::Other(_) => None,
        }
    }

    pub fn is_collapsible(&self) -> bool {
        self.collapsible().is_some()
    }

    /// Elements per model for collapsible kinds.
    pub fn model_length(&self) -> Option<usize> {
        self.collapsible().map(CollapsibleKind::model_length)
    }

    pub fn is_max_mag(&self) -> bool {
        matches!(
            self,
            UncertaintyKind::MaxMagGrRelative | UncertaintyKind::MaxMagGrAbsolute
        )
    }
}

impl From<&str> for UncertaintyKind {
    fn from(s: &str) -> Self {
        match s.trim() {
            "bGRRelative" => UncertaintyKind::BGrRelative,
            "maxMagGRRelative" => UncertaintyKind::MaxMagGrRelative,
            "maxMagGRAbsolute" => UncertaintyKind::MaxMagGrAbsolute,
            "abGRAbsolute" => UncertaintyKind::AbGrAbsolute,
            other => UncertaintyKind::Other(other.to_string()),
        }
    }
}

impl From<String> for UncertaintyKind {
    fn from(s: String) -> Self {
        UncertaintyKind::from(s.as_str())
    }
}

impl From<UncertaintyKind> for String {
    fn from(kind: UncertaintyKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for UncertaintyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CollapsibleKind {
    pub fn model_length(self) -> usize {
        match self {
            CollapsibleKind::AbGrAbsolute => 2,
            _ => 1,
        }
    }

    fn name(self) -> &'static str {
        match self {
            CollapsibleKind::BGrRelative => "bGRRelative",
            CollapsibleKind::MaxMagGrRelative => "maxMagGRRelative",
            CollapsibleKind::MaxMagGrAbsolute => "maxMagGRAbsolute",
            CollapsibleKind::AbGrAbsolute => "abGRAbsolute",
        }
    }

    /// Turn one evaluated model into the modification it stands for.
    pub fn modification(self, value: &ModelValue) -> Result<MfdModification> {
        let values = value.values();
        if values.len() != self.model_length() {
            return Err(CollapseError::ModelCardinality {
                kind: self.name().to_string(),
                model: value.to_string(),
                expected: self.model_length(),
                found: values.len(),
            });
        }
        Ok(match self {
            CollapsibleKind::BGrRelative => MfdModification::IncrementB(values[0]),
            CollapsibleKind::MaxMagGrRelative => MfdModification::IncrementMaxMag(values[0]),
            CollapsibleKind::MaxMagGrAbsolute => MfdModification::SetMaxMag(values[0]),
            CollapsibleKind::AbGrAbsolute => MfdModification::SetAb {
                a: values[0],
                b: values[1],
            },
        })
    }
}

/// One row of the symbolic logic tree.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchSet {
    kind: UncertaintyKind,
    models: ModelList,
    weights: Vec<f64>,
    apply_to: BTreeMap<String, String>,
}

impl BranchSet {
    /// Build a branch set, defaulting missing or mismatched weights to equal
    /// and normalizing them to sum to one.
    pub fn new(kind: UncertaintyKind, models: ModelList, weights: Option<&[f64]>) -> Result<Self> {
        if models.is_empty() {
            return Err(CollapseError::MalformedModel {
                expression: models.source().to_string(),
                reason: "branch set has no models".to_string(),
            });
        }
        let weights = normalize_weights(&default_weights(weights, models.len()))?;
        Ok(Self {
            kind,
            models,
            weights,
            apply_to: BTreeMap::new(),
        })
    }

    /// Parse the model cell and build the branch set in one go.
    ///
    /// Models of collapsible kinds are expressions; any other kind lists
    /// opaque names.
    pub fn parse(kind: &str, models: &str, weights: Option<&[f64]>) -> Result<Self> {
        let kind = UncertaintyKind::from(kind);
        let models = if kind.is_collapsible() {
            ModelList::parse(models)?
        } else {
            ModelList::parse_names(models)
        };
        Self::new(kind, models, weights)
    }

    /// Attach a pass-through attribute such as `applyToTectonicRegionType`.
    pub fn with_apply_to(mut self, key: &str, value: &str) -> Self {
        self.apply_to.insert(key.to_string(), value.to_string());
        self
    }

    pub fn kind(&self) -> &UncertaintyKind {
        &self.kind
    }

    pub fn models(&self) -> &ModelList {
        &self.models
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn apply_to(&self) -> &BTreeMap<String, String> {
        &self.apply_to
    }

    pub fn is_collapsible(&self) -> bool {
        self.kind.is_collapsible()
    }

    /// Evaluate this branch set's models for a zone.
    ///
    /// `None` for non-collapsible kinds, which leave forks untouched.
    pub fn resolve_for(&self, zone: &Zone) -> Result<Option<Vec<ResolvedBranch>>> {
        let Some(kind) = self.kind.collapsible() else {
            return Ok(None);
        };

        let resolved = self.models.resolve(&zone.attribute_names());
        let values = resolved.evaluate(zone)?;

        values
            .iter()
            .zip(&self.weights)
            .zip(resolved.labels())
            .map(|((value, &weight), label)| {
                Ok(ResolvedBranch {
                    modification: kind.modification(value)?,
                    weight,
                    label,
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

/// One model of a branch set bound to a zone's values.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedBranch {
    pub modification: MfdModification,
    pub weight: f64,
    pub label: String,
}

/// One combination of branch choices for a zone.
///
/// `mfd` is `None` once a max-magnitude branch left no room for a bin; the
/// fork keeps its weight and label and contributes zero rate.
#[derive(Clone, Debug, PartialEq)]
pub struct Fork {
    pub mfd: Option<TruncatedGr>,
    pub weight: f64,
    pub label: String,
}

impl Fork {
    /// The unbranched starting fork for a zone.
    pub fn root(mfd: TruncatedGr) -> Self {
        Self {
            mfd: Some(mfd),
            weight: 1.0,
            label: String::new(),
        }
    }
}

fn join_label(parent: &str, label: &str) -> String {
    if parent.is_empty() {
        label.to_string()
    } else {
        format!("{parent}{LABEL_SEPARATOR}{label}")
    }
}

/// Cross every fork with every resolved branch, parent-major.
pub fn apply_branches(forks: &[Fork], branches: &[ResolvedBranch]) -> Result<Vec<Fork>> {
    let mut out = Vec::with_capacity(forks.len() * branches.len());
    for fork in forks {
        for branch in branches {
            let mfd = match &fork.mfd {
                Some(mfd) => mfd.apply(&branch.modification)?,
                None => None,
            };
            out.push(Fork {
                mfd,
                weight: fork.weight * branch.weight,
                label: join_label(&fork.label, &branch.label),
            });
        }
    }
    Ok(out)
}

/// Apply one branch set to a zone's forks. Non-collapsible branch sets are
/// the identity.
pub fn branch_forks(forks: &[Fork], branch_set: &BranchSet, zone: &Zone) -> Result<Vec<Fork>> {
    match branch_set.resolve_for(zone)? {
        Some(branches) => apply_branches(forks, &branches),
        None => Ok(forks.to_vec()),
    }
}
