//! JSON serde for the collapse wire format.
//!
//! The wire format uses the camelCase column names of the zone and tree
//! tables (`occurRates`, `magBin`, `uncertaintyType`, ...). Extra zone
//! attributes and `applyTo*` tree attributes are flattened into their
//! objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::branch::BranchSet;
use crate::collapse::{CollapseOutcome, CollapsedZone};
use crate::error::CollapseError;
use crate::zone::{AttributeValue, Zone};

pub const CURRENT_VERSION: &str = "0.1.0";

#[derive(Error, Debug)]
pub enum WireError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid branch set in export: {0}")]
    Collapse(#[from] CollapseError),

    #[error("zone count {zones} does not match weight rows {weights}")]
    Shape { zones: usize, weights: usize },
}

// --- Wire format types ---

#[derive(Serialize, Deserialize, Debug)]
pub struct WireExport {
    pub version: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub zones: Vec<WireZone>,
    #[serde(default)]
    pub weights: Vec<Vec<f64>>,
    #[serde(rename = "remainingTree", default)]
    pub remaining_tree: Vec<WireBranchSet>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WireZone {
    pub id: String,
    pub mmin: f64,
    pub mmax: f64,
    pub a: f64,
    pub b: f64,
    #[serde(default)]
    pub stdb: f64,
    #[serde(default)]
    pub stdmmax: f64,
    #[serde(rename = "occurRates")]
    pub occur_rates: Vec<f64>,
    #[serde(rename = "magBin")]
    pub mag_bin: f64,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WireBranchSet {
    #[serde(rename = "uncertaintyType")]
    pub uncertainty_type: String,
    #[serde(rename = "uncertaintyModel")]
    pub uncertainty_model: String,
    #[serde(rename = "uncertaintyWeight", default)]
    pub uncertainty_weight: Vec<f64>,
    #[serde(flatten)]
    pub apply_to: BTreeMap<String, String>,
}

// --- Conversion: Wire → Domain ---

impl WireExport {
    pub fn into_outcome(self) -> Result<CollapseOutcome, WireError> {
        if !self.weights.is_empty() && self.weights.len() != self.zones.len() {
            return Err(WireError::Shape {
                zones: self.zones.len(),
                weights: self.weights.len(),
            });
        }
        let zones = self.zones.into_iter().map(wire_zone_to_domain).collect();
        let remaining = self
            .remaining_tree
            .into_iter()
            .map(BranchSet::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CollapseOutcome::from_parts(
            zones,
            remaining,
            self.weights,
            self.labels,
        ))
    }

    pub fn from_outcome(outcome: &CollapseOutcome) -> Self {
        WireExport {
            version: CURRENT_VERSION.to_string(),
            labels: outcome.labels.clone(),
            zones: outcome.zones.iter().map(domain_zone_to_wire).collect(),
            weights: outcome.weights.clone(),
            remaining_tree: outcome
                .remaining
                .iter()
                .map(WireBranchSet::from)
                .collect(),
        }
    }
}

fn wire_zone_to_domain(wire: WireZone) -> CollapsedZone {
    CollapsedZone {
        zone: Zone {
            id: wire.id,
            mmin: wire.mmin,
            mmax: wire.mmax,
            a: wire.a,
            b: wire.b,
            stdb: wire.stdb,
            stdmmax: wire.stdmmax,
            attributes: wire.attributes,
        },
        occur_rates: wire.occur_rates,
        mag_bin: wire.mag_bin,
    }
}

impl TryFrom<WireBranchSet> for BranchSet {
    type Error = CollapseError;

    fn try_from(wire: WireBranchSet) -> Result<Self, Self::Error> {
        let weights =
            (!wire.uncertainty_weight.is_empty()).then_some(wire.uncertainty_weight.as_slice());
        let mut branch_set =
            BranchSet::parse(&wire.uncertainty_type, &wire.uncertainty_model, weights)?;
        for (key, value) in &wire.apply_to {
            branch_set = branch_set.with_apply_to(key, value);
        }
        Ok(branch_set)
    }
}

fn domain_zone_to_wire(collapsed: &CollapsedZone) -> WireZone {
    let zone = &collapsed.zone;
    WireZone {
        id: zone.id.clone(),
        mmin: zone.mmin,
        mmax: zone.mmax,
        a: zone.a,
        b: zone.b,
        stdb: zone.stdb,
        stdmmax: zone.stdmmax,
        occur_rates: collapsed.occur_rates.clone(),
        mag_bin: collapsed.mag_bin,
        attributes: zone.attributes.clone(),
    }
}

impl From<&BranchSet> for WireBranchSet {
    fn from(branch_set: &BranchSet) -> Self {
        WireBranchSet {
            uncertainty_type: branch_set.kind().to_string(),
            uncertainty_model: branch_set.models().source().to_string(),
            uncertainty_weight: branch_set.weights().to_vec(),
            apply_to: branch_set.apply_to().clone(),
        }
    }
}

/// Deserialize a JSON export into a collapse outcome. Fork breakdowns are
/// not part of the wire format.
pub fn import_json(json: &str) -> Result<CollapseOutcome, WireError> {
    let wire: WireExport = serde_json::from_str(json)?;
    wire.into_outcome()
}

/// Serialize a collapse outcome to the JSON wire format.
pub fn export_json(outcome: &CollapseOutcome) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&WireExport::from_outcome(outcome))
}
