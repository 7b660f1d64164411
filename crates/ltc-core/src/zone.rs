use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Names of the attributes every zone carries as typed fields.
pub const CORE_ATTRIBUTES: [&str; 7] = ["id", "mmin", "mmax", "a", "b", "stdb", "stdmmax"];

/// A free-form zone attribute, as read from the zone table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Interpret a table cell: numeric when it parses as a float, text otherwise.
    pub fn from_cell(cell: &str) -> Self {
        match cell.trim().parse::<f64>() {
            Ok(v) => AttributeValue::Number(v),
            Err(_) => AttributeValue::Text(cell.to_string()),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Number(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Number(v) => write!(f, "{v}"),
            AttributeValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One seismic source zone with its Gutenberg-Richter parameters.
///
/// Zones are read-only during collapse. A zone with `mmax == 0` has no
/// seismicity and is skipped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub mmin: f64,
    pub mmax: f64,
    pub a: f64,
    pub b: f64,
    #[serde(default)]
    pub stdb: f64,
    #[serde(default)]
    pub stdmmax: f64,
    /// Extra columns that symbolic models may reference (`stda`, covariates, ...).
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Zone {
    pub fn new(id: impl Into<String>, mmin: f64, mmax: f64, a: f64, b: f64) -> Self {
        Self {
            id: id.into(),
            mmin,
            mmax,
            a,
            b,
            stdb: 0.0,
            stdmmax: 0.0,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_uncertainty(mut self, stdb: f64, stdmmax: f64) -> Self {
        self.stdb = stdb;
        self.stdmmax = stdmmax;
        self
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Whether the zone takes part in collapse.
    pub fn is_active(&self) -> bool {
        self.mmax != 0.0
    }

    /// Look up any attribute by name, typed fields included.
    pub fn get(&self, name: &str) -> Option<AttributeValue> {
        let value = match name {
            "id" => AttributeValue::Text(self.id.clone()),
            "mmin" => self.mmin.into(),
            "mmax" => self.mmax.into(),
            "a" => self.a.into(),
            "b" => self.b.into(),
            "stdb" => self.stdb.into(),
            "stdmmax" => self.stdmmax.into(),
            _ => return self.attributes.get(name).cloned(),
        };
        Some(value)
    }

    /// Every attribute name a symbolic model can resolve against this zone.
    pub fn attribute_names(&self) -> BTreeSet<String> {
        CORE_ATTRIBUTES
            .iter()
            .map(|s| s.to_string())
            .chain(self.attributes.keys().cloned())
            .collect()
    }

    /// Full `name=value` dump of the zone, for failure diagnostics.
    pub fn record(&self) -> String {
        let mut fields = vec![
            format!("id={}", self.id),
            format!("mmin={}", self.mmin),
            format!("mmax={}", self.mmax),
            format!("a={}", self.a),
            format!("b={}", self.b),
            format!("stdb={}", self.stdb),
            format!("stdmmax={}", self.stdmmax),
        ];
        fields.extend(self.attributes.iter().map(|(k, v)| format!("{k}={v}")));
        fields.join(", ")
    }
}
