use thiserror::Error;

/// Errors raised while evaluating or collapsing a logic tree.
///
/// Degenerate distributions and missing attribute references are not errors:
/// the former become null forks, the latter are substituted with zero.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollapseError {
    /// A symbolic model cannot be parsed or evaluated to numbers.
    #[error("malformed model `{expression}`: {reason}")]
    MalformedModel { expression: String, reason: String },

    /// A model has the wrong number of elements for its uncertainty type.
    #[error("{kind} model `{model}` has {found} elements instead of {expected}")]
    ModelCardinality {
        kind: String,
        model: String,
        expected: usize,
        found: usize,
    },

    /// A Gutenberg-Richter distribution violates its parameter constraints.
    #[error("invalid distribution: {reason}")]
    InvalidDistribution { reason: String },

    /// Branch weights cannot be normalized.
    #[error("invalid weights: {reason}")]
    InvalidWeights { reason: String },

    /// Two active zones share an id.
    #[error("duplicate zone id {zone_id}")]
    DuplicateZone { zone_id: String },

    /// Any of the above, raised while processing a specific zone.
    #[error("zone {zone_id}: {source}")]
    Zone {
        zone_id: String,
        source: Box<CollapseError>,
    },
}

impl CollapseError {
    pub(crate) fn in_zone(self, zone_id: &str) -> Self {
        CollapseError::Zone {
            zone_id: zone_id.to_string(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, CollapseError>;
