/// Default magnitude bin width for discretized rates
pub const DEFAULT_BIN_WIDTH: f64 = 0.1;

/// Significant figures kept in collapsed occurrence rates
pub const DEFAULT_SIG_FIGS: usize = 5;

/// Decimal places kept when evaluating symbolic models
pub const MODEL_DECIMALS: i32 = 6;

/// Decimal places kept in normalized branch weights
pub const WEIGHT_DECIMALS: i32 = 3;

/// Slack allowed when checking that a distribution spans at least one bin.
/// Magnitudes like 4.6 - 4.5 land a hair under 0.1 in binary floating point.
pub const BIN_TOLERANCE: f64 = 1e-9;

/// Separator between branch labels along a fork's path
pub const LABEL_SEPARATOR: &str = ", ";

/// Tree attribute naming the sources a branch set applies to
pub const APPLY_TO_SOURCES: &str = "applyToSources";

/// `applyToSources` value meaning every source in the model
pub const ALL_SOURCES: &str = "all";

/// Suffix marking the megathrust twin of a zone id
pub const MEGATHRUST_SUFFIX: &str = "m";
