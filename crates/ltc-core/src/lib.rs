//! Logic-tree collapse engine for seismic source models.
//!
//! Folds the magnitude/rate uncertainty branches of a symbolic source logic
//! tree (b-value, maximum magnitude, a/b pairs) into one weighted
//! discretized occurrence-rate vector per zone, leaving the rest of the tree
//! for hazard calculations.
//!
//! Zero I/O. Tables, persistence and the CLI live in sibling crates.

pub mod branch;
pub mod collapse;
pub mod constants;
pub mod error;
pub mod expand;
pub mod expression;
pub mod mfd;
pub mod precision;
pub mod serde_compat;
pub mod weights;
pub mod zone;

pub use branch::{
    BranchSet, CollapsibleKind, Fork, ResolvedBranch, UncertaintyKind, apply_branches,
    branch_forks,
};
pub use collapse::{
    CollapseConfig, CollapseOutcome, CollapsedZone, ForkBreakdown, RateMatrix, collapse_sources,
    collapse_zone, partition_tree,
};
pub use constants::{DEFAULT_BIN_WIDTH, DEFAULT_SIG_FIGS};
pub use error::{CollapseError, Result};
pub use expand::expand_sources;
pub use expression::{Expr, ModelList, ModelValue, ResolvedModels, parse_expr};
pub use mfd::{MfdModification, TruncatedGr};
pub use precision::{limit_precision, limit_precision_all, round_decimals};
pub use serde_compat::{CURRENT_VERSION, WireBranchSet, WireError, export_json, import_json};
pub use weights::{ModelOptions, filter_tree, models_with_weights, normalize_weights};
pub use zone::{AttributeValue, Zone};
