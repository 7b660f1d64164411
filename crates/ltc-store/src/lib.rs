pub mod config;
pub mod error;
pub mod json_bridge;
pub mod schema;
pub mod store;
pub mod tables;

pub use config::{DATA_DIR_ENV, RunConfig, data_dir, database_path, default_base_dir};
pub use error::{Result, StoreError};
pub use store::{RunSummary, Store};
pub use tables::{read_tree_tsv, read_zone_table, write_zone_table};
