use std::fs;
use std::path::Path;

use uuid::Uuid;

use ltc_core::{DEFAULT_BIN_WIDTH, export_json, import_json};

use crate::error::{Result, StoreError};
use crate::store::Store;

impl Store {
    /// Import a JSON export file as a new run.
    pub fn import_json_file(&self, path: &Path) -> Result<Uuid> {
        let json = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        self.import_json_str(&json)
    }

    /// Import a JSON export string as a new run. The run's bin width is
    /// taken from its first zone.
    pub fn import_json_str(&self, json: &str) -> Result<Uuid> {
        let outcome = import_json(json)?;
        let bin_width = outcome
            .zones
            .first()
            .map(|z| z.mag_bin)
            .unwrap_or(DEFAULT_BIN_WIDTH);
        self.save_run(&outcome, bin_width)
    }

    pub fn export_json_file(&self, run_id: Uuid, path: &Path) -> Result<()> {
        let json = self.export_json_string(run_id)?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }

    pub fn export_json_string(&self, run_id: Uuid) -> Result<String> {
        let outcome = self.load_outcome(run_id)?;
        Ok(export_json(&outcome)?)
    }
}
