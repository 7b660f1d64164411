use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::{Deserialize, Serialize};

use ltc_core::{CollapseConfig, DEFAULT_BIN_WIDTH, DEFAULT_SIG_FIGS, ModelOptions};

use crate::error::Result;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "LTC_DATA_DIR";

const DATABASE_FILE: &str = "runs.db";

/// Default base directory for all ltc storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".logic-tree-collapse")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// `$LTC_DATA_DIR`, falling back to [`default_base_dir`].
pub fn data_dir() -> PathBuf {
    env::var(DATA_DIR_ENV)
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(default_base_dir)
}

/// Run database inside a data directory, creating the directory if needed.
pub fn database_path(base: &Path) -> Result<PathBuf> {
    fs::create_dir_all(base)?;
    Ok(base.join(DATABASE_FILE))
}

/// Model filtering applied while reading a logic tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Model names dropped from every branch set.
    pub omit: Vec<String>,
    /// Whole-model substitutions, `old = "new"`.
    pub sub: BTreeMap<String, String>,
    /// Keep models that fail validation.
    pub skip_validation: bool,
    /// Filter the remaining tree after collapse. Collapsible branch sets
    /// are never filtered.
    pub filter_remaining: bool,
}

/// Settings for a collapse run, read from TOML:
///
/// ```toml
/// bin_width = 0.1
/// sig_figs = 5
///
/// [models]
/// filter_remaining = true
/// omit = ["Campbell2003"]
///
/// [models.sub]
/// Atkinson2006 = "AtkinsonBoore2006"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub bin_width: f64,
    pub sig_figs: usize,
    pub models: ModelsConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            bin_width: DEFAULT_BIN_WIDTH,
            sig_figs: DEFAULT_SIG_FIGS,
            models: ModelsConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn collapse_config(&self) -> CollapseConfig {
        CollapseConfig {
            bin_width: self.bin_width,
            sig_figs: self.sig_figs,
        }
    }

    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            prefix: None,
            validate: !self.models.skip_validation,
            omit: self.models.omit.clone(),
            sub: self.models.sub.clone(),
        }
    }
}
