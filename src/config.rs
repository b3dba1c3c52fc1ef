use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryConfig;
use crate::model::graph::Direction;
use crate::model::Language;

/// Run configuration read from `.callflow.toml` / `callflow.toml`.
///
/// Every field is optional; command-line flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallflowConfig {
    pub skip_parse_errors: bool,
    pub quiet: bool,
    pub include_module_scope: bool,
    /// Keep only registered tasks and the calls between them.
    pub tasks_only: bool,
    /// Qualified-name fragments to filter the graph around.
    pub targets: Vec<String>,
    pub direction: Option<Direction>,
    pub max_depth: Option<usize>,
    /// Glob patterns excluded during directory discovery.
    pub exclude: Vec<String>,
    /// Extra extension to language mappings, e.g. `jsm = "javascript"`.
    pub languages: BTreeMap<String, Language>,
}

impl CallflowConfig {
    /// Discovery settings, with `extra_exclude` appended to the configured excludes.
    pub fn discovery_config(&self, extra_exclude: &[String]) -> DiscoveryConfig {
        let mut exclude = self.exclude.clone();
        exclude.extend(extra_exclude.iter().cloned());
        DiscoveryConfig {
            exclude,
            languages: self.languages.clone(),
        }
    }
}

/// Default config file names, searched in order.
const CONFIG_FILENAMES: &[&str] = &[".callflow.toml", "callflow.toml"];

/// Find the config file for a run.
///
/// If `config_override` is provided, use that path directly.
/// Otherwise, search for config files in `root`.
pub fn find_config_path(root: &Path, config_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(override_path) = config_override {
        if override_path.exists() {
            return Some(override_path.to_path_buf());
        }
        return None;
    }

    CONFIG_FILENAMES
        .iter()
        .map(|filename| root.join(filename))
        .find(|path| path.exists())
}

/// Load the configuration for a run, falling back to defaults when no file
/// exists. An explicit `config_override` that does not exist is an error.
pub fn load(root: &Path, config_override: Option<&Path>) -> Result<CallflowConfig> {
    match find_config_path(root, config_override) {
        Some(path) => load_config(&path),
        None => {
            if let Some(path) = config_override {
                bail!("config file not found: {}", path.display());
            }
            Ok(CallflowConfig::default())
        }
    }
}

/// Load and parse a config from a TOML file.
pub fn load_config(path: &Path) -> Result<CallflowConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse a config from a TOML string.
pub fn parse_config(toml_str: &str) -> Result<CallflowConfig> {
    let config: CallflowConfig = toml::from_str(toml_str)?;
    Ok(config)
}
