use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use nightshift_core::config::ScheduleConfig;

use crate::cli::TargetArgs;

/// A tag selection the user asked for that cannot be resolved.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("unknown target '{name}' (known: {known})")]
    UnknownTarget { name: String, known: String },

    #[error("--tag-key and --tag-value must be given together")]
    IncompleteTag,
}

/// CLI configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Default region for every target
    #[serde(default)]
    pub region: Option<String>,

    /// Instances handled at once during alarm changes
    #[serde(default)]
    pub alarm_concurrency: Option<usize>,

    /// Named tag selections, e.g. `[targets.nightly]`
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub tag_key: String,
    pub tag_value: String,
    /// Region override for this target only
    #[serde(default)]
    pub region: Option<String>,
}

/// Fully resolved invocation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub tag_key: String,
    pub tag_value: String,
    pub region: String,
}

impl CliConfig {
    /// Return the default config file path: ~/.config/nightshift/config.toml
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("could not determine user config directory")?
            .join("nightshift");
        Ok(config_dir.join("config.toml"))
    }

    /// Load config from the given path, or the default path.
    /// Returns default config if the file does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };
        Self::load_from(&config_path)
    }

    fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            debug!(?config_path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        debug!(?config_path, "Loading config");
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config: {}", config_path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", config_path.display()))?;
        Ok(config)
    }

    /// Resolve tag and region for one invocation.
    ///
    /// Tag priority: explicit flags > named target > environment defaults.
    /// Region priority: --region > target region > config file > environment.
    pub fn resolve(
        &self,
        args: &TargetArgs,
        region_override: Option<&str>,
        env_region: &str,
        env_schedule: &ScheduleConfig,
    ) -> Result<Selection, SelectionError> {
        let target = match args.target.as_deref() {
            Some(name) => Some(self.targets.get(name).ok_or_else(|| {
                SelectionError::UnknownTarget {
                    name: name.to_string(),
                    known: self.target_names(),
                }
            })?),
            None => None,
        };

        let (tag_key, tag_value) = match (&args.tag_key, &args.tag_value, target) {
            (Some(k), Some(v), _) => (k.clone(), v.clone()),
            (Some(_), None, _) | (None, Some(_), _) => return Err(SelectionError::IncompleteTag),
            (None, None, Some(t)) => (t.tag_key.clone(), t.tag_value.clone()),
            (None, None, None) => (env_schedule.tag_key.clone(), env_schedule.tag_value.clone()),
        };

        let region = region_override
            .map(str::to_string)
            .or_else(|| target.and_then(|t| t.region.clone()))
            .or_else(|| self.region.clone())
            .unwrap_or_else(|| env_region.to_string());

        Ok(Selection {
            tag_key,
            tag_value,
            region,
        })
    }

    fn target_names(&self) -> String {
        if self.targets.is_empty() {
            return "none".to_string();
        }
        self.targets.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
