//! Configuration system for Briefsmith.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/briefsmith/config.toml` and/or
//! `.briefsmith/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefsmithConfig {
    pub refinement: RefinementConfig,
    pub evaluation: EvaluationConfig,
    pub output: OutputConfig,
}

/// Iteration budget and collaborator call settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Iterations allowed per knowledge node.
    pub iterations_per_node: usize,
    /// Ceiling used when the brief cannot be sized.
    pub fallback_max_iterations: usize,
    /// Deadline for each collaborator call. No deadline when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout_secs: Option<u64>,
    /// How many queries of one node may be researched at once.
    pub fan_out_concurrency: usize,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            iterations_per_node: crate::refinement::ITERATIONS_PER_NODE,
            fallback_max_iterations: crate::refinement::FALLBACK_MAX_ITERATIONS,
            call_timeout_secs: None,
            fan_out_concurrency: 4,
        }
    }
}

impl RefinementConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.iterations_per_node == 0 {
            warnings.push("iterations_per_node is 0; no node will ever be researched".to_string());
        }
        if self.fallback_max_iterations == 0 {
            warnings.push("fallback_max_iterations is 0".to_string());
        }
        if self.call_timeout_secs == Some(0) {
            warnings.push("call_timeout_secs is 0; every collaborator call will time out".to_string());
        }
        if self.fan_out_concurrency == 0 {
            warnings.push("fan_out_concurrency is 0; queries will run one at a time".to_string());
        }
        warnings
    }
}

/// Settings for the built-in saturation evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Facts scoring strictly above this count as significant.
    pub significance_threshold: u8,
    /// Fewer new significant facts than this in a pass saturates the node.
    pub min_new_significant: usize,
    pub saturation_fact_count: usize,
    pub max_follow_up_queries: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            significance_threshold: 5,
            min_new_significant: 2,
            saturation_fact_count: 12,
            max_follow_up_queries: 6,
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.significance_threshold >= crate::brief::MAX_SIGNIFICANCE {
            warnings.push(format!(
                "significance_threshold ({}) leaves no fact significant",
                self.significance_threshold
            ));
        }
        if self.min_new_significant == 0 {
            warnings.push(
                "min_new_significant is 0; nodes only saturate on saturation_fact_count"
                    .to_string(),
            );
        }
        if self.max_follow_up_queries == 0 {
            warnings.push("max_follow_up_queries is 0; one query will still be issued".to_string());
        }
        warnings
    }
}

/// Where run artifacts are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub pretty_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(".briefsmith"),
            pretty_json: true,
        }
    }
}

impl BriefsmithConfig {
    /// Human-readable warnings for suspicious settings, prefixed by section.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for w in self.refinement.validate() {
            warnings.push(format!("[refinement] {w}"));
        }
        for w in self.evaluation.validate() {
            warnings.push(format!("[evaluation] {w}"));
        }
        warnings
    }

    /// Reject settings that make a run impossible.
    pub fn ensure_runnable(&self) -> Result<(), ConfigError> {
        if self.refinement.iterations_per_node == 0 {
            return Err(ConfigError::Invalid {
                message: "refinement.iterations_per_node must be at least 1".to_string(),
            });
        }
        if self.refinement.fallback_max_iterations == 0 {
            return Err(ConfigError::Invalid {
                message: "refinement.fallback_max_iterations must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl From<Box<figment::Error>> for ConfigError {
    fn from(err: Box<figment::Error>) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "briefsmith", "briefsmith")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `BRIEFSMITH_`)
/// 3. Workspace-local config (`.briefsmith/config.toml`)
/// 4. User config (`~/.config/briefsmith/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&BriefsmithConfig>,
) -> Result<BriefsmithConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(BriefsmithConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".briefsmith").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // BRIEFSMITH_REFINEMENT__ITERATIONS_PER_NODE, BRIEFSMITH_OUTPUT__PRETTY_JSON, ...
    figment = figment.merge(Env::prefixed("BRIEFSMITH_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether any Briefsmith configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(dirs) = project_dirs()
        && dirs.config_dir().join("config.toml").exists()
    {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(".briefsmith").join("config.toml").exists())
}

/// Directory for rolling log files, if the platform has a data directory.
pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.data_dir().join("logs"))
}
