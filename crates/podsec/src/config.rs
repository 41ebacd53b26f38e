use podsec_core::Operation;
use podsec_policy::strategy::user::DEFAULT_NON_ROOT_UID;
use podsec_policy::AdmissionOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RootError, RootResult};

/// Which admission plugin the binary runs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Per-container policy matching (default).
    #[default]
    Constraint,
    /// Rejects any pod that sets a container security context.
    Deny,
    /// Admits everything unchanged.
    Admit,
}

/// Configuration for the admission subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default)]
    pub plugin: PluginKind,

    /// Deny with every tried candidate's errors instead of only the last.
    #[serde(default)]
    pub report_all_candidate_errors: bool,

    /// Uid handed out by MustRunAsNonRoot when the caller gave none.
    #[serde(default = "default_non_root_fallback_uid")]
    pub non_root_fallback_uid: i64,

    /// Operations the plugin evaluates; others are admitted untouched.
    #[serde(default = "default_operations")]
    pub operations: Vec<Operation>,
}

fn default_non_root_fallback_uid() -> i64 {
    DEFAULT_NON_ROOT_UID
}

fn default_operations() -> Vec<Operation> {
    vec![Operation::Create, Operation::Update]
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            plugin: PluginKind::default(),
            report_all_candidate_errors: false,
            non_root_fallback_uid: default_non_root_fallback_uid(),
            operations: default_operations(),
        }
    }
}

impl AdmissionConfig {
    pub fn to_options(&self) -> AdmissionOptions {
        AdmissionOptions {
            operations: self.operations.clone(),
            report_all_candidate_errors: self.report_all_candidate_errors,
            non_root_fallback_uid: self.non_root_fallback_uid,
        }
    }
}

/// Top-level configuration for the podsec binary.
///
/// Loaded from a TOML file (typically `~/.podsec/config.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootConfig {
    /// Cluster state file used when a command does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_state: Option<PathBuf>,

    #[serde(default)]
    pub admission: AdmissionConfig,
}

/// Returns `$HOME/<suffix>` if HOME is available, otherwise `./<suffix>`.
fn dirs_or_default(suffix: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(suffix))
        .unwrap_or_else(|_| PathBuf::from(suffix))
}

impl RootConfig {
    /// Load configuration from a TOML file. If the file does not exist,
    /// returns a default configuration.
    pub fn load(path: &Path) -> RootResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: RootConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> RootResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RootError::Config(format!("TOML serialize error: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> RootResult<()> {
        if self.admission.non_root_fallback_uid <= 0 {
            return Err(RootError::Config(format!(
                "non_root_fallback_uid must be > 0, got {}",
                self.admission.non_root_fallback_uid
            )));
        }
        if self.admission.operations.is_empty() {
            return Err(RootError::Config(
                "operations must name at least one operation".into(),
            ));
        }
        Ok(())
    }

    /// Return the path to the default config file location.
    pub fn default_config_path() -> PathBuf {
        dirs_or_default(".podsec/config.toml")
    }
}
