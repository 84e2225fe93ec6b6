use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};
use crate::types::DeploymentVariant;

/// Top-level configuration for the Parley application.
///
/// Loaded from `~/.parley/config.toml` by default. Every section falls back
/// to its defaults when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default = "default_deployments")]
    pub deployments: Vec<DeploymentConfig>,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            chat: ChatConfig::default(),
            remote: RemoteConfig::default(),
            deployments: default_deployments(),
        }
    }
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                info!("Configuration loaded from {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject configurations the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chat.history_window == 0 {
            return Err(ParleyError::Config(
                "chat.history_window must be at least 1".to_string(),
            ));
        }

        if self.deployments.is_empty() {
            return Err(ParleyError::Config(
                "at least one deployment must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for deployment in &self.deployments {
            if deployment.key.trim().is_empty() {
                return Err(ParleyError::Config(format!(
                    "deployment '{}' has an empty key",
                    deployment.name
                )));
            }
            if !seen.insert(deployment.name.as_str()) {
                return Err(ParleyError::Config(format!(
                    "duplicate deployment name '{}'",
                    deployment.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a configured deployment by its display name.
    pub fn deployment(&self, name: &str) -> Result<&DeploymentConfig> {
        self.deployments
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| ParleyError::UnknownDeployment(name.to_string()))
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Title shown at the top of the chat.
    pub app_title: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_title: "Rijksvastgoedbedrijf Chat".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Conversation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of most recent transcript entries submitted per turn.
    pub history_window: usize,
    /// Advisory shown when a send is attempted with missing inputs.
    pub missing_parameters_advisory: String,
    /// Advisory shown when the credential cannot reach the deployment.
    pub authorization_advisory: String,
    /// Largest image accepted for staging, in bytes.
    pub max_image_bytes: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: 20,
            missing_parameters_advisory: "Please provide all the necessary parameters".to_string(),
            authorization_advisory:
                "Please verify if this token has access to the deployment workspace".to_string(),
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Remote deployment API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the deployment API.
    pub base_url: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://my.orq.ai".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
        }
    }
}

/// A selectable deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Display name offered to the user.
    pub name: String,
    /// Remote deployment key.
    pub key: String,
    #[serde(default)]
    pub variant: DeploymentVariant,
}

fn default_deployments() -> Vec<DeploymentConfig> {
    vec![DeploymentConfig {
        name: "Markt Strategie Chat".to_string(),
        key: "rijkvastgoed-marktstrategie".to_string(),
        variant: DeploymentVariant::Tutor,
    }]
}
