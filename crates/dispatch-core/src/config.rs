use crate::error::{DispatchError, Result};
use crate::paths;
use crate::strategy::DEFAULT_MODEL_VERSION;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// OrchestrationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Upper bound on one whole flow run.
    #[serde(default = "default_flow_timeout")]
    pub flow_timeout_secs: u64,
    /// Also persist decision traces for runs that ended in an error.
    #[serde(default = "default_record_failed")]
    pub record_failed_traces: bool,
}

fn default_flow_timeout() -> u64 {
    15
}

fn default_record_failed() -> bool {
    true
}

impl OrchestrationConfig {
    pub fn flow_timeout(&self) -> Duration {
        Duration::from_secs(self.flow_timeout_secs)
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            flow_timeout_secs: default_flow_timeout(),
            record_failed_traces: default_record_failed(),
        }
    }
}

// ---------------------------------------------------------------------------
// StrategyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_model_version")]
    pub default_model_version: String,
}

fn default_model_version() -> String {
    DEFAULT_MODEL_VERSION.to_string()
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            default_model_version: default_model_version(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Role that grants platform-wide (tenant-less) scope.
    #[serde(default = "default_superuser_role")]
    pub superuser_role: String,
}

fn default_superuser_role() -> String {
    "platform_admin".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            superuser_role: default_superuser_role(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(DispatchError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
