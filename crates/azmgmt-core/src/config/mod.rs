//! Pipeline configuration
//!
//! Configuration is plain serde data with per-field defaults, so a partial
//! TOML document only overrides what it names:
//!
//! ```toml
//! user_agent = "my-tool/1.0"
//! log_level = "basic"
//!
//! [retry]
//! max_attempts = 5
//!
//! [throttling]
//! default_wait_secs = 60
//! ```

pub mod resilience;

pub use resilience::{PollingConfig, RegistrationConfig, RetryConfig, ThrottlingConfig};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// How much of each HTTP exchange the logging policy records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpLogDetailLevel {
    /// Nothing is logged
    #[default]
    None,
    /// Method, URL, status and latency
    Basic,
    /// Basic plus headers (Authorization redacted)
    Headers,
    /// Headers plus truncated bodies
    Body,
}

/// Top-level configuration for a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub throttling: ThrottlingConfig,

    #[serde(default)]
    pub registration: RegistrationConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    /// Suffix appended to the default `User-Agent`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub log_level: HttpLogDetailLevel,

    /// Per-attempt transport timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            throttling: ThrottlingConfig::default(),
            registration: RegistrationConfig::default(),
            polling: PollingConfig::default(),
            user_agent: None,
            log_level: HttpLogDetailLevel::None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

impl PipelineConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid TOML: {}", e)))
    }

    /// Load configuration from a TOML file; a missing file yields defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
