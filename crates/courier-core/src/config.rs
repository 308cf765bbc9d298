use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CourierError, Result};

/// Top-level configuration for a Courier client.
///
/// Loaded from `~/.courier/config.toml` by default. Every section falls
/// back to its defaults when absent, so an empty file is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
}

impl CourierConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CourierConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
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
        let content =
            toml::to_string_pretty(self).map_err(|e| CourierError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the durable queue database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.courier/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Remote chat service and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL of the reply service; `/api/chat` is appended.
    pub base_url: String,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Total attempts for transport-level failures.
    pub max_attempts: u32,
    /// Backoff before retry `n` is `backoff_base_ms * 2^(n-1)`.
    pub backoff_base_ms: u64,
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            timeout_ms: 30_000,
            max_attempts: 3,
            backoff_base_ms: 1_000,
        }
    }
}

/// Offline queue limits and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of items held at once.
    pub max_size: usize,
    /// Fraction of `max_size` at which a warning is raised.
    pub warning_ratio: f64,
    /// Key under which the queue is persisted.
    pub storage_key: String,
}

impl QueueConfig {
    /// Item count at which the near-capacity warning fires.
    pub fn warning_threshold(&self) -> usize {
        let ratio = self.warning_ratio.clamp(0.0, 1.0);
        ((self.max_size as f64) * ratio).ceil() as usize
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            warning_ratio: 0.9,
            storage_key: "courier.offline_queue".to_string(),
        }
    }
}

/// Auto-dismiss defaults per notification kind. Errors never auto-dismiss
/// unless the caller passes an explicit duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub success_ms: u64,
    pub warning_ms: u64,
    pub info_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            success_ms: 3_000,
            warning_ms: 5_000,
            info_ms: 5_000,
        }
    }
}

/// Speech side-effect settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Consecutive failures before switching to text-only mode.
    pub failure_threshold: u32,
    /// Default voice when the agent does not specify one.
    pub voice_id: String,
    /// Default language tag.
    pub language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            voice_id: "default".to_string(),
            language: "en-US".to_string(),
        }
    }
}

/// Agent listing cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub cache_ttl_secs: u64,
}

impl AgentsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
        }
    }
}
