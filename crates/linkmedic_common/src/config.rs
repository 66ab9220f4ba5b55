//! Configuration management for linkmedic.
//!
//! Loads settings from /etc/linkmedic/config.toml or uses defaults. The
//! resulting `Config` is built once at startup and passed by reference to the
//! components that need it.

use crate::audit::default_audit_path;
use crate::detector::Thresholds;
use crate::error::ConfigError;
use crate::executor::ExecutorSettings;
use crate::whitelist::DEFAULT_INTERFACE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/linkmedic/config.toml";

/// Known driver faults handed to the diagnosis oracle as context
pub const KNOWN_WIFI_ISSUES: &str = "MediaTek MT7925 driver bugs:
1. RX rate drops to 6 Mbit/s while TX stays normal (576+ Mbit/s)
2. Recovery: interface reset (down/up) fixes it
";

/// Daemon loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Interface to watch
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Seconds between polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// Audit trail location (defaults to the per-user data directory)
    #[serde(default)]
    pub audit_path: Option<PathBuf>,

    /// Whitelist file; the built-in whitelist is used when unset
    #[serde(default)]
    pub whitelist_path: Option<PathBuf>,
}

fn default_interface() -> String {
    DEFAULT_INTERFACE.to_string()
}

fn default_poll_interval() -> f64 {
    10.0
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            poll_interval_secs: default_poll_interval(),
            audit_path: None,
            whitelist_path: None,
        }
    }
}

/// Decision gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Decisions must be strictly more confident than this to run
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Minimum seconds between attempts of the same action on the same
    /// interface. 0 disables.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_cooldown() -> u64 {
    crate::cooldown::DEFAULT_COOLDOWN_SECS
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            cooldown_secs: default_cooldown(),
        }
    }
}

/// Metrics sampler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Directory holding `<iface>/operstate`
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,

    /// Wireless statistics tool
    #[serde(default = "default_iw_path")]
    pub iw_path: String,

    /// Timeout for the statistics query
    #[serde(default = "default_sampler_timeout")]
    pub timeout_secs: u64,
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/class/net")
}

fn default_iw_path() -> String {
    "iw".to_string()
}

fn default_sampler_timeout() -> u64 {
    5
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            iw_path: default_iw_path(),
            timeout_secs: default_sampler_timeout(),
        }
    }
}

/// Which oracle backend answers diagnosis and decision calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleBackend {
    /// Local LLM served by Ollama
    Ollama,
    /// Deterministic rule-based classifier
    Rules,
}

/// Oracle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_backend")]
    pub backend: OracleBackend,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on a single diagnose/decide call
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_known_issues")]
    pub known_issues: String,
}

fn default_backend() -> OracleBackend {
    OracleBackend::Ollama
}

fn default_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_model() -> String {
    "qwen3:1.7b".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_oracle_timeout() -> u64 {
    60
}

fn default_known_issues() -> String {
    KNOWN_WIFI_ISSUES.to_string()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_oracle_timeout(),
            known_issues: default_known_issues(),
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub detector: Thresholds,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub executor: ExecutorSettings,

    #[serde(default)]
    pub oracle: OracleConfig,
}

impl Config {
    /// Load config from `explicit` if given, else from `CONFIG_PATH` if it
    /// exists, else defaults. The result is validated.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::load_from_path(path)?,
            None if Path::new(CONFIG_PATH).exists() => Self::load_from_path(Path::new(CONFIG_PATH))?,
            None => {
                warn!("Config not found at {}, using defaults", CONFIG_PATH);
                Config::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load config from a specific path (not validated)
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Reject settings that would make the pipeline unsafe or meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::InvalidSetting {
                key,
                reason: reason.into(),
            }
        }

        if self.daemon.interface.trim().is_empty() {
            return Err(invalid("daemon.interface", "must not be empty"));
        }
        self.poll_interval()?;
        let rx = self.detector.rx_threshold;
        if !rx.is_finite() || rx < 0.0 {
            return Err(invalid("detector.rx_threshold", "must be a non-negative number"));
        }
        let ratio = self.detector.ratio_threshold;
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(invalid("detector.ratio_threshold", "must be a positive number"));
        }
        let confidence = self.gate.confidence_threshold;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(invalid("gate.confidence_threshold", "must be within [0, 1]"));
        }
        if self.sampler.timeout_secs == 0 {
            return Err(invalid("sampler.timeout_secs", "must be positive"));
        }
        if self.executor.step_timeout_secs == 0 {
            return Err(invalid("executor.step_timeout_secs", "must be positive"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(invalid("oracle.timeout_secs", "must be positive"));
        }
        Ok(())
    }

    /// Poll interval as a `Duration`. Rejects values `Duration` cannot hold.
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        let secs = self.daemon.poll_interval_secs;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ConfigError::InvalidSetting {
                key: "daemon.poll_interval_secs",
                reason: "must be a positive number".to_string(),
            });
        }
        Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidSetting {
            key: "daemon.poll_interval_secs",
            reason: e.to_string(),
        })
    }

    /// Resolved audit trail location
    pub fn audit_path(&self) -> PathBuf {
        self.daemon
            .audit_path
            .clone()
            .unwrap_or_else(default_audit_path)
    }
}
