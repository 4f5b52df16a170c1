//! Configuration for the linker service

use std::time::Duration;

use memlink_identity::IdentityScheme;
use serde::{Deserialize, Serialize};

/// Main linker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkerConfig {
    /// Link timeout and sweep cadence
    #[serde(default)]
    pub link: LinkConfig,

    /// Channel capacities
    #[serde(default)]
    pub channels: ChannelConfig,

    /// Message id assignment
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pending link timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Seconds a link may stay pending before it is reverted
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Interval between timeout sweeps, in milliseconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

impl LinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Never zero; `tokio::time::interval` rejects a zero period.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

/// Bounded channel sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Ledger confirmation inbox capacity
    #[serde(default = "default_confirmation_capacity")]
    pub confirmation_capacity: usize,

    /// Link event broadcast capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            confirmation_capacity: default_confirmation_capacity(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Identity assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub scheme: IdentityScheme,

    /// Prefix prepended to every assigned id
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            scheme: IdentityScheme::default(),
            prefix: default_prefix(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_timeout() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    500
}

fn default_confirmation_capacity() -> usize {
    1024
}

fn default_event_capacity() -> usize {
    256
}

fn default_prefix() -> String {
    "msg-".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LinkerConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `MEMLINK_`-prefixed environment variables (`__` between sections,
    /// e.g. `MEMLINK_LINK__TIMEOUT_SECS=5`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&LinkerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MEMLINK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
