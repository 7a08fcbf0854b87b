//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file only needs the keys it changes.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the fanhub server.
///
/// ```json
/// {
///   "server": { "port": 8080, "apiKey": "s3cret" },
///   "heartbeat": { "intervalMs": 500 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FanhubSettings {
    /// Listener and admission settings.
    pub server: ServerSettings,
    /// Broadcast dispatch settings.
    pub hub: HubSettings,
    /// Demonstration heartbeat traffic.
    pub heartbeat: HeartbeatSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl FanhubSettings {
    /// Reject combinations that would leave the hub unable to run.
    pub fn validate(&self) -> Result<()> {
        if self.hub.write_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "hub.writeTimeoutMs must be greater than zero".into(),
            ));
        }
        if self.hub.intake_capacity == Some(0) {
            return Err(SettingsError::InvalidValue(
                "hub.intakeCapacity must be greater than zero when set".into(),
            ));
        }
        if self.heartbeat.enabled && self.heartbeat.interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeat.intervalMs must be greater than zero".into(),
            ));
        }
        if self.server.api_key.is_empty() {
            return Err(SettingsError::InvalidValue(
                "server.apiKey must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Listener and admission settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` lets the OS pick an ephemeral port).
    pub port: u16,
    /// Shared secret expected in the `API-KEY` handshake header.
    pub api_key: String,
    /// Maximum concurrent connections (`0` = unlimited).
    pub max_connections: usize,
    /// How long shutdown waits for background tasks before aborting them.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            api_key: "poc".to_string(),
            max_connections: 0,
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// What a bounded intake queue does when a producer finds it full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Wait until the dispatcher frees a slot.
    #[default]
    Block,
    /// Discard the message being enqueued.
    DropNewest,
    /// Discard the oldest queued message to make room.
    DropOldest,
}

/// Broadcast dispatch settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Intake queue bound. `None` keeps the queue unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intake_capacity: Option<usize>,
    /// Policy applied when a bounded intake queue is full.
    pub overflow_policy: OverflowPolicy,
    /// Upper bound on a single write to one connection, in milliseconds.
    pub write_timeout_ms: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            intake_capacity: None,
            overflow_policy: OverflowPolicy::Block,
            write_timeout_ms: 5_000,
        }
    }
}

/// Demonstration heartbeat traffic.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// Whether the heartbeat source runs.
    pub enabled: bool,
    /// Tick period in milliseconds.
    pub interval_ms: u64,
    /// Text broadcast on every tick.
    pub payload: String,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1_000,
            payload: "Hello clients".to_string(),
        }
    }
}

/// Minimum log level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Output format of the stderr log layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human-readable output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level; `RUST_LOG` takes precedence when set.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}
