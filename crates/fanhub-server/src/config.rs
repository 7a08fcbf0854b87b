//! Server configuration.

use std::time::Duration;

use fanhub_settings::FanhubSettings;

use crate::hub::{HubConfig, Payload};

/// Heartbeat source configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Tick period.
    pub interval: Duration,
    /// Text broadcast on every tick.
    pub payload: Payload,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            payload: Payload::from("Hello clients"),
        }
    }
}

/// Configuration for the fanhub server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Shared secret expected in the `API-KEY` header.
    pub api_key: String,
    /// Maximum concurrent connections (`0` = unlimited).
    pub max_connections: usize,
    /// How long shutdown waits for the dispatcher and heartbeat.
    pub shutdown_timeout: Duration,
    /// Hub tuning.
    pub hub: HubConfig,
    /// Heartbeat source, `None` when disabled.
    pub heartbeat: Option<HeartbeatConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            api_key: "poc".into(),
            max_connections: 0,
            shutdown_timeout: Duration::from_secs(10),
            hub: HubConfig::default(),
            heartbeat: Some(HeartbeatConfig::default()),
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &FanhubSettings) -> Self {
        let heartbeat = settings.heartbeat.enabled.then(|| HeartbeatConfig {
            interval: Duration::from_millis(settings.heartbeat.interval_ms),
            payload: Payload::from(settings.heartbeat.payload.as_str()),
        });
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            api_key: settings.server.api_key.clone(),
            max_connections: settings.server.max_connections,
            shutdown_timeout: Duration::from_millis(settings.server.shutdown_timeout_ms),
            hub: HubConfig::from_settings(&settings.hub),
            heartbeat,
        }
    }

    /// `host:port` string passed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
