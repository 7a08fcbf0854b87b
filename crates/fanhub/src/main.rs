//! # fanhub
//!
//! fanhub server binary: loads settings, initializes logging and metrics,
//! starts the WebSocket fan-out server and optional demo clients, then
//! waits for ctrl-c.

#![deny(unsafe_code)]

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use fanhub_server::config::ServerConfig;
use fanhub_server::server::HubServer;
use fanhub_settings::loader::parse_enum;
use fanhub_settings::{FanhubSettings, LogFormat, LogLevel};
use tracing::{info, warn};

/// Demo clients started when `--demo-clients` is not given.
const DEFAULT_DEMO_CLIENTS: usize = 5;

/// WebSocket fan-out hub.
#[derive(Parser, Debug)]
#[command(name = "fanhub", about = "WebSocket fan-out hub")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Shared secret clients must send in the `API-KEY` header.
    #[arg(long)]
    api_key: Option<String>,

    /// Settings file (defaults to `~/.fanhub/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum concurrent connections, 0 for unlimited.
    #[arg(long)]
    max_connections: Option<usize>,

    /// Number of demo clients to connect after startup (0 disables them).
    #[arg(long, default_value_t = DEFAULT_DEMO_CLIENTS)]
    demo_clients: usize,

    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    #[arg(long, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// Log output format (`compact` or `json`).
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    /// Disable the heartbeat broadcast.
    #[arg(long)]
    no_heartbeat: bool,
}

fn parse_log_level(val: &str) -> Result<LogLevel, String> {
    parse_enum(&val.to_lowercase()).ok_or_else(|| format!("unknown log level: {val}"))
}

fn parse_log_format(val: &str) -> Result<LogFormat, String> {
    parse_enum(&val.to_lowercase()).ok_or_else(|| format!("unknown log format: {val}"))
}

impl Cli {
    /// Load the settings file, then apply command-line overrides.
    fn resolve_settings(&self) -> Result<FanhubSettings> {
        let mut settings = match &self.config {
            Some(path) => {
                if !path.exists() {
                    bail!("settings file not found: {}", path.display());
                }
                fanhub_settings::load_settings_from_path(path)
                    .with_context(|| format!("failed to load settings from {}", path.display()))?
            }
            None => fanhub_settings::load_settings().context("failed to load settings")?,
        };
        self.apply_overrides(&mut settings);
        settings.validate().context("invalid settings")?;
        Ok(settings)
    }

    fn apply_overrides(&self, settings: &mut FanhubSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(key) = &self.api_key {
            settings.server.api_key.clone_from(key);
        }
        if let Some(max) = self.max_connections {
            settings.server.max_connections = max;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
        if self.no_heartbeat {
            settings.heartbeat.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;

    fanhub_logging::init_subscriber(&settings.logging);

    let mut server = HubServer::new(ServerConfig::from_settings(&settings));
    match fanhub_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics recorder not installed, /metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("failed to start server")?;
    info!("fanhub listening on ws://{addr}/ws");

    let demos = demo::spawn_demo_clients(
        cli.demo_clients,
        addr.port(),
        &settings.server.api_key,
        server.shutdown().token(),
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    server.shutdown().shutdown();
    let _ = handle.await;
    let _ = futures::future::join_all(demos).await;

    info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["fanhub"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert_eq!(cli.demo_clients, 5);
        assert!(!cli.no_heartbeat);

        let mut settings = FanhubSettings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings.server.port, 0);
        assert_eq!(settings.server.api_key, "poc");
        assert!(settings.heartbeat.enabled);
    }

    #[test]
    fn cli_overrides_win() {
        let cli = Cli::parse_from([
            "fanhub",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--api-key",
            "s3cret",
            "--max-connections",
            "5",
            "--log-level",
            "DEBUG",
            "--log-format",
            "json",
            "--no-heartbeat",
        ]);
        let mut settings = FanhubSettings::default();
        cli.apply_overrides(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.api_key, "s3cret");
        assert_eq!(settings.server.max_connections, 5);
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert!(!settings.heartbeat.enabled);
    }

    #[test]
    fn cli_demo_clients() {
        let cli = Cli::parse_from(["fanhub", "--demo-clients", "3"]);
        assert_eq!(cli.demo_clients, 3);
        let cli = Cli::parse_from(["fanhub", "--demo-clients", "0"]);
        assert_eq!(cli.demo_clients, 0);
    }

    #[test]
    fn cli_rejects_unknown_log_level() {
        assert!(Cli::try_parse_from(["fanhub", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn cli_rejects_out_of_range_port() {
        assert!(Cli::try_parse_from(["fanhub", "--port", "70000"]).is_err());
    }

    #[test]
    fn config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 9100}, "heartbeat": {"intervalMs": 250}}"#)
            .unwrap();

        let cli = Cli::parse_from(["fanhub", "--config", path.to_str().unwrap()]);
        let settings = cli.resolve_settings().unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.heartbeat.interval_ms, 250);
    }

    #[test]
    fn cli_beats_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 9100}}"#).unwrap();

        let cli = Cli::parse_from(["fanhub", "--config", path.to_str().unwrap(), "--port", "9200"]);
        assert_eq!(cli.resolve_settings().unwrap().server.port, 9200);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let cli = Cli::parse_from(["fanhub", "--config", path.to_str().unwrap()]);
        let err = cli.resolve_settings().unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn empty_api_key_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{}").unwrap();
        let cli = Cli::parse_from(["fanhub", "--config", path.to_str().unwrap(), "--api-key", ""]);
        assert!(cli.resolve_settings().is_err());
    }
}
