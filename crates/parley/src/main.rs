//! # parley
//!
//! Chat relay binary. Loads settings, starts the HTTP/WebSocket server and
//! runs until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use parley_server::{ChatServer, ServerConfig};
use parley_settings::{LogLevel, ParleySettings};

/// Parley chat relay.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Real-time chat relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file. Defaults to `$PARLEY_CONFIG` or `~/.parley/settings.json`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of messages retained for late joiners (overrides settings).
    #[arg(long)]
    history_capacity: Option<usize>,

    /// Minimum log level when `RUST_LOG` is unset (overrides settings).
    #[arg(long, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,
}

fn parse_log_level(val: &str) -> Result<LogLevel, String> {
    LogLevel::parse(val).ok_or_else(|| format!("unknown log level: {val}"))
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(parley_settings::settings_path)
    }

    /// Flags win over the settings file and env vars.
    fn apply(&self, settings: &mut ParleySettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(capacity) = self.history_capacity {
            settings.chat.history_capacity = capacity;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
    }
}

fn resolve_settings(cli: &Cli) -> Result<ParleySettings> {
    let path = cli.settings_path();
    let mut settings = parley_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    parley_settings::validate(&settings).context("Invalid command-line override")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = parley_core::logging::with_startup_logging(|| resolve_settings(&cli))?;

    parley_core::logging::init_subscriber(settings.logging.level.as_str(), settings.logging.json);

    if let Some(ref metrics_addr) = settings.metrics.listen_addr {
        let _ = parley_server::metrics::install_exporter(metrics_addr)
            .context("Failed to start metrics exporter")?;
    }

    let config = ServerConfig::from_settings(&settings);
    let server = ChatServer::new(config);
    let (addr, handle) = server.listen().await.context("Failed to start server")?;
    tracing::info!(
        history_capacity = settings.chat.history_capacity,
        max_connections = settings.server.max_connections,
        "Parley listening on http://{addr} (ws://{addr}/ws)"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.stop(handle).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_are_empty() {
        let cli = Cli::parse_from(["parley"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.config.is_none());
        assert!(cli.history_capacity.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn cli_custom_port() {
        let cli = Cli::parse_from(["parley", "--port", "8080"]);
        assert_eq!(cli.port, Some(8080));
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["parley", "--port", "70000"]).is_err());
    }

    #[test]
    fn cli_log_level_is_case_insensitive() {
        let cli = Cli::parse_from(["parley", "--log-level", "DEBUG"]);
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert!(Cli::try_parse_from(["parley", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn cli_config_path_is_used() {
        let cli = Cli::parse_from(["parley", "--config", "/tmp/parley.json"]);
        assert_eq!(cli.settings_path(), PathBuf::from("/tmp/parley.json"));
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "parley",
            "--host",
            "127.0.0.1",
            "--port",
            "5000",
            "--history-capacity",
            "10",
            "--log-level",
            "warn",
        ]);
        let mut settings = ParleySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.chat.history_capacity, 10);
        assert_eq!(settings.logging.level, LogLevel::Warn);
    }

    #[test]
    fn absent_flags_keep_settings() {
        let cli = Cli::parse_from(["parley"]);
        let mut settings = ParleySettings::default();
        settings.server.port = 4321;
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 4321);
        assert_eq!(settings.chat.history_capacity, 200);
    }

    #[test]
    fn resolve_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"chat": {"historyCapacity": 50}}"#).unwrap();
        let cli = Cli::parse_from(["parley", "--config", path.to_str().unwrap()]);
        let settings = resolve_settings(&cli).unwrap();
        assert_eq!(settings.chat.history_capacity, 50);
    }

    #[test]
    fn resolve_rejects_zero_history_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let cli = Cli::parse_from([
            "parley",
            "--config",
            path.to_str().unwrap(),
            "--history-capacity",
            "0",
        ]);
        assert!(resolve_settings(&cli).is_err());
    }

    #[test]
    fn resolve_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();
        let cli = Cli::parse_from(["parley", "--config", path.to_str().unwrap()]);
        assert!(resolve_settings(&cli).is_err());
    }
}
