//! Configuration module for the sensor gateway.
//!
//! Same CLI/TOML merge idiom as the teacher: `clap` for the command line,
//! an optional TOML file for anything CLI doesn't cover, CLI taking
//! precedence. The numeric tunables from the original's `config.h`
//! (`TIMEOUT`, `SET_MIN_TEMP`, `SET_MAX_TEMP`, `MAX_CONN`,
//! `STORAGE_INIT_ATTEMPTS`) stay compile-time constants here; only the
//! port and the three file-system paths are runtime-configurable.

use crate::error::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Original's `TIMEOUT`: idle-connection and shutdown-quiescence window.
pub const TIMEOUT_SECS: u64 = 5;
/// Original's `SET_MIN_TEMP` / `SET_MAX_TEMP`.
pub const SET_MIN_TEMP: f64 = 15.0;
pub const SET_MAX_TEMP: f64 = 25.0;
/// Original's `MAX_CONN`.
pub const MAX_CONN: usize = 5;
/// Original's `STORAGE_INIT_ATTEMPTS`.
pub const STORAGE_INIT_ATTEMPTS: u32 = 3;

const MIN_PORT: u32 = 1024;
const MAX_PORT: u32 = 65535;

/// Command-line arguments for the gateway.
#[derive(Parser, Debug)]
#[command(name = "sensor-gateway")]
#[command(author = "sensor-gateway authors")]
#[command(version = "0.1.0")]
#[command(about = "Sensor-telemetry gateway", long_about = None)]
pub struct CliArgs {
    /// TCP port to listen on, 1024-65535.
    pub port: u32,

    /// Path to TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the room/sensor registry file.
    #[arg(short, long)]
    pub registry: Option<PathBuf>,

    /// Path to the SQLite database file.
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// Path to the audit log file.
    #[arg(short, long)]
    pub log: Option<PathBuf>,
}

/// TOML configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_registry_path")]
    pub registry: PathBuf,
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    #[serde(default = "default_log_path")]
    pub log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            registry: default_registry_path(),
            database: default_database_path(),
            log: default_log_path(),
        }
    }
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("room_sensor.map")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("gateway.db")
}

fn default_log_path() -> PathBuf {
    PathBuf::from("gateway.log")
}

/// Final resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub registry_path: PathBuf,
    pub database_path: PathBuf,
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub min_temp: f64,
    pub max_temp: f64,
    pub max_connections: usize,
    pub storage_init_attempts: u32,
}

impl Config {
    /// Build a `Config` from already-parsed CLI args, merging in an
    /// optional TOML file. Kept separate from argument *parsing* so
    /// `main` can intercept `clap`'s own parse failures and print the
    /// spec's one-line usage instead of clap's multi-line help.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        if !(MIN_PORT..=MAX_PORT).contains(&cli.port) {
            return Err(ConfigError::PortOutOfRange(cli.port));
        }

        let toml_config = if let Some(ref path) = cli.config {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        Ok(Config {
            port: cli.port as u16,
            registry_path: cli.registry.unwrap_or(toml_config.paths.registry),
            database_path: cli.database.unwrap_or(toml_config.paths.database),
            log_path: cli.log.unwrap_or(toml_config.paths.log),
            timeout: Duration::from_secs(TIMEOUT_SECS),
            min_temp: SET_MIN_TEMP,
            max_temp: SET_MAX_TEMP,
            max_connections: MAX_CONN,
            storage_init_attempts: STORAGE_INIT_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_out_of_range_is_rejected() {
        let cli = CliArgs {
            port: 80,
            config: None,
            registry: None,
            database: None,
            log: None,
        };
        assert!(matches!(
            Config::from_args(cli),
            Err(ConfigError::PortOutOfRange(80))
        ));
    }

    #[test]
    fn defaults_apply_without_toml() {
        let cli = CliArgs {
            port: 5000,
            config: None,
            registry: None,
            database: None,
            log: None,
        };
        let config = Config::from_args(cli).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.registry_path, PathBuf::from("room_sensor.map"));
        assert_eq!(config.max_connections, MAX_CONN);
    }

    #[test]
    fn cli_paths_override_toml_defaults() {
        let cli = CliArgs {
            port: 5000,
            config: None,
            registry: Some(PathBuf::from("/tmp/custom.map")),
            database: None,
            log: None,
        };
        let config = Config::from_args(cli).unwrap();
        assert_eq!(config.registry_path, PathBuf::from("/tmp/custom.map"));
    }

    #[test]
    fn toml_parsing() {
        let toml_str = r#"
            [paths]
            registry = "/etc/gateway/rooms.map"
            database = "/var/lib/gateway/readings.db"
            log = "/var/log/gateway.log"
        "#;
        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.paths.registry, PathBuf::from("/etc/gateway/rooms.map"));
        assert_eq!(config.paths.database, PathBuf::from("/var/lib/gateway/readings.db"));
    }
}
