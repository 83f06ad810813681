use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    audit::DEFAULT_LOG_FILE, probe::DEFAULT_PROBE_TIMEOUT, scheduler::DEFAULT_CHECK_INTERVAL,
};

pub const CONFIG_PATH_ENV: &str = "PORTMON_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/service-portmon/config.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub server_address: String,
    pub ports: Vec<u16>,
    pub service_name: String,
    pub log_file: PathBuf,
    pub check_interval: Duration,
    pub probe_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} is required and must not be empty")]
    MissingField(&'static str),
    #[error("ports_to_check entry {0:?} is not a port between 1 and 65535")]
    InvalidPort(String),
    #[error("{0} must be greater than zero")]
    InvalidInterval(&'static str),
}

/// On-disk layout; ports are a comma-separated string.
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    server_address: Option<String>,
    ports_to_check: Option<String>,
    service_to_restart: Option<String>,
    log_file: Option<PathBuf>,
    check_interval_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
}

impl RawConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

impl MonitorConfig {
    pub fn config_path() -> PathBuf {
        env::var_os(CONFIG_PATH_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_raw(RawConfig::read(path)?)
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let log_file = raw
            .log_file()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
        let server_address = required(raw.server_address, "server_address")?;
        let ports = parse_ports(&required(raw.ports_to_check, "ports_to_check")?)?;
        let service_name = required(raw.service_to_restart, "service_to_restart")?;

        let check_interval = seconds(
            raw.check_interval_secs,
            DEFAULT_CHECK_INTERVAL,
            "check_interval_secs",
        )?;
        let probe_timeout = seconds(
            raw.probe_timeout_secs,
            DEFAULT_PROBE_TIMEOUT,
            "probe_timeout_secs",
        )?;

        Ok(Self {
            server_address,
            ports,
            service_name,
            log_file,
            check_interval,
            probe_timeout,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingField(field))
}

fn seconds(
    value: Option<u64>,
    default: Duration,
    field: &'static str,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(0) => Err(ConfigError::InvalidInterval(field)),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}

pub fn parse_ports(value: &str) -> Result<Vec<u16>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .map(|entry| match entry.parse::<u16>() {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(ConfigError::InvalidPort(entry.to_string())),
        })
        .collect()
}
