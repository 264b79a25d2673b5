use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONTROL_TIMEOUT_SECS, DEFAULT_DATA_TIMEOUT_SECS, DEFAULT_FTP_PORT, DEFAULT_HTTP_PORT,
};
use crate::core_policy::MatchMode;

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_port: Option<u16>, // Optional to allow default value
}

#[derive(Debug, Deserialize)]
pub struct FtpConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub timeout_secs: Option<u64>,
    pub data_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    /// Remote paths the gateway is allowed to serve.
    pub remote_paths: Vec<String>,
    /// Either "exact" or "prefix" (the default).
    pub path_match: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub root: String,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ftp: FtpConfig,
    pub proxy: ProxyConfig,
    pub cache: Option<CacheConfig>,
}

impl Config {
    pub fn listen_port(&self) -> u16 {
        self.server.listen_port.unwrap_or(DEFAULT_HTTP_PORT)
    }

    pub fn ftp_port(&self) -> u16 {
        self.ftp.port.unwrap_or(DEFAULT_FTP_PORT)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.ftp.timeout_secs.unwrap_or(DEFAULT_CONTROL_TIMEOUT_SECS))
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(
            self.ftp
                .data_timeout_secs
                .unwrap_or(DEFAULT_DATA_TIMEOUT_SECS),
        )
    }

    pub fn match_mode(&self) -> Result<MatchMode> {
        match self.proxy.path_match.as_deref() {
            None | Some("prefix") => Ok(MatchMode::Prefix),
            Some("exact") => Ok(MatchMode::Exact),
            Some(other) => bail!("Unknown path_match mode: {}", other),
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache.as_ref().map(|c| c.enabled).unwrap_or(false)
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path))?;
    let config: Config = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse configuration file: {}", path))?;

    if config.proxy.remote_paths.is_empty() {
        bail!("Configuration must allow at least one remote path");
    }
    // Fail early on a bad mode instead of at the first request.
    config.match_mode()?;

    Ok(config)
}
