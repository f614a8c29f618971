// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result, bail};
use log::{LevelFilter, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

pub const DEFAULT_ENGINE_BINARY: &str = "/usr/local/bin/xray";
const DEFAULT_CONFIG_FILE: &str = "/etc/enginesup/enginesup.yaml";

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_engine_binary() -> String {
    DEFAULT_ENGINE_BINARY.to_string()
}

fn default_process_name() -> String {
    "xray".to_string()
}

fn default_engine_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_engine_port() -> u16 {
    61000
}

fn default_api_port() -> u16 {
    3000
}

fn default_supervisor_url() -> String {
    "http://127.0.0.1:61002/RPC2".to_string()
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/var/lib/enginesup/engine.json")
}

fn default_health_attempts() -> u32 {
    crate::health::DEFAULT_ATTEMPTS
}

fn default_health_delay_ms() -> u64 {
    2000
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_kill_grace_ms() -> u64 {
    1000
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Skip restarts when the running configuration is unchanged.
    #[serde(default = "default_true")]
    pub config_equal_checking: bool,
    #[serde(default = "default_engine_binary")]
    pub engine_binary: String,
    #[serde(default = "default_process_name")]
    pub process_name: String,
    #[serde(default = "default_engine_ip")]
    pub engine_ip: String,
    #[serde(default = "default_engine_port")]
    pub engine_port: u16,
    /// Port of the control API in front of the supervisor. Only shown in the
    /// start-up banner.
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_supervisor_url")]
    pub supervisor_url: String,
    #[serde(default)]
    pub supervisor_username: Option<String>,
    #[serde(default)]
    pub supervisor_password: Option<String>,
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,
    #[serde(default = "default_health_attempts")]
    pub health_attempts: u32,
    #[serde(default = "default_health_delay_ms")]
    pub health_delay_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            config_equal_checking: true,
            engine_binary: default_engine_binary(),
            process_name: default_process_name(),
            engine_ip: default_engine_ip(),
            engine_port: default_engine_port(),
            api_port: default_api_port(),
            supervisor_url: default_supervisor_url(),
            supervisor_username: None,
            supervisor_password: None,
            config_path: default_config_path(),
            health_attempts: default_health_attempts(),
            health_delay_ms: default_health_delay_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            kill_grace_ms: default_kill_grace_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (or `DD_ENGINESUP_CONFIG`, or the default
    /// location), then apply environment overrides. A missing file is not an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("DD_ENGINESUP_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };

        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::from_yaml(&contents).with_context(|| format!("parsing {}", path.display()))?
        } else {
            warn!(
                "config file not found at {}, using defaults and environment",
                path.display()
            );
            Self::default()
        };

        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(ip) = lookup("XTLS_IP") {
            self.engine_ip = ip;
        }
        if let Some(port) = lookup("XTLS_PORT") {
            self.engine_port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid XTLS_PORT: {port:?}"))?;
        }
        if let Some(flag) = lookup("CONFIG_EQUAL_CHECKING") {
            // Anything but "true" turns the check off.
            self.config_equal_checking = flag.trim() == "true";
        }
        if let Some(level) = lookup("DD_ENGINESUP_LOG_LEVEL") {
            self.log_level = level;
        }
        self.log_level_filter()?;
        Ok(())
    }

    pub fn log_level_filter(&self) -> Result<LevelFilter> {
        match self.log_level.to_lowercase().as_str() {
            "off" => Ok(LevelFilter::Off),
            "error" => Ok(LevelFilter::Error),
            "warn" | "warning" => Ok(LevelFilter::Warn),
            "info" => Ok(LevelFilter::Info),
            "debug" => Ok(LevelFilter::Debug),
            "trace" => Ok(LevelFilter::Trace),
            other => bail!("invalid log level: {other:?}"),
        }
    }

    pub fn status_url(&self) -> String {
        format!("http://{}:{}/debug/vars", self.engine_ip, self.engine_port)
    }

    pub fn health_delay(&self) -> Duration {
        Duration::from_millis(self.health_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}
