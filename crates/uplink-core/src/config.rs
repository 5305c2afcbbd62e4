//! uplink.toml configuration parser.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::Ipv4Cidr;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkConfig {
    pub firewall: FirewallConfig,
    pub probe: ProbeConfig,
    pub failover: FailoverConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Management endpoint of the firewall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallConfig {
    /// Host or host:port of the management interface.
    pub address: String,
    pub username: String,
    /// May be left empty and supplied through the environment instead.
    #[serde(default)]
    pub password: String,
    /// FDM ships with a self-signed certificate.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Host probed over the primary path.
    pub target: String,
    #[serde(default = "default_probe_count")]
    pub count: u32,
    /// ICMP payload size in bytes.
    #[serde(default = "default_probe_size")]
    pub size: u16,
    /// Per-packet reply timeout.
    #[serde(default = "default_probe_timeout")]
    pub timeout: String,
    pub max_latency_ms: f64,
    pub max_loss_percent: f64,
}

/// The backup route installed while the primary path is unhealthy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    pub route: Ipv4Cidr,
    pub gateway: Ipv4Addr,
    /// Hardware port name, e.g. `GigabitEthernet0/1`.
    pub interface: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_cycle_interval")]
    pub interval: String,
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_polls: default_max_polls(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: default_cycle_interval(),
            cycle_timeout: default_cycle_timeout(),
        }
    }
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

fn default_probe_count() -> u32 {
    10
}

fn default_probe_size() -> u16 {
    2
}

fn default_probe_timeout() -> String {
    "2s".to_string()
}

fn default_poll_interval() -> String {
    "8s".to_string()
}

fn default_max_polls() -> u32 {
    75
}

fn default_cycle_interval() -> String {
    "60s".to_string()
}

fn default_cycle_timeout() -> String {
    "15m".to_string()
}

impl FirewallConfig {
    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(30))
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(2))
    }
}

impl DeployConfig {
    pub fn poll_interval(&self) -> Duration {
        parse_duration(&self.poll_interval).unwrap_or(Duration::from_secs(8))
    }
}

impl ScheduleConfig {
    /// Period between cycles. Never zero.
    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval)
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs(60))
    }

    pub fn cycle_timeout(&self) -> Duration {
        parse_duration(&self.cycle_timeout).unwrap_or(Duration::from_secs(15 * 60))
    }
}

impl UplinkConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the semantic constraints serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        require_non_empty("firewall.address", &self.firewall.address)?;
        require_non_empty("firewall.username", &self.firewall.username)?;
        require_positive_duration("firewall.request_timeout", &self.firewall.request_timeout)?;

        require_non_empty("probe.target", &self.probe.target)?;
        if self.probe.count == 0 {
            return Err(invalid("probe.count", "must send at least one probe"));
        }
        require_positive_duration("probe.timeout", &self.probe.timeout)?;
        if self.probe.max_latency_ms.is_nan() || self.probe.max_latency_ms <= 0.0 {
            return Err(invalid("probe.max_latency_ms", "must be positive"));
        }
        let loss = self.probe.max_loss_percent;
        if loss.is_nan() || loss <= 0.0 || loss > 100.0 {
            return Err(invalid("probe.max_loss_percent", "must be in (0, 100]"));
        }

        require_non_empty("failover.interface", &self.failover.interface)?;

        require_positive_duration("deploy.poll_interval", &self.deploy.poll_interval)?;
        if self.deploy.max_polls == 0 {
            return Err(invalid("deploy.max_polls", "must allow at least one poll"));
        }

        require_positive_duration("schedule.interval", &self.schedule.interval)?;
        require_positive_duration("schedule.cycle_timeout", &self.schedule.cycle_timeout)?;
        Ok(())
    }

    /// Replace the password, typically with one taken from the environment.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.firewall.password = password.into();
        self
    }

    /// Starting point for a new `uplink.toml`.
    pub fn scaffold() -> Self {
        UplinkConfig {
            firewall: FirewallConfig {
                address: "192.0.2.10".to_string(),
                username: "admin".to_string(),
                password: String::new(),
                accept_invalid_certs: true,
                request_timeout: default_request_timeout(),
            },
            probe: ProbeConfig {
                target: "8.8.8.8".to_string(),
                count: default_probe_count(),
                size: default_probe_size(),
                timeout: default_probe_timeout(),
                max_latency_ms: 100.0,
                max_loss_percent: 20.0,
            },
            failover: FailoverConfig {
                route: Ipv4Cidr::DEFAULT_ROUTE,
                gateway: Ipv4Addr::new(203, 0, 113, 1),
                interface: "GigabitEthernet0/1".to_string(),
            },
            deploy: DeployConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.to_string(),
    }
}

fn require_non_empty(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(())
}

fn require_positive_duration(field: &'static str, value: &str) -> ConfigResult<()> {
    match parse_duration(value) {
        Some(d) if d.is_zero() => Err(invalid(field, "must be greater than zero")),
        Some(_) => Ok(()),
        None => Err(ConfigError::Invalid {
            field,
            message: format!("{value:?} is not a duration (e.g. \"500ms\", \"8s\", \"2m\")"),
        }),
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
