use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::client::ClientOptions;
use crate::pool::RetryPolicy;
use crate::source::{Endpoint, ProbeConfig};

/// A quote server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Optional display name (e.g. "Shenzhen Telecom")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Host name or IP address
    pub host: String,

    /// TCP port (default: 7709)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    7709
}

impl HostEntry {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }
}

/// Which retry policy the pool runs with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Resilient,
    FailFast,
}

impl FromStr for PolicyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resilient" => Ok(PolicyKind::Resilient),
            "fail_fast" | "fail-fast" | "failfast" => Ok(PolicyKind::FailFast),
            other => anyhow::bail!("Unknown retry policy '{}'", other),
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Base policy: resilient or fail_fast
    #[serde(default)]
    pub policy: PolicyKind,

    /// Override the policy's retry budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Override the policy's pause between retries, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval_ms: Option<u64>,
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        let mut policy = match self.policy {
            PolicyKind::Resilient => RetryPolicy::resilient(),
            PolicyKind::FailFast => RetryPolicy::fail_fast(),
        };
        if let Some(max_retries) = self.max_retries {
            policy = policy.with_max_retries(max_retries);
        }
        if let Some(ms) = self.retry_interval_ms {
            policy = policy.with_retry_interval(Duration::from_millis(ms));
        }
        policy
    }
}

/// Client session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_true")]
    pub multithread_safe: bool,

    #[serde(default = "default_true")]
    pub heartbeat: bool,

    /// Heartbeat interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
}

fn default_true() -> bool {
    true
}

fn default_heartbeat_interval() -> u64 {
    10
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            multithread_safe: true,
            heartbeat: true,
            heartbeat_interval: default_heartbeat_interval(),
        }
    }
}

impl ClientSettings {
    pub fn to_options(&self) -> ClientOptions {
        ClientOptions {
            multithread_safe: self.multithread_safe,
            heartbeat: self.heartbeat,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval),
        }
    }
}

/// Latency probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Keep probing in the background while a pool is connected
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Probe interval in seconds
    #[serde(default = "default_probe_interval")]
    pub interval: u64,

    /// Connect timeout per probe in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_probe_interval() -> u64 {
    30
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_probe_interval(),
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl ProbeSettings {
    pub fn to_probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            enabled: self.enabled,
            interval: Duration::from_secs(self.interval),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Quote servers to choose from
    #[serde(default)]
    pub hosts: Vec<HostEntry>,

    /// Failover retry settings
    #[serde(default)]
    pub retry: RetrySettings,

    /// Client session settings
    #[serde(default)]
    pub client: ClientSettings,

    /// Latency probe settings
    #[serde(default)]
    pub probe: ProbeSettings,
}

impl Config {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configured hosts as endpoints, in file order
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.hosts.iter().map(HostEntry::endpoint).collect()
    }

    /// Check that the host list can back an active/standby pair and that
    /// enabled timers have non-zero periods
    pub fn validate(&self) -> Result<()> {
        if self.hosts.len() < 2 {
            anyhow::bail!(
                "At least two hosts are required (active and standby), found {}",
                self.hosts.len()
            );
        }

        let mut seen = HashSet::new();
        for entry in &self.hosts {
            if entry.host.trim().is_empty() {
                anyhow::bail!("Host entry with an empty host name");
            }
            if entry.port == 0 {
                anyhow::bail!("Host {} has port 0", entry.host);
            }
            if !seen.insert(entry.endpoint()) {
                anyhow::bail!("Duplicate host {}", entry.endpoint());
            }
        }

        if self.client.heartbeat && self.client.heartbeat_interval == 0 {
            anyhow::bail!("client.heartbeat_interval must be at least 1 second");
        }
        if self.probe.enabled && self.probe.interval == 0 {
            anyhow::bail!("probe.interval must be at least 1 second");
        }
        if self.probe.timeout_ms == 0 {
            anyhow::bail!("probe.timeout_ms must be greater than 0");
        }
        Ok(())
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// - HQPOOL_HOSTS (comma-separated `host:port` list)
/// - HQPOOL_RETRY_POLICY (optional, `resilient` or `fail_fast`)
/// - HQPOOL_MAX_RETRIES (optional)
/// - HQPOOL_RETRY_INTERVAL_MS (optional)
/// - HQPOOL_PROBE_TIMEOUT_MS (optional)
pub fn load_from_env() -> Result<Config> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let mut config = Config::new();

    let hosts_str =
        std::env::var("HQPOOL_HOSTS").context("HQPOOL_HOSTS environment variable not set")?;

    for item in hosts_str.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let endpoint: Endpoint = item
            .parse()
            .context(format!("Invalid host in HQPOOL_HOSTS: {}", item))?;
        config.hosts.push(HostEntry {
            name: None,
            host: endpoint.host,
            port: endpoint.port,
        });
    }

    if config.hosts.is_empty() {
        anyhow::bail!("HQPOOL_HOSTS contains no valid hosts");
    }

    if let Ok(policy) = std::env::var("HQPOOL_RETRY_POLICY") {
        config.retry.policy = policy.parse()?;
    }

    if let Ok(retries) = std::env::var("HQPOOL_MAX_RETRIES") {
        if let Ok(val) = retries.parse() {
            config.retry.max_retries = Some(val);
        }
    }

    if let Ok(interval) = std::env::var("HQPOOL_RETRY_INTERVAL_MS") {
        if let Ok(val) = interval.parse() {
            config.retry.retry_interval_ms = Some(val);
        }
    }

    if let Ok(timeout) = std::env::var("HQPOOL_PROBE_TIMEOUT_MS") {
        if let Ok(val) = timeout.parse() {
            config.probe.timeout_ms = val;
        }
    }

    Ok(config)
}

/// Load configuration from file or environment
///
/// Reads the YAML file when a path is given, otherwise falls back to
/// environment variables.
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config = match config_path {
        Some(path) => load_from_yaml(path)?,
        None => load_from_env()?,
    };
    config.validate()?;
    Ok(config)
}
