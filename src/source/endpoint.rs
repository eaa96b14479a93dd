use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Address of one quote server.
///
/// Two endpoints are the same server only when both host and port match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form accepted by `TcpStream::connect`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Error returned when parsing `host:port` fails
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EndpointParseError {
    #[error("Missing port in endpoint: {0}")]
    MissingPort(String),

    #[error("Missing host in endpoint: {0}")]
    MissingHost(String),

    #[error("Invalid port in endpoint: {0}")]
    InvalidPort(String),
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError::MissingPort(s.to_string()))?;

        if host.is_empty() {
            return Err(EndpointParseError::MissingHost(s.to_string()));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| EndpointParseError::InvalidPort(s.to_string()))?;
        if port == 0 {
            return Err(EndpointParseError::InvalidPort(s.to_string()));
        }

        Ok(Endpoint::new(host, port))
    }
}

/// Latest probe measurements for one endpoint
#[derive(Debug)]
pub struct EndpointHealth {
    /// The endpoint being measured
    pub endpoint: Endpoint,

    /// Connect latency of the last successful probe, in microseconds
    latency_us: AtomicU64,

    /// Whether the last probe connected
    reachable: AtomicBool,

    /// Consecutive failed probes (reset on success)
    failure_count: AtomicU32,

    /// Number of completed probes
    probe_count: AtomicU32,

    /// Timestamp of last probe
    last_probe: RwLock<Option<Instant>>,
}

impl EndpointHealth {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            latency_us: AtomicU64::new(u64::MAX),
            reachable: AtomicBool::new(false),
            failure_count: AtomicU32::new(0),
            probe_count: AtomicU32::new(0),
            last_probe: RwLock::new(None),
        }
    }

    /// Record a probe that connected after `latency`
    pub fn record_success(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_us.store(micros, Ordering::Relaxed);
        self.reachable.store(true, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.mark_probed();
    }

    /// Record a probe that could not connect
    pub fn record_failure(&self) {
        self.latency_us.store(u64::MAX, Ordering::Relaxed);
        self.reachable.store(false, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.mark_probed();
    }

    fn mark_probed(&self) {
        self.probe_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_probe.write() {
            *last = Some(Instant::now());
        }
    }

    /// Latency of the last successful probe, `None` if unreachable
    pub fn latency(&self) -> Option<Duration> {
        match self.latency_us.load(Ordering::Relaxed) {
            u64::MAX => None,
            micros => Some(Duration::from_micros(micros)),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// True once at least one probe has completed
    pub fn is_measured(&self) -> bool {
        self.probe_count.load(Ordering::Relaxed) > 0
    }

    /// Time since the last probe
    pub fn time_since_last_probe(&self) -> Option<Duration> {
        self.last_probe
            .read()
            .ok()
            .and_then(|last| last.map(|at| at.elapsed()))
    }
}
