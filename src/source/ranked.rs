use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::endpoint::{Endpoint, EndpointHealth};
use super::{EndpointSource, SourceError};

/// Configuration for latency probing
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Whether the background refresh task runs after `setup`
    pub enabled: bool,
    /// Interval between background probe rounds
    pub interval: Duration,
    /// Timeout for a single TCP connect probe
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(1),
        }
    }
}

/// Endpoint source that ranks servers by measured TCP connect latency
///
/// Unreachable endpoints are left out of the ranking until a later probe
/// reaches them again.
pub struct LatencyRankedSource {
    /// Endpoints being measured
    endpoints: Arc<Vec<EndpointHealth>>,
    /// Probe configuration
    config: ProbeConfig,
    /// Background refresh task, present between setup and teardown
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl LatencyRankedSource {
    pub fn new(endpoints: Vec<Endpoint>, config: ProbeConfig) -> Self {
        Self {
            endpoints: Arc::new(endpoints.into_iter().map(EndpointHealth::new).collect()),
            config,
            refresher: Mutex::new(None),
        }
    }

    /// Probe every endpoint once, in parallel
    pub async fn probe_all(&self) -> Result<(), SourceError> {
        Self::probe_round(&self.endpoints, self.config.timeout).await
    }

    async fn probe_round(
        endpoints: &Arc<Vec<EndpointHealth>>,
        timeout: Duration,
    ) -> Result<(), SourceError> {
        let mut handles = Vec::with_capacity(endpoints.len());

        for idx in 0..endpoints.len() {
            let endpoints = Arc::clone(endpoints);
            handles.push(tokio::spawn(async move {
                Self::check_endpoint(&endpoints[idx], timeout).await;
            }));
        }

        for handle in handles {
            handle.await?;
        }
        Ok(())
    }

    /// Probe one endpoint and record the measurement
    async fn check_endpoint(health: &EndpointHealth, timeout: Duration) {
        match Self::probe(&health.endpoint, timeout).await {
            Ok(latency) => {
                health.record_success(latency);
                debug!(
                    endpoint = %health.endpoint,
                    latency_ms = latency.as_millis() as u64,
                    "Probe OK"
                );
            }
            Err(e) => {
                health.record_failure();
                debug!(
                    endpoint = %health.endpoint,
                    error = %e,
                    failures = health.failure_count(),
                    "Probe failed"
                );
            }
        }
    }

    /// Time a TCP connect to the endpoint
    async fn probe(endpoint: &Endpoint, timeout: Duration) -> std::io::Result<Duration> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect(endpoint.address())).await {
            Ok(Ok(_stream)) => Ok(start.elapsed()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            )),
        }
    }

    /// Reachable endpoints ordered by latency, ties kept in configured order
    pub fn rank(&self) -> Vec<Endpoint> {
        let mut reachable: Vec<(Duration, &Endpoint)> = self
            .endpoints
            .iter()
            .filter_map(|h| h.latency().map(|latency| (latency, &h.endpoint)))
            .collect();
        reachable.sort_by_key(|(latency, _)| *latency);
        reachable.into_iter().map(|(_, ep)| ep.clone()).collect()
    }

    fn is_measured(&self) -> bool {
        self.endpoints.iter().any(|h| h.is_measured())
    }

    /// Start the background refresh task, replacing any previous one
    fn start_refresher(&self) {
        if !self.config.enabled {
            info!("Endpoint probing disabled - rankings refresh only on demand");
            return;
        }

        let endpoints = Arc::clone(&self.endpoints);
        let interval = self.config.interval;
        let timeout = self.config.timeout;

        let handle = tokio::spawn(async move {
            info!(
                interval_secs = interval.as_secs(),
                endpoints = endpoints.len(),
                "Endpoint prober started"
            );
            loop {
                sleep(interval).await;
                let start = Instant::now();
                if let Err(e) = Self::probe_round(&endpoints, timeout).await {
                    warn!(error = %e, "Probe round failed");
                }
                debug!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Probe round completed"
                );
            }
        });

        if let Ok(mut slot) = self.refresher.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    fn stop_refresher(&self) {
        if let Ok(mut slot) = self.refresher.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
                info!("Endpoint prober stopped");
            }
        }
    }

    /// Get measurements for all endpoints
    pub fn health_stats(&self) -> Vec<EndpointHealthStats> {
        self.endpoints
            .iter()
            .map(|health| EndpointHealthStats {
                endpoint: health.endpoint.clone(),
                latency: health.latency(),
                reachable: health.is_reachable(),
                failure_count: health.failure_count(),
                last_probe: health.time_since_last_probe(),
            })
            .collect()
    }
}

impl Drop for LatencyRankedSource {
    fn drop(&mut self) {
        self.stop_refresher();
    }
}

#[async_trait]
impl EndpointSource for LatencyRankedSource {
    async fn setup(&self) -> Result<(), SourceError> {
        if self.endpoints.is_empty() {
            return Err(SourceError::NoEndpoints);
        }
        self.probe_all().await?;
        self.start_refresher();
        Ok(())
    }

    async fn teardown(&self) -> Result<(), SourceError> {
        self.stop_refresher();
        Ok(())
    }

    async fn ranked_endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        if self.endpoints.is_empty() {
            return Err(SourceError::NoEndpoints);
        }
        if !self.is_measured() {
            self.probe_all().await?;
        }
        Ok(self.rank())
    }

    async fn top_n(&self, n: usize) -> Result<Vec<Endpoint>, SourceError> {
        if self.endpoints.is_empty() {
            return Err(SourceError::NoEndpoints);
        }
        self.probe_all().await?;
        let mut ranked = self.rank();
        ranked.truncate(n);
        Ok(ranked)
    }
}

/// Probe statistics for a single endpoint
#[derive(Debug, Clone)]
pub struct EndpointHealthStats {
    pub endpoint: Endpoint,
    pub latency: Option<Duration>,
    pub reachable: bool,
    pub failure_count: u32,
    pub last_probe: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listening_endpoint() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, Endpoint::new("127.0.0.1", port))
    }

    async fn closed_endpoint() -> Endpoint {
        let (listener, endpoint) = listening_endpoint().await;
        drop(listener);
        endpoint
    }

    fn quiet_config() -> ProbeConfig {
        ProbeConfig {
            enabled: false,
            interval: Duration::from_secs(60),
            timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_rank_orders_by_latency() {
        let a = Endpoint::new("10.0.0.1", 7709);
        let b = Endpoint::new("10.0.0.2", 7709);
        let c = Endpoint::new("10.0.0.3", 7709);
        let source =
            LatencyRankedSource::new(vec![a.clone(), b.clone(), c.clone()], quiet_config());

        source.endpoints[0].record_success(Duration::from_millis(40));
        source.endpoints[1].record_success(Duration::from_millis(5));
        source.endpoints[2].record_failure();

        assert_eq!(source.rank(), vec![b, a]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_are_excluded() {
        let (_listener, up) = listening_endpoint().await;
        let down = closed_endpoint().await;
        let source = LatencyRankedSource::new(vec![down.clone(), up.clone()], quiet_config());

        let ranked = source.ranked_endpoints().await.unwrap();
        assert_eq!(ranked, vec![up]);

        let stats = source.health_stats();
        assert_eq!(stats.len(), 2);
        assert!(!stats[0].reachable);
        assert_eq!(stats[0].failure_count, 1);
        assert!(stats[1].reachable);
    }

    #[tokio::test]
    async fn test_setup_and_teardown_manage_refresher() {
        let (_listener, up) = listening_endpoint().await;
        let config = ProbeConfig {
            enabled: true,
            ..quiet_config()
        };
        let source = LatencyRankedSource::new(vec![up], config);

        source.setup().await.unwrap();
        assert!(source.refresher.lock().unwrap().is_some());
        assert!(source.endpoints[0].is_measured());

        source.teardown().await.unwrap();
        assert!(source.refresher.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_source_rejects_setup() {
        let source = LatencyRankedSource::new(vec![], quiet_config());
        assert!(matches!(source.setup().await, Err(SourceError::NoEndpoints)));
        assert!(matches!(source.top_n(2).await, Err(SourceError::NoEndpoints)));
    }
}
