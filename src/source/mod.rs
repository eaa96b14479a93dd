//! Endpoint sources for hqpool
//!
//! An endpoint source supplies the candidate servers the pool manager draws
//! replacement standbys from. Candidates are returned best first and the
//! ranking is recomputed on every call.
//!
//! # Components
//!
//! - [`Endpoint`]: a `host:port` server address
//! - [`EndpointSource`]: the trait the pool manager consumes
//! - [`FixedSource`]: a static, pre-ranked list
//! - [`LatencyRankedSource`]: ranks endpoints by measured TCP connect latency
//!
//! # Lifecycle
//!
//! The pool manager calls [`EndpointSource::setup`] when it connects and
//! [`EndpointSource::teardown`] exactly once when it disconnects. Sources that
//! keep background probes running start them in `setup` and stop them in
//! `teardown`.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use hqpool::source::{EndpointSource, LatencyRankedSource, ProbeConfig};
//! use hqpool::Endpoint;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = LatencyRankedSource::new(
//!     vec![
//!         Endpoint::new("119.147.212.81", 7709),
//!         Endpoint::new("114.80.63.12", 7709),
//!         Endpoint::new("180.153.39.51", 7709),
//!     ],
//!     ProbeConfig::default(),
//! );
//!
//! // Pick the initial active and standby servers
//! let best = source.top_n(2).await?;
//! println!("active={} standby={}", best[0], best[1]);
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod fixed;
pub mod ranked;

use async_trait::async_trait;

pub use endpoint::{Endpoint, EndpointHealth, EndpointParseError};
pub use fixed::FixedSource;
pub use ranked::{EndpointHealthStats, LatencyRankedSource, ProbeConfig};

/// Errors raised by endpoint sources
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("No endpoints configured")]
    NoEndpoints,

    #[error("Probe task failed: {0}")]
    Probe(#[from] tokio::task::JoinError),

    #[error("Endpoint source unavailable: {0}")]
    Unavailable(String),
}

/// Supplier of ranked candidate endpoints
#[async_trait]
pub trait EndpointSource: Send + Sync + 'static {
    /// Acquire whatever the source needs to produce rankings
    async fn setup(&self) -> Result<(), SourceError>;

    /// Release what `setup` acquired
    async fn teardown(&self) -> Result<(), SourceError>;

    /// All known endpoints, best first, freshly ranked
    async fn ranked_endpoints(&self) -> Result<Vec<Endpoint>, SourceError>;

    /// The best `n` endpoints, used to pick the initial active/standby pair
    async fn top_n(&self, n: usize) -> Result<Vec<Endpoint>, SourceError> {
        let mut ranked = self.ranked_endpoints().await?;
        ranked.truncate(n);
        Ok(ranked)
    }
}
