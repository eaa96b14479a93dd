use anyhow::{Context, Result};
use std::sync::Arc;

use crate::client::{ClientOptions, QueryClient};
use crate::config::Config;
use crate::pool::{PoolManager, RetryPolicy};
use crate::source::{Endpoint, EndpointSource, FixedSource, LatencyRankedSource};

/// Shared state for the CLI commands
///
/// Builds the endpoint sources, retry policy and client options from the
/// loaded configuration.
#[derive(Clone)]
pub struct Core {
    pub config: Arc<Config>,
    pub source: Arc<LatencyRankedSource>,
}

impl Core {
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let config = Arc::new(config);

        let source = Arc::new(LatencyRankedSource::new(
            config.endpoints(),
            config.probe.to_probe_config(),
        ));

        Ok(Self { config, source })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.config.retry.to_policy()
    }

    pub fn client_options(&self) -> ClientOptions {
        self.config.client.to_options()
    }

    /// Configured hosts in file order, without probing
    pub fn fixed_source(&self) -> Arc<FixedSource> {
        Arc::new(FixedSource::new(self.config.endpoints()))
    }

    /// Probe all hosts and return the best two as (active, standby)
    pub async fn pick_initial(&self) -> Result<(Endpoint, Endpoint)> {
        let best = self
            .source
            .top_n(2)
            .await
            .context("Failed to rank endpoints")?;

        match <[Endpoint; 2]>::try_from(best) {
            Ok([active, standby]) => Ok((active, standby)),
            Err(found) => anyhow::bail!(
                "Need two reachable endpoints for active and standby, found {}",
                found.len()
            ),
        }
    }

    /// Build a pool manager over the latency-ranked source
    pub fn pool<C, F>(&self, factory: F) -> PoolManager<C, LatencyRankedSource>
    where
        C: QueryClient,
        F: Fn(&ClientOptions) -> C + Send + Sync + 'static,
    {
        self.pool_with_source(factory, Arc::clone(&self.source))
    }

    /// Build a pool manager over any endpoint source
    pub fn pool_with_source<C, S, F>(&self, factory: F, source: Arc<S>) -> PoolManager<C, S>
    where
        C: QueryClient,
        S: EndpointSource,
        F: Fn(&ClientOptions) -> C + Send + Sync + 'static,
    {
        PoolManager::new(factory, source)
            .with_policy(self.policy())
            .with_client_options(self.client_options())
    }
}
