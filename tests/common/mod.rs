//! Shared helpers for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use hqpool::client::{ClientOptions, SimulatedClient, SimulatedNetwork};
use hqpool::pool::{PoolManager, RetryPolicy};
use hqpool::source::{Endpoint, EndpointSource, SourceError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Endpoint `En`, as in the failover walkthroughs
pub fn ep(n: u16) -> Endpoint {
    Endpoint::new(format!("e{}.quotes.test", n), 7709)
}

/// Endpoint source that hands out a queue of prepared rankings
///
/// Each `ranked_endpoints` call pops the next ranking; once the queue is
/// empty it returns an empty list.
#[derive(Default)]
pub struct ScriptedSource {
    rankings: Mutex<VecDeque<Vec<Endpoint>>>,
    failing: AtomicBool,
    pub setups: AtomicUsize,
    pub teardowns: AtomicUsize,
    pub requests: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(rankings: Vec<Vec<Endpoint>>) -> Arc<Self> {
        Arc::new(Self {
            rankings: Mutex::new(rankings.into()),
            ..Self::default()
        })
    }

    /// Make every ranking request fail
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn setups(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointSource for ScriptedSource {
    async fn setup(&self) -> Result<(), SourceError> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn teardown(&self) -> Result<(), SourceError> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ranked_endpoints(&self) -> Result<Vec<Endpoint>, SourceError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("ranking service down".into()));
        }
        Ok(self
            .rankings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

/// Options with the heartbeat task switched off
pub fn quiet_options() -> ClientOptions {
    ClientOptions {
        heartbeat: false,
        ..ClientOptions::default()
    }
}

/// A retry policy with no pause between attempts
pub fn immediate(max_retries: u32) -> RetryPolicy {
    RetryPolicy::resilient()
        .with_max_retries(max_retries)
        .with_retry_interval(Duration::ZERO)
}

/// Pool manager over simulated clients on `network`
pub fn simulated_pool<S: EndpointSource>(
    network: &SimulatedNetwork,
    source: Arc<S>,
    policy: RetryPolicy,
) -> PoolManager<SimulatedClient, S> {
    let network = network.clone();
    PoolManager::new(move |options: &ClientOptions| network.client(options), source)
        .with_policy(policy)
        .with_client_options(quiet_options())
}
