//! Pool manager lifecycle
//!
//! The manager owns one active and at most one standby session. It moves
//! through `Uninitialized -> Connected -> Disconnected`; the last state is
//! terminal. The state is published on a watch channel so retry loops in
//! flight notice a disconnect and stop.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::error::PoolError;
use super::policy::RetryPolicy;
use crate::client::{ClientError, ClientOptions, QueryClient};
use crate::source::{Endpoint, EndpointSource};

/// Builds a fresh, unconnected client session
pub type ClientFactory<C> = Arc<dyn Fn(&ClientOptions) -> C + Send + Sync>;

/// Pool manager lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Constructed, no sessions open yet
    Uninitialized,

    /// Active and standby sessions bound, calls allowed
    Connected,

    /// Sessions released; terminal
    Disconnected,
}

impl PoolState {
    /// Get a human-readable state name
    pub fn name(&self) -> &str {
        match self {
            PoolState::Uninitialized => "Uninitialized",
            PoolState::Connected => "Connected",
            PoolState::Disconnected => "Disconnected",
        }
    }
}

/// Active/standby slots. `generation` changes on every rotation.
pub(crate) struct Slots<C> {
    pub(crate) active: Option<Arc<C>>,
    pub(crate) standby: Option<Arc<C>>,
    pub(crate) generation: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) calls: AtomicU64,
    pub(crate) failures: AtomicU64,
    pub(crate) rotations: AtomicU64,
    pub(crate) standby_misses: AtomicU64,
}

pub(crate) struct Inner<C, S> {
    pub(crate) factory: ClientFactory<C>,
    pub(crate) source: Arc<S>,
    pub(crate) slots: Mutex<Slots<C>>,
    pub(crate) retries: AtomicU32,
    pub(crate) state: watch::Sender<PoolState>,
    pub(crate) counters: Counters,
}

/// Pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Current lifecycle state
    pub state: PoolState,

    /// Forwarded calls that returned data
    pub calls: u64,

    /// Failed attempts (transport errors and empty results)
    pub failures: u64,

    /// Rotation cycles, including those with no standby to promote
    pub rotations: u64,

    /// Rotations that found no usable replacement standby
    pub standby_misses: u64,

    /// Current retry counter
    pub retry_count: u32,

    /// Endpoint of the active session
    pub active: Option<Endpoint>,

    /// Endpoint of the standby session
    pub standby: Option<Endpoint>,
}

/// Hot-standby failover controller over two client sessions
///
/// Cloning is cheap; clones share the same sessions and state.
pub struct PoolManager<C, S> {
    pub(crate) inner: Arc<Inner<C, S>>,
    pub(crate) policy: RetryPolicy,
    pub(crate) options: ClientOptions,
}

impl<C, S> Clone for PoolManager<C, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: self.policy,
            options: self.options.clone(),
        }
    }
}

impl<C, S> fmt::Debug for PoolManager<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager")
            .field("state", &*self.inner.state.borrow())
            .field("policy", &self.policy)
            .field("retries", &self.inner.retries.load(Ordering::Relaxed))
            .finish()
    }
}

impl<C, S> PoolManager<C, S>
where
    C: QueryClient,
    S: EndpointSource,
{
    /// Create a manager; no network activity happens until [`connect`](Self::connect)
    pub fn new<F>(factory: F, source: Arc<S>) -> Self
    where
        F: Fn(&ClientOptions) -> C + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(PoolState::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                factory: Arc::new(factory),
                source,
                slots: Mutex::new(Slots {
                    active: None,
                    standby: None,
                    generation: 0,
                }),
                retries: AtomicU32::new(0),
                state,
                counters: Counters::default(),
            }),
            policy: RetryPolicy::default(),
            options: ClientOptions::default(),
        }
    }

    /// Replace the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the options new client sessions are built with
    pub fn with_client_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn source(&self) -> &Arc<S> {
        &self.inner.source
    }

    pub fn state(&self) -> PoolState {
        *self.inner.state.borrow()
    }

    /// Subscribe to lifecycle state changes
    pub fn subscribe(&self) -> watch::Receiver<PoolState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == PoolState::Connected
    }

    /// Consecutive rotation-and-retry cycles since the last successful call
    pub fn retry_count(&self) -> u32 {
        self.inner.retries.load(Ordering::SeqCst)
    }

    pub async fn active_endpoint(&self) -> Option<Endpoint> {
        let slots = self.inner.slots.lock().await;
        slots.active.as_ref().and_then(|c| c.endpoint())
    }

    pub async fn standby_endpoint(&self) -> Option<Endpoint> {
        let slots = self.inner.slots.lock().await;
        slots.standby.as_ref().and_then(|c| c.endpoint())
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let slots = self.inner.slots.lock().await;
        let counters = &self.inner.counters;
        PoolStats {
            state: self.state(),
            calls: counters.calls.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            rotations: counters.rotations.load(Ordering::Relaxed),
            standby_misses: counters.standby_misses.load(Ordering::Relaxed),
            retry_count: self.retry_count(),
            active: slots.active.as_ref().and_then(|c| c.endpoint()),
            standby: slots.standby.as_ref().and_then(|c| c.endpoint()),
        }
    }

    /// Build a new session and connect it to `endpoint`
    pub(crate) async fn open_session(&self, endpoint: &Endpoint) -> Result<Arc<C>, ClientError> {
        let client = (self.inner.factory)(&self.options);
        client.connect(endpoint).await?;
        Ok(Arc::new(client))
    }

    /// Set up the endpoint source, then bind the active and standby sessions
    ///
    /// On failure everything already bound is released again and the
    /// manager stays `Uninitialized`, so the caller can retry with other
    /// endpoints.
    pub async fn connect(
        &self,
        active: Endpoint,
        standby: Endpoint,
    ) -> Result<PoolSession<C, S>, PoolError> {
        if active == standby {
            return Err(PoolError::DuplicateEndpoint(active));
        }

        let mut slots = self.inner.slots.lock().await;
        match self.state() {
            PoolState::Uninitialized => {}
            PoolState::Connected => return Err(PoolError::AlreadyConnected),
            PoolState::Disconnected => return Err(PoolError::Closed),
        }

        debug!("Setting up endpoint source");
        self.inner.source.setup().await?;

        debug!(endpoint = %active, "Connecting active session");
        let primary = match self.open_session(&active).await {
            Ok(session) => session,
            Err(source) => {
                self.abort_connect(None).await;
                return Err(PoolError::Connect {
                    endpoint: active,
                    source,
                });
            }
        };

        debug!(endpoint = %standby, "Connecting standby session");
        let backup = match self.open_session(&standby).await {
            Ok(session) => session,
            Err(source) => {
                self.abort_connect(Some(primary)).await;
                return Err(PoolError::Connect {
                    endpoint: standby,
                    source,
                });
            }
        };

        slots.active = Some(primary);
        slots.standby = Some(backup);
        slots.generation = 0;
        self.inner.retries.store(0, Ordering::SeqCst);
        self.inner.state.send_replace(PoolState::Connected);
        drop(slots);

        info!(active = %active, standby = %standby, "Pool connected");
        Ok(PoolSession::new(self.clone()))
    }

    async fn abort_connect(&self, bound: Option<Arc<C>>) {
        if let Some(session) = bound {
            if let Err(e) = session.disconnect().await {
                warn!(error = %e, "Failed to release session after connect error");
            }
        }
        if let Err(e) = self.inner.source.teardown().await {
            warn!(error = %e, "Failed to tear down endpoint source after connect error");
        }
    }

    /// Release both sessions and tear down the endpoint source
    ///
    /// Both sessions are always attempted; the first release error is
    /// returned once everything ran. Calling this again is a no-op.
    pub async fn disconnect(&self) -> Result<(), PoolError> {
        let mut previous = PoolState::Uninitialized;
        self.inner.state.send_if_modified(|state| {
            previous = *state;
            if *state == PoolState::Connected {
                *state = PoolState::Disconnected;
                true
            } else {
                false
            }
        });

        match previous {
            PoolState::Uninitialized => return Err(PoolError::NotConnected),
            PoolState::Disconnected => {
                debug!("Pool already disconnected");
                return Ok(());
            }
            PoolState::Connected => {}
        }

        let (active, standby) = {
            let mut slots = self.inner.slots.lock().await;
            (slots.active.take(), slots.standby.take())
        };

        let mut first_error = None;
        for (role, session) in [("active", active), ("standby", standby)] {
            let Some(session) = session else {
                debug!(role, "No session to release");
                continue;
            };
            debug!(role, endpoint = ?session.endpoint(), "Disconnecting session");
            if let Err(source) = session.disconnect().await {
                warn!(role, error = %source, "Failed to disconnect session");
                if first_error.is_none() {
                    first_error = Some(PoolError::Disconnect { role, source });
                }
            }
        }

        debug!("Tearing down endpoint source");
        self.inner.source.teardown().await?;
        info!("Pool disconnected");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Alias for [`disconnect`](Self::disconnect)
    pub async fn close(&self) -> Result<(), PoolError> {
        self.disconnect().await
    }
}

/// Connected pool handle returned by [`PoolManager::connect`]
///
/// Dereferences to the manager. Call [`close`](Self::close) to disconnect;
/// a session dropped while still connected (early return, error, task
/// cancellation) disconnects on the current tokio runtime.
#[must_use = "dropping the session disconnects the pool"]
pub struct PoolSession<C, S>
where
    C: QueryClient,
    S: EndpointSource,
{
    pool: PoolManager<C, S>,
    closed: bool,
}

impl<C, S> PoolSession<C, S>
where
    C: QueryClient,
    S: EndpointSource,
{
    fn new(pool: PoolManager<C, S>) -> Self {
        Self {
            pool,
            closed: false,
        }
    }

    pub fn pool(&self) -> &PoolManager<C, S> {
        &self.pool
    }

    /// Disconnect the pool and consume the session
    pub async fn close(mut self) -> Result<(), PoolError> {
        self.closed = true;
        self.pool.disconnect().await
    }
}

impl<C, S> fmt::Debug for PoolSession<C, S>
where
    C: QueryClient,
    S: EndpointSource,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSession")
            .field("pool", &self.pool)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<C, S> Deref for PoolSession<C, S>
where
    C: QueryClient,
    S: EndpointSource,
{
    type Target = PoolManager<C, S>;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl<C, S> Drop for PoolSession<C, S>
where
    C: QueryClient,
    S: EndpointSource,
{
    fn drop(&mut self) {
        if self.closed || !self.pool.is_connected() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Pool session dropped while connected, disconnecting");
                let pool = self.pool.clone();
                handle.spawn(async move {
                    if let Err(e) = pool.disconnect().await {
                        warn!(error = %e, "Failed to disconnect dropped pool session");
                    }
                });
            }
            Err(_) => {
                warn!("Pool session dropped outside a tokio runtime, sessions left open");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{SimulatedClient, SimulatedNetwork};
    use crate::source::FixedSource;

    fn endpoints(count: u16) -> Vec<Endpoint> {
        (0..count)
            .map(|i| Endpoint::new(format!("hq-{}", i + 1), 7709))
            .collect()
    }

    fn manager(network: &SimulatedNetwork) -> PoolManager<SimulatedClient, FixedSource> {
        let network = network.clone();
        PoolManager::new(
            move |options: &ClientOptions| network.client(options),
            Arc::new(FixedSource::new(endpoints(4))),
        )
        .with_client_options(ClientOptions {
            heartbeat: false,
            ..ClientOptions::default()
        })
    }

    #[test]
    fn test_pool_state_names() {
        assert_eq!(PoolState::Uninitialized.name(), "Uninitialized");
        assert_eq!(PoolState::Connected.name(), "Connected");
        assert_eq!(PoolState::Disconnected.name(), "Disconnected");
    }

    #[tokio::test]
    async fn test_connect_binds_both_sessions() {
        let network = SimulatedNetwork::new();
        let pool = manager(&network);
        let eps = endpoints(2);

        assert_eq!(pool.state(), PoolState::Uninitialized);
        let session = pool.connect(eps[0].clone(), eps[1].clone()).await.unwrap();

        assert!(session.is_connected());
        assert_eq!(session.active_endpoint().await, Some(eps[0].clone()));
        assert_eq!(session.standby_endpoint().await, Some(eps[1].clone()));
        assert_eq!(network.connects(), eps);

        session.close().await.unwrap();
        assert_eq!(pool.state(), PoolState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_rejects_same_endpoint_twice() {
        let network = SimulatedNetwork::new();
        let pool = manager(&network);
        let ep = Endpoint::new("hq-1", 7709);

        let result = pool.connect(ep.clone(), ep).await;
        assert!(matches!(result, Err(PoolError::DuplicateEndpoint(_))));
        assert!(network.connects().is_empty());
    }

    #[tokio::test]
    async fn test_second_connect_is_rejected() {
        let network = SimulatedNetwork::new();
        let pool = manager(&network);
        let eps = endpoints(4);

        let session = pool.connect(eps[0].clone(), eps[1].clone()).await.unwrap();
        let again = pool.connect(eps[2].clone(), eps[3].clone()).await;
        assert!(matches!(again, Err(PoolError::AlreadyConnected)));

        session.close().await.unwrap();
        let after = pool.connect(eps[2].clone(), eps[3].clone()).await;
        assert!(matches!(after, Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn test_failed_standby_connect_rolls_back() {
        let network = SimulatedNetwork::new();
        let pool = manager(&network);
        let eps = endpoints(3);
        network.mark_down(&eps[1]);

        let result = pool.connect(eps[0].clone(), eps[1].clone()).await;
        match result {
            Err(PoolError::Connect { endpoint, .. }) => assert_eq!(endpoint, eps[1]),
            other => panic!("expected connect error, got {:?}", other.err()),
        }
        assert_eq!(pool.state(), PoolState::Uninitialized);
        assert_eq!(network.disconnects(), vec![eps[0].clone()]);

        // Still usable with a different standby
        let session = pool.connect(eps[0].clone(), eps[2].clone()).await.unwrap();
        assert!(session.is_connected());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_before_connect() {
        let network = SimulatedNetwork::new();
        let pool = manager(&network);
        assert!(matches!(pool.disconnect().await, Err(PoolError::NotConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let network = SimulatedNetwork::new();
        let pool = manager(&network);
        let eps = endpoints(2);

        let session = pool.connect(eps[0].clone(), eps[1].clone()).await.unwrap();
        pool.disconnect().await.unwrap();
        pool.disconnect().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(network.disconnects(), eps);
    }

    #[tokio::test]
    async fn test_dropped_session_disconnects() {
        let network = SimulatedNetwork::new();
        let pool = manager(&network);
        let eps = endpoints(2);
        let mut state = pool.subscribe();

        {
            let _session = pool.connect(eps[0].clone(), eps[1].clone()).await.unwrap();
        }

        state
            .wait_for(|s| *s == PoolState::Disconnected)
            .await
            .unwrap();
        // Let the spawned release finish
        for _ in 0..10 {
            if network.disconnects().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(network.disconnects(), eps);
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let network = SimulatedNetwork::new();
        let pool = manager(&network);
        let eps = endpoints(2);

        let session = pool.connect(eps[0].clone(), eps[1].clone()).await.unwrap();
        let stats = session.stats().await;
        assert_eq!(stats.state, PoolState::Connected);
        assert_eq!(stats.calls, 0);
        assert_eq!(stats.rotations, 0);
        assert_eq!(stats.active, Some(eps[0].clone()));
        assert_eq!(stats.standby, Some(eps[1].clone()));
        session.close().await.unwrap();
    }
}
