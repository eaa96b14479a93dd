//! Retry-and-failover executor
//!
//! Every forwarded call runs through [`PoolManager::execute`]. A failed
//! attempt promotes the standby to active, refills the standby slot from the
//! endpoint source, pauses, and tries again until the retry budget is spent.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::error::{CallFailure, PoolError};
use super::manager::{PoolManager, PoolState};
use crate::client::{ClientError, QueryClient};
use crate::source::{Endpoint, EndpointSource};

impl<C, S> PoolManager<C, S>
where
    C: QueryClient,
    S: EndpointSource,
{
    /// Run `call` against the active session with failover
    ///
    /// `call` is invoked once per attempt with the session that is active at
    /// that moment. `Err(_)` and `Ok(None)` both count as transient failures.
    pub(crate) async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, PoolError>
    where
        F: FnMut(Arc<C>) -> Fut,
        Fut: Future<Output = Result<Option<T>, ClientError>>,
    {
        let max_retries = self.policy.max_retries;
        // Budget of this call; the shared counter is only an observable
        let mut attempt: u32 = 0;

        loop {
            let (client, generation) = self.checkout().await?;

            let failure = match call(client).await {
                Ok(Some(value)) => {
                    self.inner.retries.store(0, Ordering::SeqCst);
                    self.inner.counters.calls.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Ok(None) => CallFailure::NoData,
                Err(e) => CallFailure::Transport(e),
            };
            self.inner.counters.failures.fetch_add(1, Ordering::Relaxed);

            if attempt >= max_retries {
                if self.policy.is_fail_fast() {
                    debug!(operation, error = %failure, "Call failed, fail-fast policy");
                    return Err(PoolError::Call { operation, failure });
                }
                warn!(operation, max_retries, error = %failure, "Retry budget exhausted");
                return Err(PoolError::MaxRetriesExceeded {
                    operation,
                    max_retries,
                    last_failure: failure,
                });
            }

            warn!(
                operation,
                attempt = attempt + 1,
                max_retries,
                error = %failure,
                "Call failed, failing over"
            );
            self.rotate(generation).await?;
            self.pause().await?;
            attempt += 1;
            self.inner.retries.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ensure_connected(&self) -> Result<(), PoolError> {
        match self.state() {
            PoolState::Connected => Ok(()),
            PoolState::Uninitialized => Err(PoolError::NotConnected),
            PoolState::Disconnected => Err(PoolError::Closed),
        }
    }

    /// Clone out the active session and the slot generation it belongs to
    async fn checkout(&self) -> Result<(Arc<C>, u64), PoolError> {
        self.ensure_connected()?;
        let slots = self.inner.slots.lock().await;
        self.ensure_connected()?;
        let active = slots.active.as_ref().ok_or(PoolError::Closed)?;
        Ok((Arc::clone(active), slots.generation))
    }

    /// Promote the standby and refill the standby slot
    ///
    /// Skipped when the slots moved past `observed` while this caller was
    /// waiting; the failing session has already been replaced.
    async fn rotate(&self, observed: u64) -> Result<(), PoolError> {
        let mut slots = self.inner.slots.lock().await;
        self.ensure_connected()?;

        if slots.generation != observed {
            debug!(
                observed,
                current = slots.generation,
                "Sessions already rotated by a concurrent call"
            );
            return Ok(());
        }

        let failed = slots.active.take().ok_or(PoolError::Closed)?;
        let old_active = failed.endpoint();

        let new_active = match slots.standby.take() {
            Some(standby) => {
                if let Err(e) = failed.disconnect().await {
                    warn!(endpoint = ?old_active, error = %e, "Failed to release failed session");
                }
                let promoted = standby.endpoint();
                info!(from = ?old_active, to = ?promoted, "Promoted standby to active");
                slots.active = Some(standby);
                promoted
            }
            None => {
                warn!(endpoint = ?old_active, "No standby to promote, keeping active session");
                slots.active = Some(failed);
                old_active.clone()
            }
        };

        slots.generation += 1;
        self.inner.counters.rotations.fetch_add(1, Ordering::Relaxed);

        let exclude: Vec<Endpoint> = old_active.into_iter().chain(new_active).collect();
        slots.standby = self.replenish(&exclude).await;
        if slots.standby.is_none() {
            self.inner
                .counters
                .standby_misses
                .fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Connect a new standby to the best endpoint not in `exclude`
    async fn replenish(&self, exclude: &[Endpoint]) -> Option<Arc<C>> {
        let ranked = match self.inner.source.ranked_endpoints().await {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(error = %e, "Endpoint source failed during rotation");
                Vec::new()
            }
        };

        for candidate in eligible_candidates(ranked, exclude) {
            match self.open_session(&candidate).await {
                Ok(session) => {
                    info!(endpoint = %candidate, "Standby session connected");
                    return Some(session);
                }
                Err(e) => {
                    warn!(endpoint = %candidate, error = %e, "Standby candidate failed to connect");
                }
            }
        }

        warn!("Endpoint pool exhausted, continuing without standby");
        None
    }

    /// Sleep for the retry interval unless the pool disconnects first
    async fn pause(&self) -> Result<(), PoolError> {
        let interval = self.policy.retry_interval;
        if interval.is_zero() {
            return self.ensure_connected();
        }

        let mut state = self.subscribe();
        let stopped = async move {
            let _ = state.wait_for(|s| *s != PoolState::Connected).await;
        };

        tokio::select! {
            _ = sleep(interval) => self.ensure_connected(),
            () = stopped => {
                debug!("Pool disconnected during retry pause");
                Err(PoolError::Closed)
            }
        }
    }
}

/// Ranked endpoints usable as a new standby, best first
///
/// Drops anything in `exclude` and repeated entries.
pub(crate) fn eligible_candidates(ranked: Vec<Endpoint>, exclude: &[Endpoint]) -> Vec<Endpoint> {
    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|ep| !exclude.contains(ep) && seen.insert(ep.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientOptions, Outcome, QuoteApi, SimulatedClient, SimulatedNetwork};
    use crate::pool::RetryPolicy;
    use crate::source::FixedSource;
    use std::time::Duration;

    fn ep(n: u16) -> Endpoint {
        Endpoint::new(format!("hq-{}", n), 7709)
    }

    fn pool(
        network: &SimulatedNetwork,
        ranked: Vec<Endpoint>,
        policy: RetryPolicy,
    ) -> PoolManager<SimulatedClient, FixedSource> {
        let network = network.clone();
        PoolManager::new(
            move |options: &ClientOptions| network.client(options),
            Arc::new(FixedSource::new(ranked)),
        )
        .with_policy(policy)
        .with_client_options(ClientOptions {
            heartbeat: false,
            ..ClientOptions::default()
        })
    }

    async fn heartbeat(pool: &PoolManager<SimulatedClient, FixedSource>) -> Result<u32, PoolError> {
        pool.execute("do_heartbeat", |api: Arc<SimulatedClient>| async move {
            api.do_heartbeat().await
        })
        .await
    }

    #[test]
    fn test_eligible_candidates_skip_excluded_and_repeats() {
        let ranked = vec![ep(1), ep(2), ep(3), ep(2), ep(4), ep(3)];
        let picked = eligible_candidates(ranked, &[ep(1), ep(4)]);
        assert_eq!(picked, vec![ep(2), ep(3)]);
    }

    #[test]
    fn test_eligible_candidates_empty() {
        assert!(eligible_candidates(vec![ep(1)], &[ep(1)]).is_empty());
        assert!(eligible_candidates(Vec::new(), &[]).is_empty());
    }

    #[tokio::test]
    async fn test_execute_before_connect() {
        let network = SimulatedNetwork::new();
        let pool = pool(&network, vec![ep(1), ep(2)], RetryPolicy::resilient());
        assert!(matches!(heartbeat(&pool).await, Err(PoolError::NotConnected)));
    }

    #[tokio::test]
    async fn test_no_data_counts_as_failure() {
        let network = SimulatedNetwork::new();
        let policy = RetryPolicy::resilient()
            .with_max_retries(3)
            .with_retry_interval(Duration::ZERO);
        let pool = pool(&network, vec![ep(3), ep(4)], policy);
        let session = pool.connect(ep(1), ep(2)).await.unwrap();

        network.script([Outcome::NoData]);
        assert_eq!(heartbeat(&session).await.unwrap(), 1000);
        assert_eq!(session.active_endpoint().await, Some(ep(2)));
        assert_eq!(session.standby_endpoint().await, Some(ep(3)));
        assert_eq!(session.retry_count(), 0);

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_rotation_without_standby_keeps_active() {
        let network = SimulatedNetwork::new();
        let policy = RetryPolicy::resilient()
            .with_max_retries(2)
            .with_retry_interval(Duration::ZERO);
        // Nothing but the two bound endpoints to choose from
        let pool = pool(&network, vec![ep(1), ep(2)], policy);
        let session = pool.connect(ep(1), ep(2)).await.unwrap();

        network.script([Outcome::TransportError, Outcome::TransportError]);
        assert_eq!(heartbeat(&session).await.unwrap(), 1000);

        let stats = session.stats().await;
        assert_eq!(stats.active, Some(ep(2)));
        assert_eq!(stats.standby, None);
        assert_eq!(stats.rotations, 2);
        assert_eq!(stats.standby_misses, 2);

        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_is_per_call_under_concurrent_success() {
        use std::sync::atomic::{AtomicBool, AtomicU32};

        let network = SimulatedNetwork::new();
        let policy = RetryPolicy::resilient()
            .with_max_retries(2)
            .with_retry_interval(Duration::from_millis(10));
        let pool = pool(&network, vec![ep(3), ep(4), ep(5), ep(6)], policy);
        let session = pool.connect(ep(1), ep(2)).await.unwrap();

        // A neighbour whose successes keep resetting the shared counter
        let done = Arc::new(AtomicBool::new(false));
        let neighbour = {
            let pool = pool.clone();
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                while !done.load(Ordering::SeqCst) {
                    let _ = heartbeat(&pool).await;
                    sleep(Duration::from_millis(5)).await;
                }
            })
        };

        let attempts = AtomicU32::new(0);
        let result = pool
            .execute("get_finance_info", |_api: Arc<SimulatedClient>| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok::<Option<u32>, ClientError>(None) }
            })
            .await;

        assert!(matches!(
            result,
            Err(PoolError::MaxRetriesExceeded { max_retries: 2, .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        done.store(true, Ordering::SeqCst);
        neighbour.await.unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_down_candidate_is_skipped() {
        let network = SimulatedNetwork::new();
        let policy = RetryPolicy::resilient()
            .with_max_retries(1)
            .with_retry_interval(Duration::ZERO);
        let pool = pool(&network, vec![ep(3), ep(4)], policy);
        let session = pool.connect(ep(1), ep(2)).await.unwrap();
        network.mark_down(&ep(3));

        network.script([Outcome::TransportError]);
        heartbeat(&session).await.unwrap();
        assert_eq!(session.standby_endpoint().await, Some(ep(4)));

        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_interrupts_pause() {
        let network = SimulatedNetwork::new();
        let policy = RetryPolicy::resilient().with_retry_interval(Duration::from_secs(60));
        let pool = pool(&network, vec![ep(3), ep(4)], policy);
        let session = pool.connect(ep(1), ep(2)).await.unwrap();
        network.fail_calls_on(&ep(1));

        let caller = pool.clone();
        let call = tokio::spawn(async move { heartbeat(&caller).await });

        // Let the first attempt fail and enter its pause
        while session.stats().await.rotations == 0 {
            tokio::task::yield_now().await;
        }
        session.close().await.unwrap();

        let result = call.await.unwrap();
        assert!(matches!(result, Err(PoolError::Closed)));
    }
}
