//! In-memory quote client with failure injection
//!
//! [`SimulatedNetwork`] is shared by every [`SimulatedClient`] built from it
//! and decides the outcome of each call:
//! 1. the next scripted [`Outcome`], if any is queued
//! 2. a transport error if the bound endpoint is marked failing
//! 3. a transport error with the configured random failure rate
//! 4. otherwise synthetic data
//!
//! Every connect, disconnect, call and heartbeat is recorded so tests can
//! assert on the exact traffic a pool produced.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

use super::types::*;
use super::{ClientError, ClientOptions, QueryClient, QuoteApi};
use crate::source::Endpoint;

/// Outcome of one simulated call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    NoData,
    TransportError,
}

/// One call observed by the simulated network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub endpoint: Endpoint,
    pub operation: &'static str,
    pub outcome: Outcome,
}

struct NetworkState {
    down: HashSet<Endpoint>,
    failing: HashSet<Endpoint>,
    failing_disconnect: HashSet<Endpoint>,
    script: VecDeque<Outcome>,
    failure_rate: f64,
    rng: StdRng,
    calls: Vec<CallRecord>,
    connects: Vec<Endpoint>,
    disconnects: Vec<Endpoint>,
    heartbeats: u64,
}

/// Shared behaviour and traffic log for simulated clients
#[derive(Clone)]
pub struct SimulatedNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl Default for SimulatedNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState {
                down: HashSet::new(),
                failing: HashSet::new(),
                failing_disconnect: HashSet::new(),
                script: VecDeque::new(),
                failure_rate: 0.0,
                rng: StdRng::seed_from_u64(0),
                calls: Vec::new(),
                connects: Vec::new(),
                disconnects: Vec::new(),
                heartbeats: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        // A panic while holding the lock only happens in a failing test;
        // the recorded state is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Refuse connections to `endpoint`
    pub fn mark_down(&self, endpoint: &Endpoint) {
        self.lock().down.insert(endpoint.clone());
    }

    /// Make every call against `endpoint` fail with a transport error
    pub fn fail_calls_on(&self, endpoint: &Endpoint) {
        self.lock().failing.insert(endpoint.clone());
    }

    /// Make disconnecting from `endpoint` report an error
    pub fn fail_disconnect_on(&self, endpoint: &Endpoint) {
        self.lock().failing_disconnect.insert(endpoint.clone());
    }

    /// Clear all failure marks for `endpoint`
    pub fn heal(&self, endpoint: &Endpoint) {
        let mut state = self.lock();
        state.down.remove(endpoint);
        state.failing.remove(endpoint);
        state.failing_disconnect.remove(endpoint);
    }

    /// Queue outcomes consumed one per call, in order, before any other rule
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.lock().script.extend(outcomes);
    }

    /// Fail calls at random with probability `rate`, reproducibly for `seed`
    pub fn set_failure_rate(&self, rate: f64, seed: u64) {
        let mut state = self.lock();
        state.failure_rate = rate.clamp(0.0, 1.0);
        state.rng = StdRng::seed_from_u64(seed);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    pub fn connects(&self) -> Vec<Endpoint> {
        self.lock().connects.clone()
    }

    pub fn disconnects(&self) -> Vec<Endpoint> {
        self.lock().disconnects.clone()
    }

    pub fn heartbeats(&self) -> u64 {
        self.lock().heartbeats
    }

    /// Build a client session on this network
    pub fn client(&self, options: &ClientOptions) -> SimulatedClient {
        SimulatedClient::new(self.clone(), options.clone())
    }

    fn resolve(&self, endpoint: &Endpoint, operation: &'static str) -> Outcome {
        let mut state = self.lock();
        let outcome = if let Some(scripted) = state.script.pop_front() {
            scripted
        } else if state.failing.contains(endpoint) {
            Outcome::TransportError
        } else if state.failure_rate > 0.0 {
            let rate = state.failure_rate;
            if state.rng.gen_bool(rate) {
                Outcome::TransportError
            } else {
                Outcome::Ok
            }
        } else {
            Outcome::Ok
        };

        state.calls.push(CallRecord {
            endpoint: endpoint.clone(),
            operation,
            outcome,
        });
        outcome
    }
}

/// Quote client session on a [`SimulatedNetwork`]
pub struct SimulatedClient {
    network: SimulatedNetwork,
    options: ClientOptions,
    endpoint: Mutex<Option<Endpoint>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedClient {
    pub fn new(network: SimulatedNetwork, options: ClientOptions) -> Self {
        Self {
            network,
            options,
            endpoint: Mutex::new(None),
            heartbeat: Mutex::new(None),
        }
    }

    fn bound(&self) -> Result<Endpoint, ClientError> {
        self.endpoint
            .lock()
            .ok()
            .and_then(|ep| ep.clone())
            .ok_or(ClientError::NotConnected)
    }

    fn respond<T>(
        &self,
        operation: &'static str,
        make: impl FnOnce() -> T,
    ) -> Result<Option<T>, ClientError> {
        let endpoint = self.bound()?;
        match self.network.resolve(&endpoint, operation) {
            Outcome::Ok => Ok(Some(make())),
            Outcome::NoData => Ok(None),
            Outcome::TransportError => Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                format!("simulated transport failure on {}", endpoint),
            ))),
        }
    }

    fn start_heartbeat(&self, endpoint: Endpoint) {
        let network = self.network.clone();
        let interval = self.options.heartbeat_interval;

        let handle = tokio::spawn(async move {
            loop {
                sleep(interval).await;
                network.lock().heartbeats += 1;
                debug!(endpoint = %endpoint, "Heartbeat");
            }
        });

        if let Ok(mut slot) = self.heartbeat.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    fn stop_heartbeat(&self) {
        if let Ok(mut slot) = self.heartbeat.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for SimulatedClient {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

#[async_trait]
impl QueryClient for SimulatedClient {
    async fn connect(&self, endpoint: &Endpoint) -> Result<(), ClientError> {
        {
            let mut state = self.network.lock();
            state.connects.push(endpoint.clone());
            if state.down.contains(endpoint) {
                return Err(ClientError::ConnectionFailed {
                    endpoint: endpoint.clone(),
                    reason: "connection refused".to_string(),
                });
            }
        }

        if let Ok(mut bound) = self.endpoint.lock() {
            *bound = Some(endpoint.clone());
        }
        if self.options.heartbeat {
            self.start_heartbeat(endpoint.clone());
        }
        debug!(endpoint = %endpoint, "Simulated session connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.stop_heartbeat();
        let endpoint = match self.endpoint.lock().ok().and_then(|mut ep| ep.take()) {
            Some(endpoint) => endpoint,
            None => return Ok(()),
        };

        let mut state = self.network.lock();
        state.disconnects.push(endpoint.clone());
        if state.failing_disconnect.contains(&endpoint) {
            return Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("simulated disconnect failure on {}", endpoint),
            )));
        }
        Ok(())
    }

    fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint.lock().ok().and_then(|ep| ep.clone())
    }
}

fn sample_bars(count: u16) -> Vec<Bar> {
    (0..count.min(3))
        .map(|i| {
            let base = 10.0 + f64::from(i);
            Bar {
                datetime: format!("2024-01-{:02} 15:00", i + 2),
                open: base,
                close: base + 0.2,
                high: base + 0.5,
                low: base - 0.3,
                volume: 10_000.0,
                amount: 100_000.0 * base,
            }
        })
        .collect()
}

fn sample_ticks() -> Vec<MinuteTick> {
    vec![
        MinuteTick { price: 10.01, volume: 1200 },
        MinuteTick { price: 10.03, volume: 800 },
    ]
}

fn sample_transactions(count: u32) -> Vec<Transaction> {
    (0..count.min(2))
        .map(|i| Transaction {
            time: format!("09:3{}", i),
            price: 10.0,
            volume: 100 * u64::from(i + 1),
            side: if i % 2 == 0 { TradeSide::Buy } else { TradeSide::Sell },
        })
        .collect()
}

#[async_trait]
impl QuoteApi for SimulatedClient {
    async fn get_security_count(&self, market: Market) -> Result<Option<u32>, ClientError> {
        self.respond("get_security_count", || 1000 + u32::from(market.code()))
    }

    async fn get_security_list(
        &self,
        market: Market,
        start: u32,
    ) -> Result<Option<Vec<SecurityInfo>>, ClientError> {
        self.respond("get_security_list", || {
            (0..3)
                .map(|i| SecurityInfo {
                    code: format!("{:06}", start + i),
                    name: format!("{:?} {}", market, start + i),
                    volunit: 100,
                    decimal_point: 2,
                    pre_close: 10.0,
                })
                .collect()
        })
    }

    async fn get_security_bars(
        &self,
        _category: BarCategory,
        _market: Market,
        _code: String,
        _start: u16,
        count: u16,
    ) -> Result<Option<Vec<Bar>>, ClientError> {
        self.respond("get_security_bars", || sample_bars(count))
    }

    async fn get_index_bars(
        &self,
        _category: BarCategory,
        _market: Market,
        _code: String,
        _start: u16,
        count: u16,
    ) -> Result<Option<Vec<Bar>>, ClientError> {
        self.respond("get_index_bars", || sample_bars(count))
    }

    async fn get_security_quotes(
        &self,
        stocks: Vec<SecurityId>,
    ) -> Result<Option<Vec<Quote>>, ClientError> {
        self.respond("get_security_quotes", || {
            stocks
                .into_iter()
                .map(|id| Quote {
                    market: id.market,
                    code: id.code,
                    price: 10.2,
                    last_close: 10.0,
                    open: 10.05,
                    high: 10.3,
                    low: 9.95,
                    volume: 125_000,
                    amount: 1_270_000.0,
                    bid1: 10.19,
                    ask1: 10.2,
                    servertime: "14:59:58.000".to_string(),
                })
                .collect()
        })
    }

    async fn get_minute_time_data(
        &self,
        _market: Market,
        _code: String,
    ) -> Result<Option<Vec<MinuteTick>>, ClientError> {
        self.respond("get_minute_time_data", sample_ticks)
    }

    async fn get_history_minute_time_data(
        &self,
        _market: Market,
        _code: String,
        _date: u32,
    ) -> Result<Option<Vec<MinuteTick>>, ClientError> {
        self.respond("get_history_minute_time_data", sample_ticks)
    }

    async fn get_transaction_data(
        &self,
        _market: Market,
        _code: String,
        _start: u32,
        count: u32,
    ) -> Result<Option<Vec<Transaction>>, ClientError> {
        self.respond("get_transaction_data", || sample_transactions(count))
    }

    async fn get_history_transaction_data(
        &self,
        _market: Market,
        _code: String,
        _start: u32,
        count: u32,
        _date: u32,
    ) -> Result<Option<Vec<Transaction>>, ClientError> {
        self.respond("get_history_transaction_data", || sample_transactions(count))
    }

    async fn get_company_info_category(
        &self,
        _market: Market,
        code: String,
    ) -> Result<Option<Vec<CompanyInfoCategory>>, ClientError> {
        self.respond("get_company_info_category", || {
            vec![CompanyInfoCategory {
                name: "公司概况".to_string(),
                filename: format!("{}.txt", code),
                start: 0,
                length: 4096,
            }]
        })
    }

    async fn get_company_info_content(
        &self,
        _market: Market,
        code: String,
        filename: String,
        start: u32,
        length: u32,
    ) -> Result<Option<String>, ClientError> {
        self.respond("get_company_info_content", || {
            format!("{} {} [{}..{}]", code, filename, start, start + length)
        })
    }

    async fn get_xdxr_info(
        &self,
        _market: Market,
        _code: String,
    ) -> Result<Option<Vec<XdxrRecord>>, ClientError> {
        self.respond("get_xdxr_info", || {
            vec![XdxrRecord {
                year: 2023,
                month: 6,
                day: 15,
                category: 1,
                name: "除权除息".to_string(),
                cash_dividend: Some(2.5),
                bonus_shares: None,
                rights_shares: None,
                rights_price: None,
            }]
        })
    }

    async fn get_finance_info(
        &self,
        market: Market,
        code: String,
    ) -> Result<Option<FinanceInfo>, ClientError> {
        self.respond("get_finance_info", || FinanceInfo {
            market,
            code,
            updated_date: 20240331,
            float_shares: 1.9e9,
            total_shares: 2.0e9,
            total_assets: 5.2e10,
            net_assets: 2.1e10,
            revenue: 8.3e9,
            net_profit: 9.1e8,
        })
    }

    async fn do_heartbeat(&self) -> Result<Option<u32>, ClientError> {
        self.respond("do_heartbeat", || 1000)
    }

    async fn to_table(
        &self,
        records: Vec<serde_json::Value>,
    ) -> Result<Option<Table>, ClientError> {
        self.respond("to_table", || Table::from_records(&records))
    }
}
