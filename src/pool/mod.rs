//! Hot-standby failover pool
//!
//! This module provides:
//! - [`PoolManager`]: one active and one standby quote session, with the
//!   connect/disconnect lifecycle and the forwarded query operations
//! - the retry-and-failover executor every forwarded call runs through
//! - [`RetryPolicy`]: resilient and fail-fast retry budgets
//! - [`PoolSession`]: guard that disconnects the pool when dropped

mod executor;
mod forward;
pub mod error;
pub mod manager;
pub mod policy;

pub use error::{CallFailure, PoolError};
pub use forward::FORWARDED_OPERATIONS;
pub use manager::{ClientFactory, PoolManager, PoolSession, PoolState, PoolStats};
pub use policy::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL};
