//! hqpool - market quote client pool with hot-standby failover

pub mod cli;
pub mod client;
pub mod config;
pub mod core;
pub mod pool;
pub mod source;

pub use crate::client::{ClientError, ClientOptions, QueryClient, QuoteApi};
pub use crate::config::Config;
pub use crate::core::Core;
pub use crate::pool::{PoolError, PoolManager, PoolSession, PoolState, RetryPolicy};
pub use crate::source::{Endpoint, EndpointSource};
