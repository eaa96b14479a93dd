//! Quote client interface
//!
//! This module defines what the pool manager needs from a quote server
//! session:
//! - [`QuoteApi`]: the query operations, generated from the operation table
//!   in `ops.rs`
//! - [`QueryClient`]: connect/disconnect lifecycle on top of `QuoteApi`
//! - [`ClientOptions`]: flags every session is constructed with
//!
//! The wire protocol lives in concrete client implementations.
//! [`SimulatedClient`] is an in-memory implementation with failure injection,
//! used by the `simulate` command and by the test suites.
//!
//! Query operations report two kinds of trouble: `Err(ClientError)` for
//! transport failures and `Ok(None)` when the server answered without data.
//! The pool manager treats both as transient and fails over.

pub(crate) mod ops;
pub mod sim;
pub mod types;

use async_trait::async_trait;
use std::time::Duration;

use crate::source::Endpoint;

pub use sim::{CallRecord, Outcome, SimulatedClient, SimulatedNetwork};
pub use types::{
    records, Bar, BarCategory, CompanyInfoCategory, FinanceInfo, Market, MinuteTick, Quote,
    SecurityId, SecurityInfo, Table, TradeSide, Transaction, XdxrRecord,
};

/// Error types for client sessions
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to connect to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: Endpoint, reason: String },

    #[error("Client is not connected")]
    NotConnected,

    #[error("Request timed out")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flags a client session is constructed with
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Session must tolerate calls from several tasks at once
    pub multithread_safe: bool,

    /// Session keeps itself alive with periodic heartbeats
    pub heartbeat: bool,

    /// Interval between heartbeats
    pub heartbeat_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            multithread_safe: true,
            heartbeat: true,
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

macro_rules! declare_quote_api {
    ($(
        $(#[$meta:meta])*
        fn $name:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;
    )*) => {
        /// Query operations offered by a quote server session
        ///
        /// `Ok(None)` means the server returned no data.
        #[async_trait]
        pub trait QuoteApi: Send + Sync {
            $(
                $(#[$meta])*
                async fn $name(&self, $($arg: $ty),*) -> Result<Option<$ret>, ClientError>;
            )*
        }

        /// Names of every operation in [`QuoteApi`], in declaration order
        pub const OPERATIONS: &[&str] = &[$(stringify!($name)),*];
    };
}

ops::with_operations!(declare_quote_api);

/// A stateful session bound to one endpoint
#[async_trait]
pub trait QueryClient: QuoteApi + 'static {
    /// Open the session to `endpoint`
    async fn connect(&self, endpoint: &Endpoint) -> Result<(), ClientError>;

    /// Close the session
    async fn disconnect(&self) -> Result<(), ClientError>;

    /// Endpoint the session is bound to, if any
    fn endpoint(&self) -> Option<Endpoint>;
}
