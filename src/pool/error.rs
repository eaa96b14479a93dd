use crate::client::ClientError;
use crate::source::{Endpoint, SourceError};

/// Why a single attempt of a forwarded call failed
#[derive(Debug, thiserror::Error)]
pub enum CallFailure {
    #[error("transport error: {0}")]
    Transport(#[from] ClientError),

    #[error("server returned no data")]
    NoData,
}

/// Error types for pool manager operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("{operation}: max retries ({max_retries}) reached")]
    MaxRetriesExceeded {
        operation: &'static str,
        max_retries: u32,
        #[source]
        last_failure: CallFailure,
    },

    #[error("{operation} failed: {failure}")]
    Call {
        operation: &'static str,
        #[source]
        failure: CallFailure,
    },

    #[error("Failed to connect to {endpoint}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: ClientError,
    },

    #[error("Active and standby must be different endpoints, both are {0}")]
    DuplicateEndpoint(Endpoint),

    #[error("Pool is already connected")]
    AlreadyConnected,

    #[error("Pool is not connected")]
    NotConnected,

    #[error("Pool has been disconnected")]
    Closed,

    #[error("Failed to release {role} connection")]
    Disconnect {
        role: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("Endpoint source error: {0}")]
    Source(#[from] SourceError),
}

impl PoolError {
    /// The transport error behind a fail-fast call failure, if any
    pub fn transport_error(&self) -> Option<&ClientError> {
        match self {
            PoolError::Call {
                failure: CallFailure::Transport(e),
                ..
            } => Some(e),
            _ => None,
        }
    }
}
