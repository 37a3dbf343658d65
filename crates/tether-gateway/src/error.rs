//! Gateway runtime error types.
//!
//! Failures that happen outside any single request: binding the listener,
//! preparing the upstream channel, registering routes, serving. Per-request
//! failures never use this type; they are a kernel
//! [`Status`](tether_kernel::gateway::Status) translated into the HTTP error
//! envelope.

use tether_kernel::gateway::GatewayError;
use thiserror::Error;

/// Gateway runtime errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayImplError {
    #[error("invalid upstream endpoint '{endpoint}': {reason}")]
    InvalidUpstream { endpoint: String, reason: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error(transparent)]
    Definition(#[from] GatewayError),
}

pub type GatewayImplResult<T> = Result<T, GatewayImplError>;
