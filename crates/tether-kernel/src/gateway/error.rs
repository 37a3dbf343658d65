//! Gateway error types for `tether-kernel`.
//!
//! [`GatewayError`] covers every failure mode that can be detected at
//! *definition time*: malformed route templates, duplicate registrations and
//! invalid configuration values, all caught before the gateway serves its
//! first request. Per-request failures are expressed as a
//! [`Status`](super::status::Status) instead, and codec failures as
//! [`MarshalError`].

use thiserror::Error;

/// Startup / configuration error type for the gateway kernel contract.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    // ── Identity ────────────────────────────────────────────────────────────
    /// The gateway configuration `id` field is empty or whitespace-only.
    #[error("gateway id cannot be empty")]
    EmptyGatewayId,

    // ── Routes ───────────────────────────────────────────────────────────────
    /// A route template is syntactically invalid.
    #[error("invalid route template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// The exact same verb + template pair has already been registered.
    #[error("route {verb} {template} is already registered")]
    DuplicateRoute { verb: String, template: String },

    /// A fully qualified RPC method has already been bound to an invoker.
    #[error("method '{0}' is already registered")]
    DuplicateMethod(String),

    /// A route names a method that has no invoker bound.
    #[error("method '{0}' is not registered")]
    UnknownMethod(String),

    // ── Network ──────────────────────────────────────────────────────────────
    /// The listen address cannot be parsed as `host:port`.
    #[error("listen address '{0}' is invalid")]
    InvalidListenAddr(String),

    /// The upstream endpoint used for remote dispatch is invalid.
    #[error("upstream endpoint '{0}' is invalid: {1}")]
    InvalidEndpoint(String, String),

    // ── Limits ───────────────────────────────────────────────────────────────
    /// `connect_timeout_ms` is zero, which would fail every dial.
    #[error("connect timeout must be greater than 0 ms")]
    InvalidTimeout,

    /// `max_body_bytes` is zero, which would reject every request body.
    #[error("max body size must be greater than 0 bytes")]
    InvalidBodyLimit,
}

impl GatewayError {
    pub(crate) fn invalid_template(template: &str, reason: impl Into<String>) -> Self {
        GatewayError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure while translating between wire bytes and message values.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MarshalError {
    /// The payload is not valid for the marshaler's content type.
    #[error("malformed {content_type} payload: {source}")]
    Malformed {
        content_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The payload parsed, but does not fit the target message shape.
    #[error("payload does not match message shape: {0}")]
    Shape(String),

    /// A message value could not be rendered to bytes.
    #[error("failed to encode {content_type} payload: {source}")]
    Encode {
        content_type: String,
        #[source]
        source: serde_json::Error,
    },
}
