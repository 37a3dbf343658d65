//! Gateway kernel contract.
//!
//! This module defines the *data types and pure functions* of the
//! HTTP-to-RPC gateway. Nothing here performs I/O; the runtime pieces
//! (dispatch, invokers, the HTTP server) live in `tether-gateway`.
//!
//! # Architecture mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              tether-kernel  (this module)                   │
//! │  RouteTemplate + PathParams     Marshaler + registry        │
//! │  MetadataMap / CallMetadata     Status + translate()        │
//! │  GatewayRequest / Response      GatewayConfig + validate()  │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              tether-gateway  (runtime crate)                │
//! │  GatewayMux (route table)   Dispatcher + interceptors       │
//! │  LocalInvoker / RemoteInvoker (tonic channel)               │
//! │  Service bindings           GatewayServer (axum)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tether_kernel::gateway::{GatewayConfig, RouteTemplate};
//!
//! let config = GatewayConfig::new("edge").with_upstream("http://127.0.0.1:9090");
//! config.validate().expect("gateway config is valid");
//!
//! let template = RouteTemplate::compile("/v1/audit/getEvent", "POST").unwrap();
//! assert!(template.matches("POST", "/v1/audit/getEvent").is_some());
//! ```

pub mod config;
pub mod error;
pub mod marshal;
pub mod metadata;
pub mod pattern;
pub mod status;

// ── Flat re-exports ────────────────────────────────────────────────────────

#[cfg(feature = "config")]
pub use config::{ConfigError, ConfigResult};
pub use config::GatewayConfig;
pub use error::{GatewayError, MarshalError};
pub use marshal::{
    decode_message, encode_message, JsonMarshaler, Marshaler, MarshalerRegistry, MIME_WILDCARD,
};
pub use metadata::{CallMetadata, HeaderBridge, MetadataMap};
pub use pattern::{PathParams, RouteTemplate};
pub use status::{translate, Code, ErrorEnvelope, Status};

// types module is pub so the runtime can build requests/responses directly
pub mod types;
pub use types::{GatewayRequest, GatewayResponse, HttpMethod};
