//! `tether-gateway`: HTTP/JSON front door for RPC services.
//!
//! This crate implements the runtime around the contracts defined in
//! `tether-kernel::gateway`:
//!
//! | Concern | Implementation |
//! |---------|----------------|
//! | Route table and request state machine | [`router::GatewayMux`] |
//! | Method lookup and interceptor chain | [`dispatch::Dispatcher`], [`interceptor::Interceptor`] |
//! | In-process calls | [`invoker::LocalInvoker`] |
//! | Calls over a channel | [`invoker::RemoteInvoker`], [`invoker::TonicChannel`] |
//! | Service bindings | [`services::audit`], [`services::assets`] |
//!
//! The [`server::GatewayServer`] puts a mux behind an axum listener.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether_gateway::router::GatewayMux;
//! use tether_gateway::server::GatewayServer;
//! use tether_gateway::services::audit::{register_audit_api_handler_server, UnimplementedAuditApi};
//! use tether_kernel::gateway::GatewayConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = GatewayConfig::new("my-gateway").with_listen_addr("127.0.0.1:8080");
//!     let mut mux = GatewayMux::from_config(&config);
//!     register_audit_api_handler_server(&mut mux, Arc::new(UnimplementedAuditApi)).unwrap();
//!
//!     GatewayServer::new(config, mux).start().await.unwrap();
//! }
//! ```

pub mod context;
pub mod dispatch;
pub mod error;
pub mod interceptor;
pub mod invoker;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod services;

// Re-export the kernel gateway types for convenience.
pub use tether_kernel::gateway;
