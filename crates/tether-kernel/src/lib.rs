//! Tether kernel: the pure contracts of an HTTP-to-RPC gateway.
//!
//! See [`gateway`] for the module map.

// gateway module
pub mod gateway;
pub use gateway::*;
