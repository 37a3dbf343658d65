//! Tether testing utilities
//!
//! Doubles for exercising the gateway without a live upstream: a scripted
//! RPC channel and in-memory service implementations.

pub mod channel;
pub mod services;

pub use channel::MockChannel;
pub use services::{InMemoryAssetsApi, InMemoryAuditApi};
