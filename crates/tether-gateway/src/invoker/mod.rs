//! Invokers: the two ways a routed call reaches its method.
//!
//! | Mode | Implementation | Metadata |
//! |------|----------------|----------|
//! | in-process | [`LocalInvoker`] | header and trailer collapsed into one set |
//! | over a channel | [`RemoteInvoker`] | header and trailer kept distinct |
//!
//! The mode is fixed when a method is registered, so routing and dispatch
//! never branch on it.

mod channel;
mod local;
mod remote;

pub use channel::{RawCodec, RpcChannel, TonicChannel, UnaryCall, UnaryOutcome};
pub use local::LocalInvoker;
pub use remote::RemoteInvoker;

use crate::context::CallContext;
use crate::message::AnyMessage;
use async_trait::async_trait;
use tether_kernel::gateway::Status;

/// How an invoker reaches its method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    Local,
    Remote,
}

/// Performs one unary call.
#[async_trait]
pub trait Invoker: Send + Sync {
    fn mode(&self) -> InvocationMode;

    /// Invoke the method with `request`. Metadata produced by the call is
    /// reported through `ctx`.
    async fn invoke(&self, ctx: &CallContext, request: AnyMessage) -> Result<AnyMessage, Status>;
}
