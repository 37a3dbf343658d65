//! Dispatcher: registry lookup plus the interceptor chain.

use crate::context::{CallContext, MethodInfo};
use crate::interceptor::{Interceptor, Next};
use crate::invoker::{InvocationMode, Invoker};
use crate::message::AnyMessage;
use crate::registry::ServiceRegistry;
use std::sync::Arc;
use tether_kernel::gateway::{CallMetadata, GatewayError, Status};

/// Result of one dispatched call: the response or error, plus whatever
/// metadata the call produced (present on both paths).
#[derive(Debug)]
pub struct Dispatched {
    pub response: Result<AnyMessage, Status>,
    pub metadata: CallMetadata,
}

/// Invokes registered methods through the interceptor chain.
#[derive(Default)]
pub struct Dispatcher {
    registry: ServiceRegistry,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a method to an invoker; the invoker's mode is fixed from here on.
    pub fn register(
        &mut self,
        info: Arc<MethodInfo>,
        invoker: Arc<dyn Invoker>,
    ) -> Result<(), GatewayError> {
        self.registry.register(info, invoker)
    }

    /// Append an interceptor; the chain runs in the order added.
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    /// Invoke `ctx.method()` with `request`.
    ///
    /// Unregistered methods fail with `Unimplemented` without touching the
    /// chain. Local calls report header and trailer metadata as one set.
    pub async fn dispatch(&self, ctx: &CallContext, request: AnyMessage) -> Dispatched {
        let full_method = ctx.method().full_method();
        let Some(entry) = self.registry.lookup(full_method) else {
            return Dispatched {
                response: Err(Status::unimplemented(format!(
                    "method {full_method} is not registered"
                ))),
                metadata: ctx.take_outgoing(),
            };
        };

        let response = Next::new(&self.interceptors, entry.invoker.as_ref())
            .run(ctx, request)
            .await;

        Dispatched {
            response,
            metadata: self.outgoing_for(ctx),
        }
    }

    /// Drain the metadata `ctx` has collected, shaped for its method's
    /// invocation mode: split for remote calls, collapsed otherwise.
    pub fn outgoing_for(&self, ctx: &CallContext) -> CallMetadata {
        let mode = self
            .registry
            .lookup(ctx.method().full_method())
            .map(|entry| entry.invoker.mode());
        match mode {
            Some(InvocationMode::Remote) => ctx.take_outgoing(),
            Some(InvocationMode::Local) | None => ctx.take_outgoing().collapsed(),
        }
    }
}
