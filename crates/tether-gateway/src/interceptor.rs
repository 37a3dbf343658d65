//! Interceptor chain wrapping every dispatched call.
//!
//! Interceptors run in declaration order, each receiving a [`Next`] that
//! invokes the remainder of the chain and finally the method's invoker. An
//! interceptor that returns without calling `next` short-circuits the call;
//! its result is passed on unchanged.

use crate::context::{CallContext, MethodInfo};
use crate::invoker::Invoker;
use crate::message::AnyMessage;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tether_kernel::gateway::Status;
use tracing::{info, warn};

/// A middleware stage around method invocation.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    async fn intercept(
        &self,
        ctx: &CallContext,
        request: AnyMessage,
        info: &MethodInfo,
        next: Next<'_>,
    ) -> Result<AnyMessage, Status>;
}

/// The remainder of an interceptor chain.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Interceptor>],
    invoker: &'a dyn Invoker,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Arc<dyn Interceptor>], invoker: &'a dyn Invoker) -> Self {
        Self {
            rest: chain,
            invoker,
        }
    }

    /// Run the next stage: the following interceptor, or the invoker once
    /// the chain is exhausted.
    pub async fn run(self, ctx: &CallContext, request: AnyMessage) -> Result<AnyMessage, Status> {
        match self.rest.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    rest,
                    invoker: self.invoker,
                };
                head.intercept(ctx, request, ctx.method(), next).await
            }
            None => self.invoker.invoke(ctx, request).await,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LoggingInterceptor
// ─────────────────────────────────────────────────────────────────────────────

/// Logs each call with its method, request id, latency and status code.
#[derive(Debug, Default)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "call-log"
    }

    async fn intercept(
        &self,
        ctx: &CallContext,
        request: AnyMessage,
        info: &MethodInfo,
        next: Next<'_>,
    ) -> Result<AnyMessage, Status> {
        let started = Instant::now();
        info!(
            request_id = %ctx.request_id(),
            method     = %info.full_method(),
            "→ dispatching call"
        );
        let result = next.run(ctx, request).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!(
                request_id = %ctx.request_id(),
                method     = %info.full_method(),
                code       = "OK",
                latency_ms,
                "← call completed"
            ),
            Err(status) => warn!(
                request_id = %ctx.request_id(),
                method     = %info.full_method(),
                code       = %status.code(),
                message    = %status.message(),
                latency_ms,
                "← call failed"
            ),
        }
        result
    }
}
