//! In-process invocation.

use super::{InvocationMode, Invoker};
use crate::context::CallContext;
use crate::message::{AnyMessage, Message};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tether_kernel::gateway::Status;

type Handler<Req, Resp> =
    Arc<dyn Fn(CallContext, Req) -> BoxFuture<'static, Result<Resp, Status>> + Send + Sync>;

/// Calls an async handler function directly, skipping the transport.
pub struct LocalInvoker<Req, Resp> {
    handler: Handler<Req, Resp>,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> LocalInvoker<Req, Resp>
where
    Req: Message,
    Resp: Message,
{
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |ctx, req| Box::pin(handler(ctx, req))),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<Req, Resp> Invoker for LocalInvoker<Req, Resp>
where
    Req: Message,
    Resp: Message,
{
    fn mode(&self) -> InvocationMode {
        InvocationMode::Local
    }

    async fn invoke(&self, ctx: &CallContext, request: AnyMessage) -> Result<AnyMessage, Status> {
        let request = request.downcast::<Req>()?;
        let response = (self.handler)(ctx.clone(), request).await?;
        Ok(AnyMessage::new(response))
    }
}
