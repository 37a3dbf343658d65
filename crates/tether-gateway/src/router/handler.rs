//! Route handlers: the per-route half of a registration.
//!
//! A route handler knows which method its route targets and how to build
//! that method's request message from a body and path parameters. Invoking
//! the method is the dispatcher's job.

use crate::context::MethodInfo;
use crate::message::{AnyMessage, Message};
use std::marker::PhantomData;
use std::sync::Arc;
use tether_kernel::gateway::{decode_message, MarshalError, Marshaler, PathParams};

pub trait RouteHandler: Send + Sync {
    /// Method this route dispatches to.
    fn method(&self) -> &Arc<MethodInfo>;

    /// Build the request message. A body with no content yields the zero
    /// value.
    fn decode(
        &self,
        marshaler: &dyn Marshaler,
        body: &[u8],
        params: &PathParams,
    ) -> Result<AnyMessage, MarshalError>;
}

/// Handler for a unary method taking `Req`.
pub struct UnaryRoute<Req> {
    method: Arc<MethodInfo>,
    _marker: PhantomData<fn() -> Req>,
}

impl<Req: Message> UnaryRoute<Req> {
    pub fn new(method: Arc<MethodInfo>) -> Self {
        Self {
            method,
            _marker: PhantomData,
        }
    }
}

impl<Req: Message> RouteHandler for UnaryRoute<Req> {
    fn method(&self) -> &Arc<MethodInfo> {
        &self.method
    }

    fn decode(
        &self,
        marshaler: &dyn Marshaler,
        body: &[u8],
        params: &PathParams,
    ) -> Result<AnyMessage, MarshalError> {
        decode_message::<Req>(marshaler, body, params).map(AnyMessage::new)
    }
}
