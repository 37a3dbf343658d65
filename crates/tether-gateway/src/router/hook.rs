//! Forward-response hooks.

use crate::context::CallContext;
use crate::message::AnyMessage;
use http::HeaderMap;
use tether_kernel::gateway::Status;

/// Runs after a successful call, before the response is written.
///
/// Hooks run in registration order. A hook may add response headers; an
/// error fails the request and is translated like any other call error.
pub trait ResponseHook: Send + Sync {
    fn name(&self) -> &str;

    fn on_response(
        &self,
        ctx: &CallContext,
        response: &AnyMessage,
        headers: &mut HeaderMap,
    ) -> Result<(), Status>;
}
