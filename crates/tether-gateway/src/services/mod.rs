//! Service bindings: message types, server and client capabilities, and
//! gateway registration for each routed RPC service.
//!
//! Every service exposes the same three registration entry points:
//!
//! | Entry point | Dispatch |
//! |-------------|----------|
//! | `register_*_handler_server` | in-process, through the server capability |
//! | `register_*_handler_client` | over the client's [`RpcChannel`] |
//! | `register_*_handler_from_endpoint` | dials the endpoint, then as `_client` |

pub mod assets;
pub mod audit;

use crate::invoker::{RpcChannel, UnaryCall};
use crate::message::Message;
use bytes::Bytes;
use std::time::Duration;
use tether_kernel::gateway::{CallMetadata, MetadataMap, Status};
use tokio_util::sync::CancellationToken;

/// A typed reply plus the metadata that came with it.
#[derive(Debug, Clone)]
pub struct Reply<M> {
    pub message: M,
    pub metadata: CallMetadata,
}

/// Options for one client call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub metadata: MetadataMap,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

pub(crate) async fn call_unary<Req: Message, Resp: Message>(
    channel: &dyn RpcChannel,
    method: &str,
    request: &Req,
    options: CallOptions,
) -> Result<Reply<Resp>, Status> {
    let call = UnaryCall {
        method: method.to_string(),
        payload: Bytes::from(request.encode_to_vec()),
        metadata: options.metadata,
        timeout: options.timeout,
    };
    let cancel = options.cancel.unwrap_or_default();
    let outcome = channel.unary(call, &cancel).await;
    let payload = outcome.result?;
    let message = Resp::decode(payload)
        .map_err(|e| Status::internal(format!("failed to decode response: {e}")))?;
    Ok(Reply {
        message,
        metadata: outcome.metadata,
    })
}
