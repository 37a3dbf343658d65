//! Invocation over an [`RpcChannel`].

use super::{InvocationMode, Invoker, RpcChannel, UnaryCall};
use crate::context::CallContext;
use crate::message::{AnyMessage, Message};
use async_trait::async_trait;
use bytes::Bytes;
use std::marker::PhantomData;
use std::sync::Arc;
use tether_kernel::gateway::Status;

/// Encodes the request, performs one unary call on a shared channel and
/// decodes the reply as `Resp`.
///
/// Header and trailer metadata returned by the remote side are recorded on
/// the call context as two distinct sets, on success and on failure alike.
pub struct RemoteInvoker<Resp> {
    channel: Arc<dyn RpcChannel>,
    _marker: PhantomData<fn() -> Resp>,
}

impl<Resp: Message> RemoteInvoker<Resp> {
    pub fn new(channel: Arc<dyn RpcChannel>) -> Self {
        Self {
            channel,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<Resp: Message> Invoker for RemoteInvoker<Resp> {
    fn mode(&self) -> InvocationMode {
        InvocationMode::Remote
    }

    async fn invoke(&self, ctx: &CallContext, request: AnyMessage) -> Result<AnyMessage, Status> {
        let call = UnaryCall {
            method: ctx.method().full_method().to_string(),
            payload: Bytes::from(request.encode_to_vec()),
            metadata: ctx.incoming().clone(),
            timeout: ctx.remaining(),
        };
        let outcome = self.channel.unary(call, ctx.cancellation()).await;
        ctx.record(&outcome.metadata);

        let payload = outcome.result?;
        let response = Resp::decode(payload)
            .map_err(|e| Status::internal(format!("failed to decode response: {e}")))?;
        Ok(AnyMessage::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MethodInfo;
    use crate::invoker::UnaryOutcome;
    use parking_lot::Mutex;
    use prost::Message as _;
    use tether_kernel::gateway::{CallMetadata, Code, MetadataMap};
    use tokio_util::sync::CancellationToken;

    #[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
    struct Word {
        #[prost(string, tag = "1")]
        text: String,
    }

    /// Replies with the upper-cased request and fixed metadata.
    struct Shout {
        calls: Mutex<Vec<UnaryCall>>,
        fail: Option<Status>,
    }

    #[async_trait]
    impl RpcChannel for Shout {
        async fn unary(&self, call: UnaryCall, _cancel: &CancellationToken) -> UnaryOutcome {
            self.calls.lock().push(call.clone());
            let metadata = CallMetadata {
                header: [("x-phase", "header")].into_iter().collect(),
                trailer: [("x-phase", "trailer")].into_iter().collect(),
            };
            let result = match &self.fail {
                Some(status) => Err(status.clone()),
                None => {
                    let word = Word::decode(call.payload).unwrap();
                    Ok(Bytes::from(
                        Word {
                            text: word.text.to_uppercase(),
                        }
                        .encode_to_vec(),
                    ))
                }
            };
            UnaryOutcome { result, metadata }
        }
    }

    fn ctx() -> CallContext {
        let incoming: MetadataMap = [("authorization", "Bearer t")].into_iter().collect();
        CallContext::new(
            "req",
            Arc::new(MethodInfo::new("/words.Loud/Shout", "POST /shout")),
            incoming,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn encodes_request_and_keeps_metadata_split() {
        let channel = Arc::new(Shout {
            calls: Mutex::new(Vec::new()),
            fail: None,
        });
        let invoker = RemoteInvoker::<Word>::new(channel.clone());
        let ctx = ctx();
        let out = invoker
            .invoke(&ctx, AnyMessage::new(Word { text: "hi".into() }))
            .await
            .unwrap();
        assert_eq!(out.downcast::<Word>().unwrap().text, "HI");

        let calls = channel.calls.lock();
        assert_eq!(calls[0].method, "/words.Loud/Shout");
        assert_eq!(calls[0].metadata.get("authorization"), Some("Bearer t"));

        let md = ctx.take_outgoing();
        assert_eq!(md.header.get_all("x-phase"), ["header"]);
        assert_eq!(md.trailer.get_all("x-phase"), ["trailer"]);
    }

    #[tokio::test]
    async fn remote_status_passes_through_with_metadata() {
        let channel = Arc::new(Shout {
            calls: Mutex::new(Vec::new()),
            fail: Some(Status::not_found("no such word")),
        });
        let invoker = RemoteInvoker::<Word>::new(channel);
        let ctx = ctx();
        let err = invoker
            .invoke(&ctx, AnyMessage::new(Word::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        assert!(!ctx.take_outgoing().trailer.is_empty());
    }
}
