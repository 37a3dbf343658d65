use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tether_gateway::invoker::{RpcChannel, UnaryCall, UnaryOutcome};
use tether_kernel::gateway::{CallMetadata, Status};
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What the channel does when a method is called.
#[derive(Debug, Clone)]
enum Script {
    Reply { payload: Bytes, metadata: CallMetadata },
    Fail { status: Status, metadata: CallMetadata },
    /// Block until the caller cancels.
    Hang,
}

/// A scripted [`RpcChannel`].
///
/// Each method is given a canned reply, a failure or a hang. Every call is
/// recorded so tests can inspect the forwarded payload and metadata.
/// Methods with no script answer `Unimplemented`.
#[derive(Debug, Default)]
pub struct MockChannel {
    scripts: RwLock<HashMap<String, Script>>,
    call_history: RwLock<Vec<UnaryCall>>,
    entered: Notify,
    observed_cancel: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` with `message` and the given metadata.
    pub async fn reply<M: prost::Message>(&self, method: &str, message: &M, metadata: CallMetadata) {
        let payload = Bytes::from(message.encode_to_vec());
        self.scripts
            .write()
            .await
            .insert(method.to_string(), Script::Reply { payload, metadata });
    }

    /// Fail `method` with `status`.
    pub async fn fail(&self, method: &str, status: Status) {
        self.fail_with_metadata(method, status, CallMetadata::new()).await;
    }

    pub async fn fail_with_metadata(&self, method: &str, status: Status, metadata: CallMetadata) {
        self.scripts
            .write()
            .await
            .insert(method.to_string(), Script::Fail { status, metadata });
    }

    /// Make `method` block until the call is cancelled.
    pub async fn hang(&self, method: &str) {
        self.scripts
            .write()
            .await
            .insert(method.to_string(), Script::Hang);
    }

    /// Calls received so far, oldest first.
    pub async fn history(&self) -> Vec<UnaryCall> {
        self.call_history.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.call_history.read().await.len()
    }

    /// Resolves once a hanging call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Whether a hanging call saw its cancellation.
    pub fn observed_cancel(&self) -> bool {
        self.observed_cancel.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcChannel for MockChannel {
    async fn unary(&self, call: UnaryCall, cancel: &CancellationToken) -> UnaryOutcome {
        let method = call.method.clone();
        self.call_history.write().await.push(call);
        let script = self.scripts.read().await.get(&method).cloned();
        debug!(method = %method, "mock channel call");

        match script {
            Some(Script::Reply { payload, metadata }) => UnaryOutcome::ok(payload, metadata),
            Some(Script::Fail { status, metadata }) => UnaryOutcome {
                result: Err(status),
                metadata,
            },
            Some(Script::Hang) => {
                self.entered.notify_one();
                cancel.cancelled().await;
                self.observed_cancel.store(true, Ordering::SeqCst);
                UnaryOutcome::err(Status::cancelled("context canceled"))
            }
            None => UnaryOutcome::err(Status::unimplemented(format!(
                "unknown method {method}"
            ))),
        }
    }
}

#[macro_export]
macro_rules! assert_calls {
    ($channel:expr, $expected_count:expr) => {
        let count = $channel.call_count().await;
        assert_eq!(
            count, $expected_count,
            "expected {} upstream calls, got {}",
            $expected_count, count
        );
    };
}
