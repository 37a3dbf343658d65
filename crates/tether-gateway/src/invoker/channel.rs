//! RPC channel seam and its tonic-backed implementation.
//!
//! An [`RpcChannel`] performs one unary call with an already-encoded
//! payload. It is borrowed per call and shared across concurrent requests;
//! nothing in the gateway closes it per call.

use crate::error::{GatewayImplError, GatewayImplResult};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes};
use http::uri::PathAndQuery;
use std::time::Duration;
use tether_kernel::gateway::metadata::DEFAULT_RESERVED_HEADERS;
use tether_kernel::gateway::{CallMetadata, Code, MetadataMap, Status};
use tokio_util::sync::CancellationToken;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, KeyAndValueRef};
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, instrument};

/// One outbound unary call.
#[derive(Debug, Clone)]
pub struct UnaryCall {
    /// `/package.Service/Method`.
    pub method: String,
    /// Wire-encoded request message.
    pub payload: Bytes,
    /// Metadata sent with the request.
    pub metadata: MetadataMap,
    /// Time left for the call, if bounded.
    pub timeout: Option<Duration>,
}

/// Result of a unary call plus the metadata the remote side returned, even
/// on failure.
#[derive(Debug)]
pub struct UnaryOutcome {
    pub result: Result<Bytes, Status>,
    pub metadata: CallMetadata,
}

impl UnaryOutcome {
    pub fn ok(payload: Bytes, metadata: CallMetadata) -> Self {
        Self {
            result: Ok(payload),
            metadata,
        }
    }

    pub fn err(status: Status) -> Self {
        Self {
            result: Err(status),
            metadata: CallMetadata::new(),
        }
    }
}

/// Connection capability used by remote invokers.
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Perform `call`. Must stop and report `Cancelled` once `cancel`
    /// fires. Transport failures are reported as `Unavailable`.
    async fn unary(&self, call: UnaryCall, cancel: &CancellationToken) -> UnaryOutcome;
}

// ─────────────────────────────────────────────────────────────────────────────
// RawCodec
// ─────────────────────────────────────────────────────────────────────────────

/// Pass-through codec: messages are encoded before they reach tonic.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawCodec;
    type Decoder = RawCodec;

    fn encoder(&mut self) -> Self::Encoder {
        RawCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawCodec
    }
}

impl Encoder for RawCodec {
    type Item = Bytes;
    type Error = tonic::Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put(item);
        Ok(())
    }
}

impl Decoder for RawCodec {
    type Item = Bytes;
    type Error = tonic::Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let len = src.remaining();
        Ok(Some(src.copy_to_bytes(len)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TonicChannel
// ─────────────────────────────────────────────────────────────────────────────

/// [`RpcChannel`] over a tonic HTTP/2 channel.
///
/// The underlying channel multiplexes concurrent calls and reconnects on
/// its own.
#[derive(Debug, Clone)]
pub struct TonicChannel {
    channel: Channel,
    endpoint: String,
}

impl TonicChannel {
    /// Prepare a lazily connected channel to `endpoint`. The first call
    /// performs the dial.
    pub fn connect_lazy(endpoint: &str, connect_timeout: Duration) -> GatewayImplResult<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| GatewayImplError::InvalidUpstream {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?
            .connect_timeout(connect_timeout)
            .connect_lazy();
        Ok(Self::from_channel(channel, endpoint))
    }

    /// Wrap an existing tonic channel.
    pub fn from_channel(channel: Channel, endpoint: impl Into<String>) -> Self {
        Self {
            channel,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, call: UnaryCall) -> UnaryOutcome {
        let path = match PathAndQuery::try_from(call.method.as_str()) {
            Ok(path) => path,
            Err(e) => return UnaryOutcome::err(Status::internal(format!("invalid method path: {e}"))),
        };

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        if let Err(e) = grpc.ready().await {
            return UnaryOutcome::err(Status::unavailable(format!(
                "upstream {} not ready: {e}",
                self.endpoint
            )));
        }

        let mut request = tonic::Request::new(call.payload);
        write_request_metadata(request.metadata_mut(), &call.metadata);
        if let Some(timeout) = call.timeout {
            request.set_timeout(timeout);
        }

        match grpc.unary(request, path, RawCodec).await {
            Ok(response) => {
                let metadata = CallMetadata {
                    header: read_metadata(response.metadata()),
                    trailer: MetadataMap::new(),
                };
                UnaryOutcome::ok(response.into_inner(), metadata)
            }
            Err(status) => UnaryOutcome {
                metadata: CallMetadata {
                    header: read_metadata(status.metadata()),
                    trailer: MetadataMap::new(),
                },
                result: Err(from_tonic(&status)),
            },
        }
    }
}

#[async_trait]
impl RpcChannel for TonicChannel {
    #[instrument(skip_all, fields(method = %call.method, endpoint = %self.endpoint))]
    async fn unary(&self, call: UnaryCall, cancel: &CancellationToken) -> UnaryOutcome {
        // Cancellation is checked first so an already-cancelled caller never
        // dials.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("call cancelled by caller");
                UnaryOutcome::err(Status::cancelled("context canceled"))
            }
            outcome = self.call(call) => outcome,
        }
    }
}

fn write_request_metadata(target: &mut tonic::metadata::MetadataMap, source: &MetadataMap) {
    for (key, values) in source.iter() {
        let Ok(name) = AsciiMetadataKey::from_bytes(key.as_bytes()) else {
            debug!(key, "skipping metadata key not valid for the transport");
            continue;
        };
        for value in values {
            if let Ok(value) = AsciiMetadataValue::try_from(value.as_str()) {
                target.append(name.clone(), value);
            }
        }
    }
}

/// Copy transport metadata, leaving out HTTP/2 framing headers.
fn read_metadata(source: &tonic::metadata::MetadataMap) -> MetadataMap {
    let mut md = MetadataMap::new();
    for entry in source.iter() {
        let KeyAndValueRef::Ascii(key, value) = entry else {
            continue;
        };
        let key = key.as_str();
        if is_framing_header(key) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            md.append(key, value);
        }
    }
    md
}

fn is_framing_header(key: &str) -> bool {
    key.starts_with("grpc-") || key == "date" || DEFAULT_RESERVED_HEADERS.contains(&key)
}

/// Convert a transport status; the numeric code carries over unchanged.
pub(crate) fn from_tonic(status: &tonic::Status) -> Status {
    Status::new(Code::from_i32(i32::from(status.code())), status.message())
}
