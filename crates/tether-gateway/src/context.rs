//! Per-call context handed to interceptors and invokers.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tether_kernel::gateway::{CallMetadata, MetadataMap, PathParams};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Request header carrying the caller's deadline, e.g. `500m` or `2S`.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

// ─────────────────────────────────────────────────────────────────────────────
// MethodInfo
// ─────────────────────────────────────────────────────────────────────────────

/// Static description of one routed RPC method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    full_method: String,
    http_pattern: String,
}

impl MethodInfo {
    /// `full_method` is `/package.Service/Method`.
    pub fn new(full_method: impl Into<String>, http_pattern: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
            http_pattern: http_pattern.into(),
        }
    }

    pub fn full_method(&self) -> &str {
        &self.full_method
    }

    /// Canonical route this method is reachable at, e.g. `POST /v1/audit/getEvents`.
    pub fn http_pattern(&self) -> &str {
        &self.http_pattern
    }

    /// `package.Service` part of the method name.
    pub fn service(&self) -> &str {
        self.split().0
    }

    /// Bare method name.
    pub fn method(&self) -> &str {
        self.split().1
    }

    fn split(&self) -> (&str, &str) {
        let trimmed = self.full_method.trim_start_matches('/');
        trimmed.rsplit_once('/').unwrap_or(("", trimmed))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CallContext
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a call carries besides its request message.
///
/// Cloning is cheap and clones share the outgoing metadata sink, so a
/// handler running on a clone still reports metadata to the gateway.
#[derive(Debug, Clone)]
pub struct CallContext {
    request_id: String,
    method: Arc<MethodInfo>,
    incoming: Arc<MetadataMap>,
    path_params: Arc<PathParams>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    outgoing: Arc<Mutex<CallMetadata>>,
}

impl CallContext {
    pub fn new(
        request_id: impl Into<String>,
        method: Arc<MethodInfo>,
        incoming: MetadataMap,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            method,
            incoming: Arc::new(incoming),
            path_params: Arc::new(PathParams::new()),
            cancel,
            deadline: None,
            outgoing: Arc::new(Mutex::new(CallMetadata::new())),
        }
    }

    pub fn with_path_params(mut self, params: PathParams) -> Self {
        self.path_params = Arc::new(params);
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn method(&self) -> &MethodInfo {
        &self.method
    }

    /// Metadata derived from the HTTP request headers.
    pub fn incoming(&self) -> &MetadataMap {
        &self.incoming
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `Some(ZERO)` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Send a header metadata value back to the caller.
    pub fn set_header(&self, key: &str, value: impl Into<String>) {
        self.outgoing.lock().header.append(key, value);
    }

    /// Send a trailer metadata value back to the caller.
    pub fn set_trailer(&self, key: &str, value: impl Into<String>) {
        self.outgoing.lock().trailer.append(key, value);
    }

    /// Merge metadata returned by a transport into the outgoing set.
    pub fn record(&self, metadata: &CallMetadata) {
        self.outgoing.lock().merge_from(metadata);
    }

    /// Drain the outgoing metadata collected so far.
    pub fn take_outgoing(&self) -> CallMetadata {
        std::mem::take(&mut *self.outgoing.lock())
    }
}

/// Parse a `Grpc-Timeout` value: up to eight ASCII digits followed by one
/// unit of `H`, `M`, `S`, `m`, `u` or `n`.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    let unit = value.chars().last()?;
    let digits = &value[..value.len() - unit.len_utf8()];
    if digits.is_empty() || digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    match unit {
        'H' => Some(Duration::from_secs(amount * 3600)),
        'M' => Some(Duration::from_secs(amount * 60)),
        'S' => Some(Duration::from_secs(amount)),
        'm' => Some(Duration::from_millis(amount)),
        'u' => Some(Duration::from_micros(amount)),
        'n' => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}
