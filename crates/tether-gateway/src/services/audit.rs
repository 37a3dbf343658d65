//! `clutch.audit.v1.AuditAPI` binding.
//!
//! | RPC | Route |
//! |-----|-------|
//! | `GetEvents` | `POST /v1/audit/getEvents` |
//! | `GetEvent` | `POST /v1/audit/getEvent` |

use super::{call_unary, CallOptions, Reply};
use crate::context::CallContext;
use crate::error::GatewayImplResult;
use crate::invoker::{LocalInvoker, RemoteInvoker, RpcChannel, TonicChannel};
use crate::message::int64_json;
use crate::router::GatewayMux;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tether_kernel::gateway::{GatewayError, Status};
use tracing::info;

pub const SERVICE_NAME: &str = "clutch.audit.v1.AuditAPI";
pub const GET_EVENTS_METHOD: &str = "/clutch.audit.v1.AuditAPI/GetEvents";
pub const GET_EVENT_METHOD: &str = "/clutch.audit.v1.AuditAPI/GetEvent";
pub const GET_EVENTS_ROUTE: &str = "/v1/audit/getEvents";
pub const GET_EVENT_ROUTE: &str = "/v1/audit/getEvent";

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Closed interval of unix seconds.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeRange {
    #[prost(int64, tag = "1")]
    #[serde(with = "int64_json")]
    pub start_time: i64,
    #[prost(int64, tag = "2")]
    #[serde(with = "int64_json")]
    pub end_time: i64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetEventsRequest {
    #[prost(message, optional, tag = "1")]
    pub range: Option<TimeRange>,
    /// Look back this many seconds from now; ignored when `range` is set.
    #[prost(int64, tag = "2")]
    #[serde(with = "int64_json")]
    pub since_seconds: i64,
    #[prost(string, tag = "3")]
    pub page_token: String,
    #[prost(int64, tag = "4")]
    #[serde(with = "int64_json")]
    pub limit: i64,
}

/// One audited API call.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    #[prost(int64, tag = "1")]
    #[serde(with = "int64_json")]
    pub id: i64,
    /// RFC 3339 timestamp.
    #[prost(string, tag = "2")]
    pub occurred_at: String,
    #[prost(string, tag = "3")]
    pub username: String,
    #[prost(string, tag = "4")]
    pub service_name: String,
    #[prost(string, tag = "5")]
    pub method_name: String,
    #[prost(int32, tag = "6")]
    pub status_code: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetEventsResponse {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<Event>,
    #[prost(string, tag = "2")]
    pub next_page_token: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetEventRequest {
    #[prost(int64, tag = "1")]
    #[serde(with = "int64_json")]
    pub event_id: i64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetEventResponse {
    #[prost(message, optional, tag = "1")]
    pub event: Option<Event>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Server capability
// ─────────────────────────────────────────────────────────────────────────────

/// In-process implementation of the audit service. Every method defaults to
/// `Unimplemented`.
#[async_trait]
pub trait AuditApi: Send + Sync + 'static {
    async fn get_events(
        &self,
        _ctx: &CallContext,
        _request: GetEventsRequest,
    ) -> Result<GetEventsResponse, Status> {
        Err(Status::unimplemented("method GetEvents not implemented"))
    }

    async fn get_event(
        &self,
        _ctx: &CallContext,
        _request: GetEventRequest,
    ) -> Result<GetEventResponse, Status> {
        Err(Status::unimplemented("method GetEvent not implemented"))
    }
}

/// Server with no methods implemented.
#[derive(Debug, Default)]
pub struct UnimplementedAuditApi;

impl AuditApi for UnimplementedAuditApi {}

// ─────────────────────────────────────────────────────────────────────────────
// Client capability
// ─────────────────────────────────────────────────────────────────────────────

/// Audit client over a shared [`RpcChannel`].
#[derive(Clone)]
pub struct AuditApiClient {
    channel: Arc<dyn RpcChannel>,
}

impl AuditApiClient {
    pub fn new(channel: Arc<dyn RpcChannel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> Arc<dyn RpcChannel> {
        Arc::clone(&self.channel)
    }

    pub async fn get_events(
        &self,
        request: &GetEventsRequest,
        options: CallOptions,
    ) -> Result<Reply<GetEventsResponse>, Status> {
        call_unary(self.channel.as_ref(), GET_EVENTS_METHOD, request, options).await
    }

    pub async fn get_event(
        &self,
        request: &GetEventRequest,
        options: CallOptions,
    ) -> Result<Reply<GetEventResponse>, Status> {
        call_unary(self.channel.as_ref(), GET_EVENT_METHOD, request, options).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

/// Route the audit service to an in-process server.
pub fn register_audit_api_handler_server(
    mux: &mut GatewayMux,
    server: Arc<dyn AuditApi>,
) -> Result<(), GatewayError> {
    let svc = Arc::clone(&server);
    mux.bind_unary::<GetEventsRequest>(
        "POST",
        GET_EVENTS_ROUTE,
        GET_EVENTS_METHOD,
        Arc::new(LocalInvoker::new(move |ctx: CallContext, req: GetEventsRequest| {
            let svc = Arc::clone(&svc);
            async move { svc.get_events(&ctx, req).await }
        })),
    )?;

    let svc = server;
    mux.bind_unary::<GetEventRequest>(
        "POST",
        GET_EVENT_ROUTE,
        GET_EVENT_METHOD,
        Arc::new(LocalInvoker::new(move |ctx: CallContext, req: GetEventRequest| {
            let svc = Arc::clone(&svc);
            async move { svc.get_event(&ctx, req).await }
        })),
    )
}

/// Route the audit service through `client`'s channel.
pub fn register_audit_api_handler_client(
    mux: &mut GatewayMux,
    client: AuditApiClient,
) -> Result<(), GatewayError> {
    register_audit_api_handler(mux, client.channel())
}

/// Route the audit service through an existing channel.
pub fn register_audit_api_handler(
    mux: &mut GatewayMux,
    channel: Arc<dyn RpcChannel>,
) -> Result<(), GatewayError> {
    mux.bind_unary::<GetEventsRequest>(
        "POST",
        GET_EVENTS_ROUTE,
        GET_EVENTS_METHOD,
        Arc::new(RemoteInvoker::<GetEventsResponse>::new(Arc::clone(&channel))),
    )?;
    mux.bind_unary::<GetEventRequest>(
        "POST",
        GET_EVENT_ROUTE,
        GET_EVENT_METHOD,
        Arc::new(RemoteInvoker::<GetEventResponse>::new(channel)),
    )
}

/// Dial `endpoint` and route the audit service through it.
///
/// The channel lives as long as the mux's routes; it is returned so the
/// caller can share it with other services.
pub fn register_audit_api_handler_from_endpoint(
    mux: &mut GatewayMux,
    endpoint: &str,
    connect_timeout: Duration,
) -> GatewayImplResult<Arc<TonicChannel>> {
    let channel = Arc::new(TonicChannel::connect_lazy(endpoint, connect_timeout)?);
    register_audit_api_handler(mux, channel.clone())?;
    info!(service = SERVICE_NAME, endpoint, "registered remote handlers");
    Ok(channel)
}
