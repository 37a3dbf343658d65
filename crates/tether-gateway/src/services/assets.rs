//! `clutch.assets.v1.AssetsAPI` binding: `POST /v1/assets/fetch`.

use super::{call_unary, CallOptions, Reply};
use crate::context::CallContext;
use crate::error::GatewayImplResult;
use crate::invoker::{LocalInvoker, RemoteInvoker, RpcChannel, TonicChannel};
use crate::router::GatewayMux;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tether_kernel::gateway::{GatewayError, Status};
use tracing::info;

pub const SERVICE_NAME: &str = "clutch.assets.v1.AssetsAPI";
pub const FETCH_METHOD: &str = "/clutch.assets.v1.AssetsAPI/Fetch";
pub const FETCH_ROUTE: &str = "/v1/assets/fetch";

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchRequest {}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchResponse {}

#[async_trait]
pub trait AssetsApi: Send + Sync + 'static {
    async fn fetch(&self, _ctx: &CallContext, _request: FetchRequest) -> Result<FetchResponse, Status> {
        Err(Status::unimplemented("method Fetch not implemented"))
    }
}

#[derive(Debug, Default)]
pub struct UnimplementedAssetsApi;

impl AssetsApi for UnimplementedAssetsApi {}

#[derive(Clone)]
pub struct AssetsApiClient {
    channel: Arc<dyn RpcChannel>,
}

impl AssetsApiClient {
    pub fn new(channel: Arc<dyn RpcChannel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> Arc<dyn RpcChannel> {
        Arc::clone(&self.channel)
    }

    pub async fn fetch(
        &self,
        request: &FetchRequest,
        options: CallOptions,
    ) -> Result<Reply<FetchResponse>, Status> {
        call_unary(self.channel.as_ref(), FETCH_METHOD, request, options).await
    }
}

pub fn register_assets_api_handler_server(
    mux: &mut GatewayMux,
    server: Arc<dyn AssetsApi>,
) -> Result<(), GatewayError> {
    mux.bind_unary::<FetchRequest>(
        "POST",
        FETCH_ROUTE,
        FETCH_METHOD,
        Arc::new(LocalInvoker::new(move |ctx: CallContext, req: FetchRequest| {
            let svc = Arc::clone(&server);
            async move { svc.fetch(&ctx, req).await }
        })),
    )
}

pub fn register_assets_api_handler_client(
    mux: &mut GatewayMux,
    client: AssetsApiClient,
) -> Result<(), GatewayError> {
    register_assets_api_handler(mux, client.channel())
}

pub fn register_assets_api_handler(
    mux: &mut GatewayMux,
    channel: Arc<dyn RpcChannel>,
) -> Result<(), GatewayError> {
    mux.bind_unary::<FetchRequest>(
        "POST",
        FETCH_ROUTE,
        FETCH_METHOD,
        Arc::new(RemoteInvoker::<FetchResponse>::new(channel)),
    )
}

/// Dial `endpoint` and route the assets service through it.
pub fn register_assets_api_handler_from_endpoint(
    mux: &mut GatewayMux,
    endpoint: &str,
    connect_timeout: Duration,
) -> GatewayImplResult<Arc<TonicChannel>> {
    let channel = Arc::new(TonicChannel::connect_lazy(endpoint, connect_timeout)?);
    register_assets_api_handler(mux, channel.clone())?;
    info!(service = SERVICE_NAME, endpoint, "registered remote handlers");
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_kernel::gateway::GatewayRequest;
    use tokio_util::sync::CancellationToken;

    struct Ok200;

    #[async_trait]
    impl AssetsApi for Ok200 {
        async fn fetch(&self, _ctx: &CallContext, _request: FetchRequest) -> Result<FetchResponse, Status> {
            Ok(FetchResponse {})
        }
    }

    fn fetch() -> GatewayRequest {
        GatewayRequest::new("req", http::Method::POST, FETCH_ROUTE)
    }

    #[tokio::test]
    async fn fetch_returns_empty_object() {
        let mut mux = GatewayMux::new();
        register_assets_api_handler_server(&mut mux, Arc::new(Ok200)).unwrap();
        let resp = mux.handle(fetch(), CancellationToken::new()).await.response.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(&resp.body[..], b"{}");
    }

    #[tokio::test]
    async fn unimplemented_fetch_is_501() {
        let mut mux = GatewayMux::new();
        register_assets_api_handler_server(&mut mux, Arc::new(UnimplementedAssetsApi)).unwrap();
        let resp = mux.handle(fetch(), CancellationToken::new()).await.response.unwrap();
        assert_eq!(resp.status, 501);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["code"], 12);
        assert_eq!(body["message"], "method Fetch not implemented");
    }

    #[tokio::test]
    async fn lazy_endpoint_registers_route() {
        let mut mux = GatewayMux::new();
        let channel = register_assets_api_handler_from_endpoint(
            &mut mux,
            "http://127.0.0.1:9",
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(channel.endpoint(), "http://127.0.0.1:9");
        assert_eq!(mux.routes().count(), 1);
    }
}
