use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tether_gateway::context::CallContext;
use tether_gateway::invoker::LocalInvoker;
use tether_gateway::router::{GatewayMux, RequestState};
use tether_gateway::server::GatewayServer;
use tether_gateway::services::assets::{self, FETCH_ROUTE};
use tether_gateway::services::audit::{
    self, Event, GET_EVENTS_METHOD, GET_EVENTS_ROUTE, GET_EVENT_ROUTE, GetEventsRequest,
    GetEventsResponse,
};
use tether_kernel::gateway::{
    CallMetadata, Code, ErrorEnvelope, GatewayConfig, GatewayError, GatewayRequest, Status,
};
use tether_testing::{InMemoryAssetsApi, InMemoryAuditApi, MockChannel, assert_calls};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

fn event(id: i64, username: &str) -> Event {
    Event {
        id,
        username: username.to_string(),
        service_name: "clutch.k8s.v1.K8sAPI".to_string(),
        method_name: "DescribePod".to_string(),
        ..Default::default()
    }
}

fn local_mux() -> GatewayMux {
    let mut mux = GatewayMux::from_config(&GatewayConfig::default());
    audit::register_audit_api_handler_server(
        &mut mux,
        Arc::new(InMemoryAuditApi::with_events(vec![
            event(1, "ada"),
            event(2, "grace"),
        ])),
    )
    .unwrap();
    mux
}

fn remote_mux(channel: Arc<MockChannel>) -> GatewayMux {
    let mut mux = GatewayMux::from_config(&GatewayConfig::default());
    audit::register_audit_api_handler(&mut mux, channel.clone()).unwrap();
    assets::register_assets_api_handler(&mut mux, channel).unwrap();
    mux
}

fn app(mux: GatewayMux) -> axum::Router {
    GatewayServer::new(GatewayConfig::default(), mux).build_app()
}

fn post(path: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(resp: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn envelope(resp: Response) -> ErrorEnvelope {
    serde_json::from_value(body_json(resp).await).unwrap()
}

fn header_lines(resp: &Response, name: &str) -> Vec<String> {
    resp.headers()
        .get_all(name)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing and decoding
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_path_returns_404_envelope() {
    let resp = app(local_mux())
        .oneshot(post("/v1/audit/unknown", "{}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let env = envelope(resp).await;
    assert_eq!(env.code, Code::NotFound.as_i32());
    assert!(!env.message.is_empty());
}

#[tokio::test]
async fn empty_body_decodes_to_zero_request() {
    let resp = app(local_mux())
        .oneshot(post(GET_EVENTS_ROUTE, ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_json_returns_400() {
    let resp = app(local_mux())
        .oneshot(post(GET_EVENTS_ROUTE, "{"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(envelope(resp).await.code, Code::InvalidArgument.as_i32());
}

#[tokio::test]
async fn application_errors_keep_their_code() {
    let resp = app(local_mux())
        .oneshot(post(GET_EVENT_ROUTE, r#"{"eventId":99}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let env = envelope(resp).await;
    assert_eq!(env.code, Code::NotFound.as_i32());
    assert_eq!(env.message, "event 99 not found");

    let resp = app(local_mux())
        .oneshot(post(GET_EVENTS_ROUTE, r#"{"limit":-1}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn duplicate_route_is_rejected() {
    let mut mux = local_mux();
    let err = audit::register_audit_api_handler_server(&mut mux, Arc::new(InMemoryAuditApi::new()))
        .unwrap_err();
    assert!(matches!(err, GatewayError::DuplicateRoute { .. }));
}

#[tokio::test]
async fn first_registered_template_wins() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let counting = |hits: Arc<AtomicUsize>| {
        Arc::new(LocalInvoker::new(
            move |_ctx: CallContext, _req: GetEventsRequest| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(GetEventsResponse::default())
                }
            },
        ))
    };

    let mut mux = GatewayMux::new();
    mux.bind_unary::<GetEventsRequest>("POST", "/a/{x}", "/test.A/First", counting(first.clone()))
        .unwrap();
    mux.bind_unary::<GetEventsRequest>("POST", "/a/{y}", "/test.A/Second", counting(second.clone()))
        .unwrap();

    let router = app(mux);
    for path in ["/a/one", "/a/two", "/a/three"] {
        let resp = router.clone().oneshot(post(path, "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    assert_eq!(first.load(Ordering::SeqCst), 3);
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Metadata
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn local_metadata_becomes_repeated_headers() {
    let resp = app(local_mux())
        .oneshot(post(GET_EVENTS_ROUTE, "{}"))
        .await
        .unwrap();
    assert_eq!(header_lines(&resp, "x-trace"), ["audit", "memory"]);
    // Local dispatch reports trailers alongside headers.
    assert_eq!(header_lines(&resp, "x-served-by"), ["in-memory"]);
    assert!(resp.headers().get("grpc-trailer-x-served-by").is_none());
}

#[tokio::test]
async fn remote_metadata_keeps_trailer_split() {
    let channel = Arc::new(MockChannel::new());
    let mut metadata = CallMetadata::new();
    metadata.header.append("x-trace", "upstream");
    metadata.header.append("x-trace", "edge");
    metadata.trailer.append("x-served-by", "audit-1");
    channel
        .reply(
            GET_EVENTS_METHOD,
            &GetEventsResponse {
                events: vec![event(7, "linus")],
                next_page_token: "p2".into(),
            },
            metadata,
        )
        .await;

    let resp = app(remote_mux(channel.clone()))
        .oneshot(post(GET_EVENTS_ROUTE, r#"{"limit":1}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header_lines(&resp, "x-trace"), ["upstream", "edge"]);
    assert_eq!(header_lines(&resp, "grpc-trailer-x-served-by"), ["audit-1"]);
    let body = body_json(resp).await;
    assert_eq!(body["events"][0]["username"], "linus");
    assert_eq!(body["nextPageToken"], "p2");
    assert_calls!(channel, 1);
}

#[tokio::test]
async fn request_headers_are_forwarded_as_metadata() {
    let channel = Arc::new(MockChannel::new());
    channel
        .reply(GET_EVENTS_METHOD, &GetEventsResponse::default(), CallMetadata::new())
        .await;

    let mut request = Request::builder()
        .method("POST")
        .uri(GET_EVENTS_ROUTE)
        .header("grpc-metadata-tenant", "acme")
        .header("authorization", "Bearer t")
        .header("host", "gateway.local")
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 40000))));

    let resp = app(remote_mux(channel.clone())).oneshot(request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let history = channel.history().await;
    let md = &history[0].metadata;
    assert_eq!(md.get("tenant"), Some("acme"));
    assert_eq!(md.get("authorization"), Some("Bearer t"));
    assert_eq!(md.get("x-forwarded-host"), Some("gateway.local"));
    assert_eq!(md.get("x-forwarded-for"), Some("10.1.2.3"));
    assert!(md.get("content-length").is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote failures, deadlines, cancellation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upstream_unavailable_is_503() {
    let channel = Arc::new(MockChannel::new());
    channel
        .fail(GET_EVENTS_METHOD, Status::unavailable("connection refused"))
        .await;
    let resp = app(remote_mux(channel))
        .oneshot(post(GET_EVENTS_ROUTE, "{}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(envelope(resp).await.code, Code::Unavailable.as_i32());
}

#[tokio::test]
async fn unscripted_remote_method_is_501() {
    let resp = app(remote_mux(Arc::new(MockChannel::new())))
        .oneshot(post(FETCH_ROUTE, "{}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test(start_paused = true)]
async fn grpc_timeout_bounds_remote_call() {
    let channel = Arc::new(MockChannel::new());
    channel.hang(GET_EVENTS_METHOD).await;

    let request = Request::builder()
        .method("POST")
        .uri(GET_EVENTS_ROUTE)
        .header("grpc-timeout", "50m")
        .body(Body::empty())
        .unwrap();
    let resp = app(remote_mux(channel.clone())).oneshot(request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(envelope(resp).await.code, Code::DeadlineExceeded.as_i32());

    let history = channel.history().await;
    let timeout = history[0].timeout.unwrap();
    assert!(timeout <= std::time::Duration::from_millis(50));
}

#[tokio::test]
async fn cancelled_caller_gets_no_response_and_upstream_sees_cancel() {
    let channel = Arc::new(MockChannel::new());
    channel.hang(GET_EVENTS_METHOD).await;
    let mux = remote_mux(channel.clone());
    let cancel = CancellationToken::new();

    let request = GatewayRequest::new("req-cancel", http::Method::POST, GET_EVENTS_ROUTE);
    let (outcome, ()) = tokio::join!(mux.handle(request, cancel.clone()), async {
        channel.entered().await;
        cancel.cancel();
    });

    assert_eq!(outcome.state, RequestState::Cancelled);
    assert!(outcome.response.is_none());
    assert!(channel.observed_cancel());
}

// ─────────────────────────────────────────────────────────────────────────────
// Assets
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn assets_fetch_served_locally() {
    let assets_api = Arc::new(InMemoryAssetsApi::new());
    let mut mux = GatewayMux::new();
    assets::register_assets_api_handler_server(&mut mux, assets_api.clone()).unwrap();

    let resp = app(mux).oneshot(post(FETCH_ROUTE, "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, serde_json::json!({}));
    assert_eq!(assets_api.fetch_count(), 1);
}

#[tokio::test]
async fn health_is_outside_route_table() {
    let resp = app(GatewayMux::new())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["status"], "ok");
}
