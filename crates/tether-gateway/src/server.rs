//! Axum-based HTTP front door.
//!
//! [`GatewayServer`] puts a [`GatewayMux`] behind an axum listener. Every
//! path except the liveness probe falls through to the mux.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check, always `200 OK`. |
//! | `ANY`  | `*` | Resolved against the mux's route table. |

use crate::error::{GatewayImplError, GatewayImplResult};
use crate::router::GatewayMux;
use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tether_kernel::gateway::{
    GatewayConfig, GatewayRequest, GatewayResponse, JsonMarshaler, Status, translate,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Status written when the caller disconnected before a response existed.
/// Not a registered HTTP status; it never reaches a live client.
const CLIENT_CLOSED_REQUEST: u16 = 499;

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every axum handler via [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    mux: Arc<GatewayMux>,
    max_body_bytes: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServer
// ─────────────────────────────────────────────────────────────────────────────

/// A configured mux plus the listener settings to serve it.
pub struct GatewayServer {
    config: GatewayConfig,
    mux: Arc<GatewayMux>,
}

impl GatewayServer {
    /// The mux must be fully registered; it is frozen from here on.
    pub fn new(config: GatewayConfig, mux: GatewayMux) -> Self {
        Self {
            config,
            mux: Arc::new(mux),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the axum [`Router`]. Call [`start()`](Self::start) to bind and
    /// serve.
    pub fn build_app(&self) -> Router {
        let state = AppState {
            mux: Arc::clone(&self.mux),
            max_body_bytes: self.config.max_body_bytes,
        };

        Router::new()
            .route("/health", get(health_handler))
            .fallback(gateway_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured listen address and serve until Ctrl-C.
    pub async fn start(self) -> GatewayImplResult<()> {
        self.config.validate()?;
        let app = self.build_app();
        let addr = self.config.listen_addr.clone();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| GatewayImplError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(
            addr    = %addr,
            gateway = %self.config.id,
            routes  = self.mux.routes().count(),
            "Tether gateway listening"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(GatewayImplError::Serve)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, draining connections");
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health`: liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "tether-gateway" }))
}

/// Every other request: hand it to the mux.
async fn gateway_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let request_id = Uuid::new_v4().to_string();

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            debug!(request_id = %request_id, error = %e, "failed to read request body");
            let status = Status::invalid_argument(format!("failed to read request body: {e}"));
            return error_response(&status);
        }
    };

    let mut req = GatewayRequest::new(&request_id, parts.method, parts.uri.path());
    req.headers = parts.headers;
    req.body = body;
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        req = req.with_remote_addr(addr.ip().to_string());
    }

    // Fires when this future is dropped (client gone) or the handler returns.
    let cancel = CancellationToken::new();
    let _done = cancel.clone().drop_guard();
    let outcome = state.mux.handle(req, cancel).await;

    match outcome.response {
        Some(resp) => build_axum_response(resp),
        None => build_axum_response(GatewayResponse::new(CLIENT_CLOSED_REQUEST)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn error_response(status: &Status) -> Response {
    let (code, body) = translate(status, &JsonMarshaler::new());
    let mut resp = GatewayResponse::new(code).with_body(body);
    resp.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    build_axum_response(resp)
}

fn build_axum_response(resp: GatewayResponse) -> Response {
    let mut response = Response::new(Body::from(resp.body));
    *response.status_mut() =
        StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    *response.headers_mut() = resp.headers;
    response
}
