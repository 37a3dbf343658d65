//! Gateway mux: the route table and the per-request lifecycle.
//!
//! Routes are kept in registration order and resolved by a linear scan;
//! the first template that matches wins, including when a later template
//! would match the same path. Route tables are small and this keeps
//! resolution trivially correct to verify.
//!
//! ```text
//! Received ──► Matched ──► Decoded ──► Dispatched ──┬─► Succeeded ──► Forwarded
//!    │            │                                 └─► Failed ─────► ErrorTranslated
//!    ▼            ▼
//! Unmatched   DecodeFailed            (any state) ──► Cancelled: nothing written
//! ```

use super::handler::{RouteHandler, UnaryRoute};
use super::hook::ResponseHook;
use crate::context::{parse_grpc_timeout, CallContext, MethodInfo, GRPC_TIMEOUT_HEADER};
use crate::dispatch::{Dispatched, Dispatcher};
use crate::interceptor::Interceptor;
use crate::invoker::Invoker;
use crate::message::{AnyMessage, Message};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tether_kernel::gateway::{
    translate, CallMetadata, GatewayConfig, GatewayError, GatewayRequest, GatewayResponse,
    HeaderBridge, JsonMarshaler, Marshaler, MarshalerRegistry, PathParams, RouteTemplate, Status,
    MIME_WILDCARD,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// States a request passes through inside [`GatewayMux::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Received,
    Matched,
    Decoded,
    Dispatched,
    Succeeded,
    Failed,
    /// Terminal: the response message was written.
    Forwarded,
    /// Terminal: an error envelope was written.
    ErrorTranslated,
    /// Terminal: no route matched, 404 written.
    Unmatched,
    /// Terminal: the body could not be decoded, 400 written.
    DecodeFailed,
    /// Terminal: the caller went away; nothing was written.
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Forwarded
                | RequestState::ErrorTranslated
                | RequestState::Unmatched
                | RequestState::DecodeFailed
                | RequestState::Cancelled
        )
    }
}

/// What [`GatewayMux::handle`] produced for one request.
///
/// `response` is `None` only in the `Cancelled` state.
#[derive(Debug)]
pub struct HandleOutcome {
    pub state: RequestState,
    pub response: Option<GatewayResponse>,
}

/// Early exits of the lifecycle, each mapped to exactly one terminal state.
enum Exit {
    Unmatched,
    DecodeFailed(Status),
    Failed {
        status: Status,
        metadata: CallMetadata,
    },
    Cancelled,
}

struct Succeeded {
    message: AnyMessage,
    metadata: CallMetadata,
    headers: HeaderMap,
}

struct Route {
    template: RouteTemplate,
    handler: Arc<dyn RouteHandler>,
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayMux
// ─────────────────────────────────────────────────────────────────────────────

/// Route table plus everything needed to serve a matched request.
///
/// Registration takes `&mut self` and must finish before serving starts;
/// [`handle`](Self::handle) takes `&self` and is safe to call from many
/// tasks at once.
pub struct GatewayMux {
    routes: Vec<Route>,
    dispatcher: Dispatcher,
    hooks: Vec<Arc<dyn ResponseHook>>,
    marshalers: MarshalerRegistry,
    bridge: HeaderBridge,
    default_timeout: Option<Duration>,
}

impl Default for GatewayMux {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            dispatcher: Dispatcher::new(),
            hooks: Vec::new(),
            marshalers: MarshalerRegistry::new(),
            bridge: HeaderBridge::new(),
            default_timeout: None,
        }
    }
}

impl GatewayMux {
    /// Create an empty mux with the JSON marshaler and default header rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mux configured from a validated [`GatewayConfig`].
    pub fn from_config(config: &GatewayConfig) -> Self {
        let json: Arc<dyn Marshaler> = if config.pretty_json {
            Arc::new(JsonMarshaler::pretty())
        } else {
            Arc::new(JsonMarshaler::new())
        };
        Self::new()
            .with_marshalers(
                MarshalerRegistry::new()
                    .with(MIME_WILDCARD, Arc::clone(&json))
                    .with("application/json", json),
            )
            .with_header_bridge(HeaderBridge::new().with_reserved(config.reserved_headers.iter()))
            .with_default_timeout(config.request_timeout())
    }

    pub fn with_marshalers(mut self, marshalers: MarshalerRegistry) -> Self {
        self.marshalers = marshalers;
        self
    }

    pub fn with_header_bridge(mut self, bridge: HeaderBridge) -> Self {
        self.bridge = bridge;
        self
    }

    /// Deadline applied when the request carries no `Grpc-Timeout`.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.dispatcher.add_interceptor(interceptor);
    }

    pub fn add_response_hook(&mut self, hook: Arc<dyn ResponseHook>) {
        self.hooks.push(hook);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a route. Fails on a malformed template, or when the same verb and
    /// byte-identical template are already registered. Templates that differ
    /// only in parameter names are accepted; the earlier one wins.
    pub fn register(
        &mut self,
        verb: &str,
        template: &str,
        handler: Arc<dyn RouteHandler>,
    ) -> Result<(), GatewayError> {
        let template = self.compile_unique(verb, template)?;
        self.push_route(template, handler);
        Ok(())
    }

    fn compile_unique(&self, verb: &str, template: &str) -> Result<RouteTemplate, GatewayError> {
        let template = RouteTemplate::compile(template, verb)?;
        let duplicate = self.routes.iter().any(|r| {
            r.template.verb() == template.verb() && r.template.source() == template.source()
        });
        if duplicate {
            return Err(GatewayError::DuplicateRoute {
                verb: template.verb().to_string(),
                template: template.source().to_string(),
            });
        }
        Ok(template)
    }

    fn push_route(&mut self, template: RouteTemplate, handler: Arc<dyn RouteHandler>) {
        debug!(route = %template, method = %handler.method().full_method(), "route registered");
        self.routes.push(Route { template, handler });
    }

    /// Bind a method to its invoker without adding a route.
    pub fn register_method(
        &mut self,
        info: Arc<MethodInfo>,
        invoker: Arc<dyn Invoker>,
    ) -> Result<(), GatewayError> {
        self.dispatcher.register(info, invoker)
    }

    /// Route `verb template` to the unary method `full_method` taking `Req`,
    /// invoked through `invoker`.
    ///
    /// Both the route and the method are checked before either is added, so
    /// a failure leaves the mux unchanged.
    pub fn bind_unary<Req: Message>(
        &mut self,
        verb: &str,
        template: &str,
        full_method: &str,
        invoker: Arc<dyn Invoker>,
    ) -> Result<(), GatewayError> {
        let compiled = self.compile_unique(verb, template)?;
        if self.dispatcher.registry().lookup(full_method).is_some() {
            return Err(GatewayError::DuplicateMethod(full_method.to_string()));
        }
        let info = Arc::new(MethodInfo::new(
            full_method,
            format!("{} {template}", compiled.verb()),
        ));
        self.register_method(Arc::clone(&info), invoker)?;
        self.push_route(compiled, Arc::new(UnaryRoute::<Req>::new(info)));
        Ok(())
    }

    /// Add another route to a method already bound with
    /// [`bind_unary`](Self::bind_unary), keeping its invoker.
    pub fn bind_additional<Req: Message>(
        &mut self,
        verb: &str,
        template: &str,
        full_method: &str,
    ) -> Result<(), GatewayError> {
        let compiled = self.compile_unique(verb, template)?;
        if self.dispatcher.registry().lookup(full_method).is_none() {
            return Err(GatewayError::UnknownMethod(full_method.to_string()));
        }
        let info = Arc::new(MethodInfo::new(
            full_method,
            format!("{} {template}", compiled.verb()),
        ));
        self.push_route(compiled, Arc::new(UnaryRoute::<Req>::new(info)));
        Ok(())
    }

    /// Registered templates in resolution order.
    pub fn routes(&self) -> impl Iterator<Item = &RouteTemplate> {
        self.routes.iter().map(|r| &r.template)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Serving
    // ─────────────────────────────────────────────────────────────────────────

    /// Serve one request.
    ///
    /// Exactly one response is produced, except when `cancel` fires first:
    /// then the in-flight call is cancelled and nothing is written.
    #[instrument(skip_all, fields(request_id = %request.id, method = %request.method, path = %request.path))]
    pub async fn handle(&self, request: GatewayRequest, cancel: CancellationToken) -> HandleOutcome {
        trace!(state = ?RequestState::Received);
        let (inbound, outbound) = self.marshalers.for_request(&request.headers);
        let result = self.process(&request, inbound.as_ref(), &cancel).await;

        if cancel.is_cancelled() {
            debug!(state = ?RequestState::Cancelled, "caller went away, dropping response");
            return HandleOutcome {
                state: RequestState::Cancelled,
                response: None,
            };
        }

        match result {
            Ok(succeeded) => self.forward(succeeded, outbound.as_ref()),
            Err(Exit::Unmatched) => {
                debug!(state = ?RequestState::Unmatched);
                let status = Status::not_found("Not Found");
                self.write_error(RequestState::Unmatched, &status, CallMetadata::new(), outbound.as_ref())
            }
            Err(Exit::DecodeFailed(status)) => {
                debug!(state = ?RequestState::DecodeFailed, error = %status);
                self.write_error(RequestState::DecodeFailed, &status, CallMetadata::new(), outbound.as_ref())
            }
            Err(Exit::Failed { status, metadata }) => {
                self.write_error(RequestState::ErrorTranslated, &status, metadata, outbound.as_ref())
            }
            Err(Exit::Cancelled) => HandleOutcome {
                state: RequestState::Cancelled,
                response: None,
            },
        }
    }

    async fn process(
        &self,
        request: &GatewayRequest,
        inbound: &dyn Marshaler,
        cancel: &CancellationToken,
    ) -> Result<Succeeded, Exit> {
        let (route, params) = self.resolve(request).ok_or(Exit::Unmatched)?;
        trace!(state = ?RequestState::Matched, route = %route.template);

        let ctx = self.call_context(request, route, params, cancel)?;
        let message = route
            .handler
            .decode(inbound, &request.body, ctx.path_params())
            .map_err(|e| Exit::DecodeFailed(Status::invalid_argument(e.to_string())))?;
        trace!(state = ?RequestState::Decoded, message = message.type_name());

        let Dispatched { response, metadata } = self.dispatch_bounded(&ctx, message, cancel).await?;
        trace!(state = ?RequestState::Dispatched);

        let message = match response {
            Ok(message) => message,
            Err(status) => {
                trace!(state = ?RequestState::Failed, code = %status.code());
                return Err(Exit::Failed { status, metadata });
            }
        };

        let mut headers = HeaderMap::new();
        for hook in &self.hooks {
            if let Err(status) = hook.on_response(&ctx, &message, &mut headers) {
                debug!(hook = hook.name(), error = %status, "response hook failed");
                return Err(Exit::Failed { status, metadata });
            }
        }
        trace!(state = ?RequestState::Succeeded);
        Ok(Succeeded {
            message,
            metadata,
            headers,
        })
    }

    fn resolve(&self, request: &GatewayRequest) -> Option<(&Route, PathParams)> {
        let verb = request.method.as_str();
        self.routes.iter().find_map(|route| {
            route
                .template
                .matches(verb, &request.path)
                .map(|params| (route, params))
        })
    }

    fn call_context(
        &self,
        request: &GatewayRequest,
        route: &Route,
        params: PathParams,
        cancel: &CancellationToken,
    ) -> Result<CallContext, Exit> {
        let timeout = match request.headers.get(GRPC_TIMEOUT_HEADER) {
            Some(raw) => {
                let parsed = raw.to_str().ok().and_then(parse_grpc_timeout);
                let Some(timeout) = parsed else {
                    return Err(Exit::Failed {
                        status: Status::invalid_argument(format!(
                            "invalid {GRPC_TIMEOUT_HEADER} header: {raw:?}"
                        )),
                        metadata: CallMetadata::new(),
                    });
                };
                Some(timeout)
            }
            None => self.default_timeout,
        };

        let incoming = self
            .bridge
            .incoming(&request.headers, request.remote_addr.as_deref());
        Ok(CallContext::new(
            request.id.clone(),
            Arc::clone(route.handler.method()),
            incoming,
            cancel.child_token(),
        )
        .with_path_params(params)
        .with_deadline(timeout.map(|t| Instant::now() + t)))
    }

    /// Dispatch, bounded by the caller's cancellation and the call deadline.
    ///
    /// The dispatch branch is polled first so a call that observes its own
    /// cancellation gets to finish before the future is dropped.
    async fn dispatch_bounded(
        &self,
        ctx: &CallContext,
        message: AnyMessage,
        cancel: &CancellationToken,
    ) -> Result<Dispatched, Exit> {
        let deadline = ctx.deadline();
        let expiry = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            dispatched = self.dispatcher.dispatch(ctx, message) => Ok(dispatched),
            _ = cancel.cancelled() => {
                ctx.cancellation().cancel();
                Err(Exit::Cancelled)
            }
            _ = expiry => {
                ctx.cancellation().cancel();
                Err(Exit::Failed {
                    status: Status::deadline_exceeded("context deadline exceeded"),
                    metadata: self.dispatcher.outgoing_for(ctx),
                })
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Response writing
    // ─────────────────────────────────────────────────────────────────────────

    fn forward(&self, succeeded: Succeeded, outbound: &dyn Marshaler) -> HandleOutcome {
        let Succeeded {
            message,
            metadata,
            headers,
        } = succeeded;

        let body = message
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|value| outbound.encode(&value).map_err(|e| e.to_string()));
        let body = match body {
            Ok(body) => body,
            Err(error) => {
                let status = Status::internal(format!("failed to marshal response: {error}"));
                return self.write_error(RequestState::ErrorTranslated, &status, metadata, outbound);
            }
        };

        let mut response = GatewayResponse::new(200).with_body(body);
        response.headers = headers;
        metadata.write_http_headers(&mut response.headers);
        set_content_type(&mut response.headers, outbound);
        debug!(state = ?RequestState::Forwarded, status = 200);
        HandleOutcome {
            state: RequestState::Forwarded,
            response: Some(response),
        }
    }

    fn write_error(
        &self,
        state: RequestState,
        status: &Status,
        metadata: CallMetadata,
        outbound: &dyn Marshaler,
    ) -> HandleOutcome {
        let (http_status, body) = translate(status, outbound);
        let mut response = GatewayResponse::new(http_status).with_body(body);
        metadata.write_http_headers(&mut response.headers);
        set_content_type(&mut response.headers, outbound);
        debug!(?state, status = http_status, code = %status.code());
        HandleOutcome {
            state,
            response: Some(response),
        }
    }
}

fn set_content_type(headers: &mut HeaderMap, marshaler: &dyn Marshaler) {
    if let Ok(value) = HeaderValue::from_str(marshaler.content_type()) {
        headers.insert(CONTENT_TYPE, value);
    }
}
