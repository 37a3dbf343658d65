use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tether_gateway::context::CallContext;
use tether_gateway::services::assets::{AssetsApi, FetchRequest, FetchResponse};
use tether_gateway::services::audit::{
    AuditApi, Event, GetEventRequest, GetEventResponse, GetEventsRequest, GetEventsResponse,
};
use tether_kernel::gateway::Status;
use tokio::sync::RwLock;

/// Audit service backed by a vector of events. Ranges are ignored; `limit`
/// caps the result.
///
/// Every `GetEvents` call reports two `x-trace` header values and one
/// `x-served-by` trailer.
#[derive(Debug, Default)]
pub struct InMemoryAuditApi {
    events: RwLock<Vec<Event>>,
}

impl InMemoryAuditApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub async fn record(&self, event: Event) {
        self.events.write().await.push(event);
    }
}

#[async_trait]
impl AuditApi for InMemoryAuditApi {
    async fn get_events(
        &self,
        ctx: &CallContext,
        request: GetEventsRequest,
    ) -> Result<GetEventsResponse, Status> {
        if request.limit < 0 {
            return Err(Status::invalid_argument("limit must not be negative"));
        }
        ctx.set_header("x-trace", "audit");
        ctx.set_header("x-trace", "memory");
        ctx.set_trailer("x-served-by", "in-memory");

        let events = self.events.read().await;
        let events: Vec<Event> = match usize::try_from(request.limit) {
            Ok(0) | Err(_) => events.clone(),
            Ok(limit) => events.iter().take(limit).cloned().collect(),
        };
        Ok(GetEventsResponse {
            events,
            next_page_token: String::new(),
        })
    }

    async fn get_event(
        &self,
        _ctx: &CallContext,
        request: GetEventRequest,
    ) -> Result<GetEventResponse, Status> {
        let events = self.events.read().await;
        match events.iter().find(|e| e.id == request.event_id) {
            Some(event) => Ok(GetEventResponse {
                event: Some(event.clone()),
            }),
            None => Err(Status::not_found(format!(
                "event {} not found",
                request.event_id
            ))),
        }
    }
}

/// Assets service that counts fetches.
#[derive(Debug, Default)]
pub struct InMemoryAssetsApi {
    fetches: AtomicUsize,
}

impl InMemoryAssetsApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetsApi for InMemoryAssetsApi {
    async fn fetch(&self, _ctx: &CallContext, _request: FetchRequest) -> Result<FetchResponse, Status> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(FetchResponse {})
    }
}
