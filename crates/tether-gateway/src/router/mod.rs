//! Router module.

mod handler;
mod hook;
mod mux;

pub use handler::{RouteHandler, UnaryRoute};
pub use hook::ResponseHook;
pub use mux::{GatewayMux, HandleOutcome, RequestState};
