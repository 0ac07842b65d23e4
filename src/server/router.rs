use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{get, post},
};

use super::{commands, events, install, sms};
use crate::bridge::{Bridge, BridgeSettings};
use crate::carrier::CarrierGateway;
use crate::chat::ChatConnector;
use crate::store::TenantStore;

pub struct AppState {
    pub bridge: Bridge,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn TenantStore>,
        chat: Arc<dyn ChatConnector>,
        carrier: Arc<dyn CarrierGateway>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            bridge: Bridge::new(store, chat, carrier, settings),
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slack/events", post(events::handle_event))
        .route("/slack/commands", post(commands::handle_command))
        .route("/sms/inbound", post(sms::receive_sms))
        .route("/sms/send", post(sms::send_sms))
        .route("/install", post(install::complete_install))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
