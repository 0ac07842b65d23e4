use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::{IntoResponse, Response}};
use serde_json::json;

use crate::bridge::EventOutcome;
use crate::server::AppState;
use crate::server::response::ApiError;
use crate::types::ChatEventPayload;

pub async fn handle_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatEventPayload>,
) -> Result<Response, ApiError> {
    let response = match state.bridge.events.handle(&payload).await? {
        EventOutcome::Challenge(challenge) => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        EventOutcome::Delivered(report) => {
            if !report.failures.is_empty() {
                tracing::warn!(
                    "Delivered to {} of {} recipients",
                    report.sent,
                    report.attempted
                );
            }
            StatusCode::ACCEPTED.into_response()
        }
        EventOutcome::Skipped(_) | EventOutcome::Duplicate => StatusCode::ACCEPTED.into_response(),
    };
    Ok(response)
}
