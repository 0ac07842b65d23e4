use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{FromRequest, Request, State},
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};

use crate::server::AppState;
use crate::server::response::ApiError;
use crate::types::{InboundSms, OutboundSmsRequest};

pub async fn receive_sms(
    State(state): State<Arc<AppState>>,
    Form(sms): Form<InboundSms>,
) -> Result<StatusCode, ApiError> {
    let posted = state.bridge.inbound.handle(&sms).await?;
    tracing::debug!(team = %posted.team, "SMS from {} posted to #{}", posted.user, posted.channel);
    Ok(StatusCode::OK)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Accepts either a form or a JSON body. Callers authenticate with the
/// configured send token as a bearer token.
pub async fn send_sms(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<StatusCode, ApiError> {
    state.bridge.outbound.authorize(bearer_token(request.headers()))?;

    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    let req: OutboundSmsRequest = if is_json {
        let Json(req) = Json::<OutboundSmsRequest>::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        req
    } else {
        let Form(req) = Form::<OutboundSmsRequest>::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        req
    };

    state
        .bridge
        .outbound
        .send(&req.team, &req.number, &req.message)
        .await?;
    Ok(StatusCode::ACCEPTED)
}
