use std::sync::Arc;

use axum::{Json, extract::State};

use crate::server::AppState;
use crate::server::response::ApiError;
use crate::types::{ChatCredentials, InstallRequest, InstallResponse};

/// Takes the tokens of a finished OAuth exchange.
pub async fn complete_install(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InstallRequest>,
) -> Result<Json<InstallResponse>, ApiError> {
    let credentials = ChatCredentials {
        user_access_token: req.access_token,
        bot_access_token: req.bot_access_token,
        bot_user_id: req.bot_user_id,
    };

    let tenant = state
        .bridge
        .install
        .complete_install(&req.team_id, credentials, req.user_id.as_deref())
        .await?;

    Ok(Json(InstallResponse {
        id: tenant.id,
        team: tenant.team,
    }))
}
