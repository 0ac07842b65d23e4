use std::sync::Arc;

use axum::{Form, Json, extract::State};

use crate::server::AppState;
use crate::server::response::ApiError;
use crate::types::{CommandReply, SlashCommand};

pub async fn handle_command(
    State(state): State<Arc<AppState>>,
    Form(command): Form<SlashCommand>,
) -> Result<Json<CommandReply>, ApiError> {
    let reply = state.bridge.commands.handle(&command).await?;
    Ok(Json(reply))
}
