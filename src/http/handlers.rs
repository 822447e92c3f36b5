use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::http::websocket::Envelope;
use crate::services::{create_user_with_game, NewUser, UserWithGame, WorkflowError};

#[derive(Debug, Deserialize)]
pub struct CreateWithGameRequest {
    pub user: Option<NewUser>,
}

/// Runs the saga as its own task. Dropping the request (client gone, outer
/// timeout) only drops the join handle; the saga and any rollback still
/// run to completion, and so does the lobby announcement.
pub async fn create_with_game(
    State(state): State<AppState>,
    Json(request): Json<CreateWithGameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new_user = request.user.ok_or_else(|| ApiError::bad_request("Invalid request data"))?;

    let created = tokio::spawn(async move {
        let created = create_user_with_game(&state.guard, state.users.clone(), state.games.clone(), new_user).await?;
        announce_user(&state, &created);
        Ok::<_, WorkflowError>(created)
    })
    .await??;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User and game session created successfully",
            "user_id": created.user.id,
            "game_id": created.game.id,
            "user": created.user,
            "game": created.game,
        })),
    ))
}

fn announce_user(state: &AppState, created: &UserWithGame) {
    let lobby = &state.config.realtime.lobby_room;
    let announcement = Envelope::new(
        "user_created",
        json!({ "user_id": created.user.id, "game_id": created.game.id }),
    )
    .in_room(lobby);
    state.rooms.broadcast(lobby, announcement.to_frame(), None);
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

pub async fn publish_room_message(
    State(state): State<AppState>,
    Path(room): Path<String>,
    Json(request): Json<PublishRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.kind.trim().is_empty() {
        return Err(ApiError::bad_request("message type must not be empty"));
    }

    let frame = Envelope::new(request.kind, request.data).in_room(&room).to_frame();
    let recipients = state.rooms.broadcast(&room, frame, None);
    tracing::debug!(room = %room, recipients, "Published room message");

    Ok((StatusCode::ACCEPTED, Json(json!({ "room": room, "recipients": recipients }))))
}
