use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::resilience::{BreakerSnapshot, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub open_breakers: usize,
    pub rooms: usize,
    pub subscribers: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let open_breakers = state
        .guard
        .snapshots()
        .iter()
        .filter(|s| s.state != CircuitState::Closed)
        .count();

    Json(SystemStatus {
        status: "Gateway is up and running!",
        version: env!("CARGO_PKG_VERSION"),
        open_breakers,
        rooms: state.rooms.room_count(),
        subscribers: state.rooms.subscriber_count(),
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.guard.snapshots())
}

pub async fn open_breaker(
    State(state): State<AppState>,
    Path(operation): Path<String>,
) -> Result<Json<BreakerSnapshot>, ApiError> {
    let breaker = state
        .guard
        .registry()
        .find(&operation)
        .ok_or_else(|| ApiError::not_found(format!("no breaker for operation '{operation}'")))?;
    breaker.force_open();
    Ok(Json(breaker.snapshot()))
}

pub async fn close_breaker(
    State(state): State<AppState>,
    Path(operation): Path<String>,
) -> Result<Json<BreakerSnapshot>, ApiError> {
    let breaker = state
        .guard
        .registry()
        .find(&operation)
        .ok_or_else(|| ApiError::not_found(format!("no breaker for operation '{operation}'")))?;
    breaker.force_closed();
    Ok(Json(breaker.snapshot()))
}
