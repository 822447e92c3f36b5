pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use crate::http::server::AppState;
use self::handlers::*;

pub fn setup_admin_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/breakers/{operation}/open", post(open_breaker))
        .route("/admin/breakers/{operation}/close", post(close_breaker))
}
