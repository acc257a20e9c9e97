pub mod auth;
pub mod posts;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::error::AppResult;
use crate::state::AppState;

/// The full HTTP surface, ready to serve.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(posts::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness plus a round trip to the database.
async fn health(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    Ok(Json(json!({ "status": "ok" })))
}
