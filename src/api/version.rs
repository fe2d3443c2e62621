use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::api::AppState;

/// Reports the configured service version
async fn get_version(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "version": state.config.version }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/version", get(get_version))
}
