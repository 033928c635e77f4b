use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{db::executor::ping, error::AppError, state::AppState};

pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    ping(&state.executor).await?;
    Ok(Json(json!({ "status": "ok" })))
}
