//! Liveness plus the delivery and scheduler configuration this instance runs with.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "chit-api",
        "version": env!("CARGO_PKG_VERSION"),
        "delivery": {
            "sms": state.router.sms_enabled(),
            "pushBatchSize": state.router.push_batch_size(),
        },
        "scheduler": state.scheduler.state(),
    }))
}
