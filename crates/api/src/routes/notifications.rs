//! Notification dispatch route.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use chit_common::error::AppError;
use chit_engine::aggregator::AggregatedResult;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notifications", post(dispatch_notification))
}

/// Inbound event: `{ "type": "<kind>", "data": { ... } }`.
#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// POST /api/notifications: Fan one event out to its audience.
async fn dispatch_notification(
    State(state): State<AppState>,
    Json(request): Json<NotificationRequest>,
) -> Result<Json<AggregatedResult>, AppError> {
    let result = state
        .router
        .dispatch(&request.kind, request.data)
        .await
        .inspect_err(|e| {
            if e.is_client_error() {
                tracing::debug!(kind = %request.kind, error = %e, "Rejected notification request");
            } else {
                tracing::error!(kind = %request.kind, error = %e, "Notification dispatch failed");
            }
        })?;
    Ok(Json(result))
}
