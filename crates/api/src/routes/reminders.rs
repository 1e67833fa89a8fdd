//! Manual trigger for the daily reminder pass (cron hook).

use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use chit_engine::scheduler::ReminderRunSummary;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/reminders/run", post(run_reminders))
}

#[derive(Debug, Deserialize)]
pub struct RunParams {
    /// Run as if today were this date (defaults to the current UTC date)
    pub date: Option<NaiveDate>,
}

/// POST /api/reminders/run: Run the reminder pass once and report what it did.
async fn run_reminders(
    State(state): State<AppState>,
    Query(params): Query<RunParams>,
) -> Json<ReminderRunSummary> {
    let today = params.date.unwrap_or_else(|| Utc::now().date_naive());
    tracing::info!(date = %today, "Reminder run requested");
    Json(state.scheduler.run(today).await)
}
