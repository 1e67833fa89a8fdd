//! Shared application state for the Axum API server.

use std::sync::Arc;

use chit_engine::router::EventRouter;
use chit_engine::scheduler::ReminderScheduler;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<EventRouter>,
    pub scheduler: Arc<ReminderScheduler>,
}

impl AppState {
    pub fn new(router: Arc<EventRouter>, scheduler: Arc<ReminderScheduler>) -> Self {
        Self { router, scheduler }
    }
}
