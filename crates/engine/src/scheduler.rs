//! Daily payment-reminder scheduler.
//!
//! Each run: compute today's three reminder windows (draw in 1, 2 or 3 days),
//! load the groups drawing on those dates, and dispatch a `payment_reminder`
//! per group with its exact day offset. Groups are processed one at a time;
//! a failing group is logged and skipped. A run never fails as a whole.

use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use serde_json::json;

use chit_common::types::{EventKind, Group};

use crate::ledger::{ReminderKey, ReminderLedger};
use crate::router::EventRouter;
use crate::store::MembershipStore;

/// Offsets, in days before the draw, at which members are reminded.
pub const REMINDER_OFFSETS: [u8; 3] = [1, 2, 3];

/// "N days before a group's draw", pinned to a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReminderWindow {
    pub offset: u8,
    pub date: NaiveDate,
}

impl ReminderWindow {
    /// The window for `offset` days after `today`, if the offset is one we remind at.
    pub fn new(today: NaiveDate, offset: i64) -> Option<Self> {
        let offset = u8::try_from(offset).ok()?;
        if !REMINDER_OFFSETS.contains(&offset) {
            return None;
        }
        Some(Self {
            offset,
            date: today + Duration::days(i64::from(offset)),
        })
    }

    /// All reminder windows for `today`, nearest first.
    pub fn for_day(today: NaiveDate) -> Vec<Self> {
        REMINDER_OFFSETS
            .iter()
            .filter_map(|offset| Self::new(today, i64::from(*offset)))
            .collect()
    }

    /// The window a draw date falls into, if any.
    pub fn containing(today: NaiveDate, draw_date: NaiveDate) -> Option<Self> {
        Self::new(today, (draw_date - today).num_days())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    ComputingWindows,
    PerGroupDispatch,
}

/// What one scheduler run did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRunSummary {
    pub date: Option<NaiveDate>,
    pub windows: Vec<ReminderWindow>,
    pub groups: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Set when the group query itself failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ReminderScheduler {
    store: Arc<dyn MembershipStore>,
    router: Arc<EventRouter>,
    ledger: Arc<dyn ReminderLedger>,
    state: Mutex<SchedulerState>,
}

/// Puts the scheduler back to `Idle` however a run ends.
struct IdleOnDrop<'a>(&'a ReminderScheduler);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_state(SchedulerState::Idle);
    }
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn MembershipStore>,
        router: Arc<EventRouter>,
        ledger: Arc<dyn ReminderLedger>,
    ) -> Self {
        Self {
            store,
            router,
            ledger,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// Run the reminder pass for `today`.
    pub async fn run(&self, today: NaiveDate) -> ReminderRunSummary {
        let _idle = IdleOnDrop(self);
        self.set_state(SchedulerState::ComputingWindows);

        let windows = ReminderWindow::for_day(today);
        let dates: Vec<NaiveDate> = windows.iter().map(|w| w.date).collect();
        let mut summary = ReminderRunSummary {
            date: Some(today),
            windows: windows.clone(),
            ..Default::default()
        };

        let groups = match self.store.groups_drawing_on(&dates).await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::error!(date = %today, error = %e, "Failed to load groups for reminders");
                summary.error = Some(e.to_string());
                return summary;
            }
        };
        summary.groups = groups.len();

        tracing::info!(
            date = %today,
            groups = groups.len(),
            "Reminder windows computed"
        );

        self.set_state(SchedulerState::PerGroupDispatch);
        for group in &groups {
            let Some(window) = group
                .draw_date
                .and_then(|draw| ReminderWindow::containing(today, draw))
            else {
                continue;
            };
            self.remind_group(group, window, &mut summary).await;
        }

        tracing::info!(
            date = %today,
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            failed = summary.failed,
            "Reminder run finished"
        );
        summary
    }

    async fn remind_group(
        &self,
        group: &Group,
        window: ReminderWindow,
        summary: &mut ReminderRunSummary,
    ) {
        let key = ReminderKey {
            group_id: group.id,
            offset: window.offset,
            date: window.date,
        };

        match self.ledger.claim(&key).await {
            Ok(true) => {}
            Ok(false) => {
                summary.skipped += 1;
                return;
            }
            // A possible duplicate beats a silently missed reminder.
            Err(e) => tracing::warn!(
                group_id = %group.id,
                error = %e,
                "Reminder ledger unavailable, sending without dedup"
            ),
        }

        let data = json!({
            "groupId": group.id,
            "groupName": group.name,
            "amount": group.monthly_amount,
            "drawDate": window.date.to_string(),
            "daysUntilDue": window.offset,
        });

        match self.router.dispatch_event(EventKind::PaymentReminder, data).await {
            Ok(result) => {
                summary.dispatched += 1;
                tracing::info!(
                    group_id = %group.id,
                    offset = window.offset,
                    ok = result.counts.ok,
                    failed = result.counts.error,
                    "Payment reminder dispatched"
                );
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(
                    group_id = %group.id,
                    offset = window.offset,
                    error = %e,
                    "Payment reminder failed, continuing with next group"
                );
                if let Err(e) = self.ledger.release(&key).await {
                    tracing::warn!(group_id = %group.id, error = %e, "Failed to release reminder claim");
                }
            }
        }
    }
}
