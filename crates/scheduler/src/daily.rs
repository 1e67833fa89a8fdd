//! Once-a-day trigger for the payment-reminder pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};

use chit_engine::scheduler::ReminderScheduler;

/// Fires once per day at a fixed UTC hour.
#[derive(Debug, Clone, Copy)]
pub struct DailyTrigger {
    at: NaiveTime,
}

impl DailyTrigger {
    pub fn new(run_hour_utc: u32) -> anyhow::Result<Self> {
        let at = NaiveTime::from_hms_opt(run_hour_utc, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("run hour must be 0-23, got {run_hour_utc}"))?;
        Ok(Self { at })
    }

    /// The first firing strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.at).and_utc();
        if today > now {
            today
        } else {
            today + TimeDelta::days(1)
        }
    }

    fn sleep_duration(&self, now: DateTime<Utc>) -> Duration {
        (self.next_run_after(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Run the reminder pass every day. Runs until the task is cancelled.
    pub async fn run(&self, scheduler: Arc<ReminderScheduler>) {
        loop {
            let now = Utc::now();
            let next = self.next_run_after(now);
            tracing::info!(next_run = %next, "Waiting for next reminder run");
            tokio::time::sleep(self.sleep_duration(now)).await;

            let today = Utc::now().date_naive();
            let summary = scheduler.run(today).await;
            if let Some(error) = &summary.error {
                tracing::error!(date = %today, error = %error, "Reminder run could not load groups");
            }
        }
    }
}
