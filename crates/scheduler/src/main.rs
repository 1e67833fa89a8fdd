use std::sync::Arc;

use chrono::Utc;

use chit_common::config::AppConfig;
use chit_common::db;
use chit_engine::ledger::RedisReminderLedger;
use chit_engine::router::EventRouter;
use chit_engine::scheduler::ReminderScheduler;
use chit_engine::store::{MembershipStore, PgMembershipStore};
use chit_scheduler::daily::DailyTrigger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chit_scheduler=info,chit_engine=info,chit_notifier=info".into()),
        )
        .json()
        .init();

    tracing::info!("ChitNotify reminder scheduler starting...");

    // Load configuration
    let config = AppConfig::from_env()?;
    let trigger = DailyTrigger::new(config.reminder_run_hour_utc)?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;
    let store: Arc<dyn MembershipStore> = Arc::new(PgMembershipStore::new(pool));

    let router = Arc::new(EventRouter::from_config(&config, store.clone())?);
    let ledger =
        RedisReminderLedger::connect(&config.redis_url, config.reminder_dedup_ttl_secs).await?;
    let scheduler = Arc::new(ReminderScheduler::new(store, router, Arc::new(ledger)));

    // `--once`: run today's pass and exit (for external cron)
    if std::env::args().any(|arg| arg == "--once") {
        let summary = scheduler.run(Utc::now().date_naive()).await;
        tracing::info!(
            groups = summary.groups,
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            failed = summary.failed,
            "Single reminder run complete"
        );
        return Ok(());
    }

    tracing::info!(
        run_hour_utc = config.reminder_run_hour_utc,
        "Starting daily reminder loop"
    );

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        _ = trigger.run(scheduler) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("ChitNotify reminder scheduler stopped.");
    Ok(())
}
