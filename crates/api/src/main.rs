//! ChitNotify API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use chit_common::config::AppConfig;
use chit_common::db::{create_pool, run_migrations};
use chit_engine::ledger::RedisReminderLedger;
use chit_engine::router::EventRouter;
use chit_engine::scheduler::ReminderScheduler;
use chit_engine::store::{MembershipStore, PgMembershipStore};

use chit_api::routes::create_router;
use chit_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("chit_api=debug,chit_engine=debug,chit_notifier=info,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting ChitNotify API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Membership store
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;
    let store: Arc<dyn MembershipStore> = Arc::new(PgMembershipStore::new(pool));

    // Dispatcher and the manually-triggered reminder pass
    let router = Arc::new(EventRouter::from_config(&config, store.clone())?);
    let ledger =
        RedisReminderLedger::connect(&config.redis_url, config.reminder_dedup_ttl_secs).await?;
    let scheduler = Arc::new(ReminderScheduler::new(store, router.clone(), Arc::new(ledger)));

    // Build application state
    let state = AppState::new(router, scheduler);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
