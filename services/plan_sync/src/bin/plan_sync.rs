//! services/plan_sync/src/bin/plan_sync.rs
//!
//! Startup reconciliation: migrate legacy plans, push offline work, and report
//! what the signed-in user has available today.

use plan_sync_core::{PlanEngine, RemoteStore};
use plan_sync_lib::{
    adapters::{pg_remote, ConfigIdentity, FileLocalStore, OfflineRemoteStore, PgRemoteStore},
    config::Config,
    error::ServiceError,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting plan sync...");

    // --- 2. Open the Local Cache ---
    let local = Arc::new(FileLocalStore::open(&config.local_store_path).await?);
    info!("Local cache at {}", local.dir().display());

    // --- 3. Connect to the Remote Store & Run Migrations ---
    let remote = connect_remote(&config).await?;

    // --- 4. Build the Engine ---
    let identity = Arc::new(ConfigIdentity::from_config(&config));
    let engine = PlanEngine::new(local, remote, identity);
    match &config.user_id {
        Some(user) => info!("Running as user {}", user),
        None => warn!("PLAN_SYNC_USER_ID not set. Running signed out."),
    }

    // --- 5. Reconcile ---
    match engine.run_migration_if_needed().await {
        Ok(report) => info!(
            "Legacy migration: {} migrated, {} already present, {} failed, {} without owner",
            report.migrated, report.already_present, report.failed, report.skipped_without_owner
        ),
        Err(e) => warn!("Legacy migration skipped: {}", e),
    }

    match engine.sync_local_to_remote().await {
        Ok(report) => info!(
            "Sync: {} pushed, {} updated, {} deleted, {} discarded, {} duplicates skipped, {} failed",
            report.pushed,
            report.updated,
            report.deleted,
            report.discarded,
            report.skipped_duplicate_name,
            report.failed
        ),
        Err(e) => error!("Sync failed: {}", e),
    }

    // --- 6. Report ---
    let plans = engine.list_own().await?;
    info!("{} plans available", plans.len());
    for plan in engine.plans_for_today().await? {
        info!("Training today: {} ({})", plan.name, plan.id);
    }
    if config.user_id.is_some() {
        match engine.list_shared_with_me().await {
            Ok(shared) => info!("{} plans shared with you", shared.len()),
            Err(e) => warn!("Could not list shared plans: {}", e),
        }
    }

    Ok(())
}

/// Connects to PostgreSQL when configured. Connectivity failures degrade to
/// offline mode; any other database failure is fatal.
async fn connect_remote(config: &Config) -> Result<Arc<dyn RemoteStore>, ServiceError> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set. Running offline.");
        return Ok(Arc::new(OfflineRemoteStore));
    };

    info!("Connecting to database...");
    let store = match PgRemoteStore::connect(url, config.db_max_connections).await {
        Ok(store) => store,
        Err(e) if pg_remote::is_connectivity_error(&e) => {
            warn!("Database unreachable, running offline: {}", e);
            return Ok(Arc::new(OfflineRemoteStore));
        }
        Err(e) => return Err(e.into()),
    };

    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");
    Ok(Arc::new(store))
}
