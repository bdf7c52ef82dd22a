//! ProdMap Background Worker
//!
//! Handles scheduled jobs including:
//! - Nightly usage sweep over every tenant (2:00 AM UTC)
//! - Billing-cycle renewal reminders (daily at 9:00 AM UTC; the 7/3/1-day
//!   offsets are exact-match, so this job must run at least once per day)
//! - Health check heartbeat (every 5 minutes)

mod notifier;
mod store;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use time::OffsetDateTime;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use prodmap_usage::{
    AlertDispatcher, BillingReminderService, Notifier, SweepCancellation, SweepSummary,
    TenantOutcome, UnmeteredStorage, UsageAggregator, UsageEngine,
};

use notifier::ResendNotifier;
use store::{
    PgAlertLedger, PgCountStore, PgRecipientResolver, PgReportSink, PgSubscriptionSource,
    PgTenantDirectory,
};

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

/// Log results of a usage sweep
fn log_sweep_results(summary: &SweepSummary) {
    info!(
        evaluated = summary.evaluated,
        failed = summary.failed,
        skipped = summary.skipped,
        systemic_failure = summary.systemic_failure,
        "Usage sweep complete"
    );

    for outcome in &summary.outcomes {
        match outcome {
            TenantOutcome::Failed { tenant_id, error } => {
                error!(tenant_id = %tenant_id, error = %error, "Tenant evaluation failed");
            }
            TenantOutcome::Evaluated(eval) => {
                if eval.dispatch.is_degenerate() {
                    warn!(
                        tenant_id = %eval.report.tenant_id,
                        metrics = ?eval.dispatch.unnotified,
                        "Alert condition with no admin/owner recipients"
                    );
                }
                if let Some(rec) = &eval.recommendation {
                    info!(
                        tenant_id = %rec.tenant_id,
                        current_tier = %rec.current_tier,
                        suggested_tier = %rec.suggested_tier,
                        metrics = ?rec.triggering_metrics,
                        "Upgrade recommended"
                    );
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting ProdMap Worker");

    // Create database pool
    let pool = create_db_pool().await?;

    // Wire the engine to its Postgres collaborators
    let notifier = Arc::new(ResendNotifier::from_env());
    if notifier.is_configured() {
        info!("Notifier configured (Resend)");
    } else {
        // Explicit unconfigured state: sends will fail loudly instead of
        // silently pretending to deliver.
        warn!("RESEND_API_KEY not set - notifier is UNCONFIGURED, alert sends will fail");
    }

    let resolver = Arc::new(PgRecipientResolver::new(pool.clone()));
    let subscriptions = Arc::new(PgSubscriptionSource::new(pool.clone()));

    let aggregator = UsageAggregator::new(
        Arc::new(PgCountStore::new(pool.clone())),
        Arc::new(UnmeteredStorage),
    );
    let dispatcher = AlertDispatcher::new(
        notifier.clone(),
        resolver.clone(),
        Arc::new(PgAlertLedger::new(pool.clone())),
    );
    let engine = Arc::new(UsageEngine::new(
        aggregator,
        dispatcher,
        subscriptions.clone(),
        Arc::new(PgTenantDirectory::new(pool.clone())),
        Arc::new(PgReportSink::new(pool.clone())),
    ));
    let reminders = Arc::new(BillingReminderService::new(
        subscriptions,
        resolver,
        notifier,
    ));

    let sweep_cancel = SweepCancellation::new();

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Nightly usage sweep (2:00 AM UTC)
    // Evaluates every tenant's consumption against its tier quotas and
    // dispatches deduplicated alerts.
    let sweep_engine = engine.clone();
    let job_cancel = sweep_cancel.clone();
    scheduler
        .add(Job::new_async("0 0 2 * * *", move |_uuid, _l| {
            let engine = sweep_engine.clone();
            let cancel = job_cancel.clone();
            Box::pin(async move {
                info!("Running nightly usage sweep");
                match engine.evaluate_all(&cancel).await {
                    Ok(summary) => log_sweep_results(&summary),
                    Err(e) => error!(error = %e, "Usage sweep failed to start"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Nightly usage sweep (2:00 AM UTC)");

    // Job 2: Billing-cycle renewal reminders (daily at 9:00 AM UTC)
    let reminder_service = reminders.clone();
    scheduler
        .add(Job::new_async("0 0 9 * * *", move |_uuid, _l| {
            let service = reminder_service.clone();
            Box::pin(async move {
                info!("Running billing reminder sweep");
                if let Err(e) = service.run(OffsetDateTime::now_utc()).await {
                    error!(error = %e, "Billing reminder sweep failed");
                }
            })
        })?)
        .await?;
    info!("Scheduled: Billing renewal reminders (daily at 9:00 AM UTC)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("ProdMap Worker started successfully with 3 scheduled jobs");

    // Run until interrupted; a sweep in progress finishes its in-flight
    // tenants and persists their reports before we exit.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, cancelling in-progress sweep scheduling");
    sweep_cancel.cancel();

    let mut scheduler = scheduler;
    scheduler.shutdown().await?;
    info!("ProdMap Worker stopped");

    Ok(())
}
