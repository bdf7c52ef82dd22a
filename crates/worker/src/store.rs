//! Postgres implementations of the engine's collaborator seams
//!
//! One adapter struct per contract, all sharing the worker's connection
//! pool. The engine imposes no schema beyond tenant id being filterable;
//! the mapping from collection name to table lives here.

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use prodmap_shared::{Subscription, TenantId};
use prodmap_usage::{
    collection, AlertLedger, AlertState, Band, CountFilter, CountStore, EngineError, EngineResult,
    Metric, ReportSink, SubscriptionSource, TenantDirectory, UsageReport,
};

fn store_err(e: sqlx::Error) -> EngineError {
    EngineError::Store(e.to_string())
}

/// Counting queries against the product tables
pub struct PgCountStore {
    pool: PgPool,
}

impl PgCountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CountStore for PgCountStore {
    async fn count(&self, coll: &str, filter: CountFilter) -> EngineResult<u64> {
        let count: i64 = match coll {
            collection::PROJECTS => {
                sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE tenant_id = $1")
                    .bind(filter.tenant_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(store_err)?
            }
            collection::FEATURES => {
                sqlx::query_scalar("SELECT COUNT(*) FROM features WHERE tenant_id = $1")
                    .bind(filter.tenant_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(store_err)?
            }
            collection::MEMBERS => {
                let mut sql =
                    String::from("SELECT COUNT(*) FROM tenant_members WHERE tenant_id = $1");
                if filter.active_only {
                    sql.push_str(" AND status = 'active'");
                }
                sqlx::query_scalar(&sql)
                    .bind(filter.tenant_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(store_err)?
            }
            collection::ANALYTICS_EVENTS => match filter.since {
                Some(since) => sqlx::query_scalar(
                    "SELECT COUNT(*) FROM analytics_events
                     WHERE tenant_id = $1 AND occurred_at >= $2",
                )
                .bind(filter.tenant_id)
                .bind(since)
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?,
                None => sqlx::query_scalar(
                    "SELECT COUNT(*) FROM analytics_events WHERE tenant_id = $1",
                )
                .bind(filter.tenant_id)
                .fetch_one(&self.pool)
                .await
                .map_err(store_err)?,
            },
            other => {
                return Err(EngineError::Store(format!("unknown collection: {other}")));
            }
        };
        Ok(count.max(0) as u64)
    }
}

/// Tenant enumeration for batch sweeps
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn tenant_ids(&self) -> EngineResult<Vec<TenantId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM tenants ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(ids.into_iter().map(TenantId::from).collect())
    }
}

/// Read-only view of the billing system's subscription records
pub struct PgSubscriptionSource {
    pool: PgPool,
}

impl PgSubscriptionSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionSource for PgSubscriptionSource {
    async fn subscription(&self, tenant: TenantId) -> EngineResult<Option<Subscription>> {
        sqlx::query_as(
            "SELECT tenant_id, tier, status, renewal_date, billing_amount_cents, currency
             FROM subscriptions WHERE tenant_id = $1",
        )
        .bind(tenant)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn renewing_subscriptions(&self) -> EngineResult<Vec<Subscription>> {
        // Cheap prefilter; check_renewal re-verifies tier, status and date
        sqlx::query_as(
            "SELECT tenant_id, tier, status, renewal_date, billing_amount_cents, currency
             FROM subscriptions
             WHERE status != 'canceled'
               AND renewal_date IS NOT NULL
               AND tier != 'free'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)
    }
}

/// Resolves alert recipients: active members holding admin or owner
pub struct PgRecipientResolver {
    pool: PgPool,
}

impl PgRecipientResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl prodmap_usage::RecipientResolver for PgRecipientResolver {
    async fn admins_of(&self, tenant: TenantId) -> EngineResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT u.email
             FROM tenant_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.tenant_id = $1
               AND m.role IN ('owner', 'admin')
               AND m.status = 'active'
             ORDER BY u.email",
        )
        .bind(tenant)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)
    }
}

/// Durable dedup ledger, keyed (tenant_id, metric).
///
/// The upsert makes each key's update atomic, so concurrent dispatches for
/// different tenants never contend and a restart keeps debounce history.
pub struct PgAlertLedger {
    pool: PgPool,
}

impl PgAlertLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertLedger for PgAlertLedger {
    async fn last_alert(
        &self,
        tenant: TenantId,
        metric: Metric,
    ) -> EngineResult<Option<AlertState>> {
        let row: Option<(String, OffsetDateTime)> = sqlx::query_as(
            "SELECT band, alerted_at FROM usage_alert_ledger
             WHERE tenant_id = $1 AND metric = $2",
        )
        .bind(tenant)
        .bind(metric.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            None => Ok(None),
            Some((band, alerted_at)) => {
                let band: Band = band.parse().map_err(EngineError::Store)?;
                Ok(Some(AlertState { band, alerted_at }))
            }
        }
    }

    async fn record(
        &self,
        tenant: TenantId,
        metric: Metric,
        state: AlertState,
    ) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO usage_alert_ledger (tenant_id, metric, band, alerted_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (tenant_id, metric)
             DO UPDATE SET band = EXCLUDED.band, alerted_at = EXCLUDED.alerted_at",
        )
        .bind(tenant)
        .bind(metric.as_str())
        .bind(state.band.as_str())
        .bind(state.alerted_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn clear(&self, tenant: TenantId, metric: Metric) -> EngineResult<()> {
        sqlx::query("DELETE FROM usage_alert_ledger WHERE tenant_id = $1 AND metric = $2")
            .bind(tenant)
            .bind(metric.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

/// Usage report history, upserted by report id
pub struct PgReportSink {
    pool: PgPool,
}

impl PgReportSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportSink for PgReportSink {
    async fn put(&self, report: &UsageReport) -> EngineResult<()> {
        let payload = serde_json::to_value(report)
            .map_err(|e| EngineError::Store(format!("report serialization failed: {e}")))?;

        sqlx::query(
            "INSERT INTO usage_reports (id, tenant_id, payload, generated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE SET payload = EXCLUDED.payload",
        )
        .bind(report.id)
        .bind(report.tenant_id)
        .bind(payload)
        .bind(report.generated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}
