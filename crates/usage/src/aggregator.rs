//! Usage aggregation
//!
//! Builds a tenant's consumption vector from one counting query per metric
//! against the external store, plus a storage estimate from the external
//! meter. Read-only; the five reads run concurrently and are joined before
//! classification. A failed or timed-out read degrades that one metric to
//! Unknown instead of failing the evaluation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::warn;

use prodmap_shared::TenantId;

use crate::error::{EngineError, EngineResult};
use crate::metrics::{ConsumptionVector, Metric, MetricSample};

/// Trailing window for the monthly-views metric
pub const VIEW_WINDOW_DAYS: i64 = 30;

/// Default per-query timeout; a timeout is treated exactly like a query
/// failure, retried only at the next scheduled sweep
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Collections the aggregator counts in the external store
pub mod collection {
    pub const PROJECTS: &str = "projects";
    pub const FEATURES: &str = "features";
    pub const MEMBERS: &str = "members";
    pub const ANALYTICS_EVENTS: &str = "analytics_events";
}

/// Filter for a counting query. The engine imposes no schema beyond the
/// tenant id being filterable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountFilter {
    pub tenant_id: TenantId,
    /// Lower bound on the record timestamp (trailing-window metrics)
    pub since: Option<OffsetDateTime>,
    /// Restrict to records in an active state (membership counts)
    pub active_only: bool,
}

impl CountFilter {
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            since: None,
            active_only: false,
        }
    }
}

/// External data-store read contract: one counting query per call
#[async_trait]
pub trait CountStore: Send + Sync {
    async fn count(&self, collection: &str, filter: CountFilter) -> EngineResult<u64>;
}

/// External storage metering source
#[async_trait]
pub trait StorageMeter: Send + Sync {
    async fn storage_gb(&self, tenant: TenantId) -> EngineResult<f64>;
}

/// Placeholder meter for the not-yet-implemented storage source.
///
/// Always reports unavailable, so storage shows up as unknown in every
/// report instead of as an invented number.
pub struct UnmeteredStorage;

#[async_trait]
impl StorageMeter for UnmeteredStorage {
    async fn storage_gb(&self, _tenant: TenantId) -> EngineResult<f64> {
        Err(EngineError::NotConfigured("storage meter"))
    }
}

/// Computes a tenant's current consumption vector
pub struct UsageAggregator {
    store: Arc<dyn CountStore>,
    meter: Arc<dyn StorageMeter>,
    query_timeout: Duration,
}

impl UsageAggregator {
    pub fn new(store: Arc<dyn CountStore>, meter: Arc<dyn StorageMeter>) -> Self {
        Self {
            store,
            meter,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Current consumption for one tenant.
    ///
    /// Metrics whose query failed or timed out come back as Unknown; only
    /// when every metric fails is the run itself an error (nothing usable,
    /// treated as a systemic store failure).
    pub async fn current_usage(&self, tenant_id: TenantId) -> EngineResult<ConsumptionVector> {
        let now = OffsetDateTime::now_utc();
        let view_window_start = now - time::Duration::days(VIEW_WINDOW_DAYS);

        let projects = self.count(
            Metric::Projects,
            collection::PROJECTS,
            CountFilter::for_tenant(tenant_id),
        );
        let features = self.count(
            Metric::Features,
            collection::FEATURES,
            CountFilter::for_tenant(tenant_id),
        );
        let members = self.count(
            Metric::TeamMembers,
            collection::MEMBERS,
            CountFilter {
                active_only: true,
                ..CountFilter::for_tenant(tenant_id)
            },
        );
        let views = self.count(
            Metric::MonthlyViews,
            collection::ANALYTICS_EVENTS,
            CountFilter {
                since: Some(view_window_start),
                ..CountFilter::for_tenant(tenant_id)
            },
        );
        let storage = self.storage(tenant_id);

        let (projects, features, members, views, storage) =
            tokio::join!(projects, features, members, views, storage);

        let usage = ConsumptionVector {
            projects,
            features,
            team_members: members,
            storage_gb: storage,
            monthly_views: views,
        };

        if usage.is_empty() {
            return Err(EngineError::Store(format!(
                "no metric could be computed for tenant {tenant_id}"
            )));
        }

        Ok(usage)
    }

    /// Like [`Self::current_usage`], but refuses a partial vector.
    ///
    /// For callers that need every metric present; the sweep path instead
    /// tolerates unknowns and reports them.
    pub async fn complete_usage(&self, tenant_id: TenantId) -> EngineResult<ConsumptionVector> {
        let usage = self.current_usage(tenant_id).await?;
        let missing = usage.missing();
        if !missing.is_empty() {
            return Err(EngineError::PartialData { missing });
        }
        Ok(usage)
    }

    async fn count(&self, metric: Metric, collection: &str, filter: CountFilter) -> MetricSample {
        let query = self.store.count(collection, filter);
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(Ok(count)) => MetricSample::Measured(count as f64),
            Ok(Err(e)) => {
                warn!(
                    tenant_id = %filter.tenant_id,
                    metric = %metric,
                    error = %e,
                    "metric query failed, reporting unknown"
                );
                MetricSample::Unknown
            }
            Err(_) => {
                warn!(
                    tenant_id = %filter.tenant_id,
                    metric = %metric,
                    timeout_secs = self.query_timeout.as_secs(),
                    "metric query timed out, reporting unknown"
                );
                MetricSample::Unknown
            }
        }
    }

    async fn storage(&self, tenant_id: TenantId) -> MetricSample {
        let query = self.meter.storage_gb(tenant_id);
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(Ok(gb)) => MetricSample::Measured(gb),
            Ok(Err(e)) => {
                // Missing storage signal must not block the other metrics
                warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "storage meter unavailable, reporting unknown"
                );
                MetricSample::Unknown
            }
            Err(_) => {
                warn!(tenant_id = %tenant_id, "storage meter timed out, reporting unknown");
                MetricSample::Unknown
            }
        }
    }
}
