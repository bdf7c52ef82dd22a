//! Alert deduplication ledger
//!
//! The one piece of shared mutable state in the engine: per (tenant, metric),
//! the last band an alert was sent for and when. Consulted before emitting an
//! AlertIntent, updated only after at least one successful send, cleared when
//! usage drops back below the warning threshold.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use prodmap_shared::TenantId;

use crate::classifier::Band;
use crate::error::EngineResult;
use crate::metrics::Metric;

/// How often a sustained overage may re-alert
pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Last-alerted state for one (tenant, metric) key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub band: Band,
    pub alerted_at: OffsetDateTime,
}

/// Persisted memory of the last alert per (tenant, metric).
///
/// Implementations must give each key atomic read/update semantics; the
/// dispatcher may run for many tenants concurrently.
#[async_trait]
pub trait AlertLedger: Send + Sync {
    async fn last_alert(&self, tenant: TenantId, metric: Metric)
        -> EngineResult<Option<AlertState>>;

    /// Record a successful alert for the key (upsert)
    async fn record(&self, tenant: TenantId, metric: Metric, state: AlertState)
        -> EngineResult<()>;

    /// Forget the key, re-arming the alert (usage recovered below 80%)
    async fn clear(&self, tenant: TenantId, metric: Metric) -> EngineResult<()>;
}

/// Whether a new alert should be emitted given the last-alerted state.
///
/// Only red warnings and overages page at all. Within those: alert on first
/// occurrence, on escalation to a more severe band, or when a sustained
/// overage has outlived the repeat interval. A repeat of the same warning
/// band within the interval is suppressed.
pub fn should_alert(
    previous: Option<&AlertState>,
    band: Band,
    now: OffsetDateTime,
    repeat_interval: Duration,
) -> bool {
    if band < Band::WarningRed {
        return false;
    }
    match previous {
        None => true,
        Some(prev) if band > prev.band => true,
        Some(prev) => {
            band == Band::Overage
                && prev.band == Band::Overage
                && now - prev.alerted_at >= repeat_interval
        }
    }
}

/// In-memory ledger.
///
/// Suitable for tests and single-process deployments; the worker uses a
/// Postgres-backed ledger so dedup state survives restarts.
#[derive(Default)]
pub struct InMemoryAlertLedger {
    entries: Mutex<HashMap<(TenantId, Metric), AlertState>>,
}

impl InMemoryAlertLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertLedger for InMemoryAlertLedger {
    async fn last_alert(
        &self,
        tenant: TenantId,
        metric: Metric,
    ) -> EngineResult<Option<AlertState>> {
        Ok(self.entries.lock().await.get(&(tenant, metric)).copied())
    }

    async fn record(
        &self,
        tenant: TenantId,
        metric: Metric,
        state: AlertState,
    ) -> EngineResult<()> {
        self.entries.lock().await.insert((tenant, metric), state);
        Ok(())
    }

    async fn clear(&self, tenant: TenantId, metric: Metric) -> EngineResult<()> {
        self.entries.lock().await.remove(&(tenant, metric));
        Ok(())
    }
}
