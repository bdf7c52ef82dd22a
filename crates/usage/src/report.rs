//! Usage reports and their persistence seam
//!
//! One immutable report per evaluation run, kept for history and audit.
//! The engine only ever creates and stores reports; expiry and retention
//! belong to the surrounding system.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;

use prodmap_shared::{ReportId, SubscriptionTier, TenantId};

use crate::classifier::{ClassificationReport, MetricClassification};
use crate::error::EngineResult;
use crate::metrics::{ConsumptionVector, Metric};
use crate::tiers::QuotaVector;

/// Immutable record of one evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub id: ReportId,
    pub tenant_id: TenantId,
    pub tier: SubscriptionTier,
    pub quotas: QuotaVector,
    pub usage: ConsumptionVector,
    pub warnings: Vec<MetricClassification>,
    pub overages: Vec<MetricClassification>,
    /// Metrics that could not be computed this run. Shown as "unknown"
    /// downstream, never as zero or ok.
    pub unknown_metrics: Vec<Metric>,
    pub generated_at: OffsetDateTime,
}

impl UsageReport {
    pub fn new(
        tenant_id: TenantId,
        tier: SubscriptionTier,
        quotas: QuotaVector,
        usage: ConsumptionVector,
        classification: ClassificationReport,
        generated_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: ReportId::new(),
            tenant_id,
            tier,
            quotas,
            usage,
            warnings: classification.warnings,
            overages: classification.overages,
            unknown_metrics: classification.unknown,
            generated_at,
        }
    }
}

/// Write contract for report persistence: idempotent upsert by report id
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn put(&self, report: &UsageReport) -> EngineResult<()>;
}

/// In-memory sink for tests and ephemeral deployments
#[derive(Default)]
pub struct InMemoryReportSink {
    reports: Mutex<HashMap<ReportId, UsageReport>>,
}

impl InMemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reports_for(&self, tenant: TenantId) -> Vec<UsageReport> {
        self.reports
            .lock()
            .await
            .values()
            .filter(|r| r.tenant_id == tenant)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.reports.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.reports.lock().await.is_empty()
    }
}

#[async_trait]
impl ReportSink for InMemoryReportSink {
    async fn put(&self, report: &UsageReport) -> EngineResult<()> {
        self.reports
            .lock()
            .await
            .insert(report.id, report.clone());
        Ok(())
    }
}
