//! Engine facade
//!
//! Combines the aggregator, classifier, dispatcher, advisor and report sink
//! behind the two invocation surfaces: an on-demand single-tenant check and
//! a batch sweep over every tenant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use prodmap_shared::{SubscriptionTier, TenantId};

use crate::advisor::{recommend, UpgradeRecommendation};
use crate::aggregator::UsageAggregator;
use crate::classifier::classify;
use crate::dispatcher::{AlertDispatcher, DispatchResult};
use crate::error::{EngineError, EngineResult};
use crate::reminder::SubscriptionSource;
use crate::report::{ReportSink, UsageReport};
use crate::tiers::{quotas_for, resolve_tier};

/// Default cap on concurrent tenant evaluations in a sweep
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 8;

/// Enumerates the tenants a sweep must cover
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn tenant_ids(&self) -> EngineResult<Vec<TenantId>>;
}

/// Cooperative cancellation for a batch sweep.
///
/// Cancelling stops the sweep from scheduling new tenant evaluations;
/// in-flight evaluations finish and persist their report.
#[derive(Debug, Clone, Default)]
pub struct SweepCancellation {
    cancelled: Arc<AtomicBool>,
}

impl SweepCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Result of evaluating one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantEvaluation {
    pub report: UsageReport,
    pub dispatch: DispatchResult,
    pub recommendation: Option<UpgradeRecommendation>,
}

/// Per-tenant outcome in a sweep result list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TenantOutcome {
    Evaluated(Box<TenantEvaluation>),
    Failed { tenant_id: TenantId, error: String },
}

impl TenantOutcome {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            Self::Evaluated(eval) => eval.report.tenant_id,
            Self::Failed { tenant_id, .. } => *tenant_id,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Aggregate result of a batch sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepSummary {
    pub outcomes: Vec<TenantOutcome>,
    pub evaluated: usize,
    pub failed: usize,
    /// Tenants never scheduled because the sweep was cancelled
    pub skipped: usize,
    /// Every attempted tenant failed: the store itself is likely down.
    /// Surfaced here instead of being swallowed into per-tenant noise.
    pub systemic_failure: bool,
}

/// The usage-accounting and alerting engine
pub struct UsageEngine {
    aggregator: UsageAggregator,
    dispatcher: AlertDispatcher,
    subscriptions: Arc<dyn SubscriptionSource>,
    directory: Arc<dyn TenantDirectory>,
    sink: Arc<dyn ReportSink>,
    sweep_concurrency: usize,
}

impl UsageEngine {
    pub fn new(
        aggregator: UsageAggregator,
        dispatcher: AlertDispatcher,
        subscriptions: Arc<dyn SubscriptionSource>,
        directory: Arc<dyn TenantDirectory>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            aggregator,
            dispatcher,
            subscriptions,
            directory,
            sink,
            sweep_concurrency: DEFAULT_SWEEP_CONCURRENCY,
        }
    }

    pub fn with_sweep_concurrency(mut self, concurrency: usize) -> Self {
        self.sweep_concurrency = concurrency.max(1);
        self
    }

    /// Evaluate one tenant: aggregate, classify, persist, alert, advise.
    ///
    /// A missing subscription record means the tenant was never upgraded and
    /// is treated as Free; an unrecognized tier string fails closed to Free.
    pub async fn evaluate_tenant(&self, tenant_id: TenantId) -> EngineResult<TenantEvaluation> {
        let tier = match self.subscriptions.subscription(tenant_id).await? {
            Some(subscription) => resolve_tier(&subscription.tier),
            None => SubscriptionTier::Free,
        };
        let quotas = quotas_for(tier);

        let usage = self.aggregator.current_usage(tenant_id).await?;
        let classification = classify(&usage, &quotas);

        if !classification.unknown.is_empty() {
            warn!(
                tenant_id = %tenant_id,
                unknown = ?classification.unknown,
                "evaluation is partial, unknown metrics excluded from alerting"
            );
        }

        // Persist before dispatching so the audit trail exists even if a
        // collaborator fails during notification.
        let report = UsageReport::new(
            tenant_id,
            tier,
            quotas,
            usage.clone(),
            classification.clone(),
            OffsetDateTime::now_utc(),
        );
        self.sink.put(&report).await?;

        let dispatch = self.dispatcher.dispatch(&classification, tenant_id).await?;
        let recommendation = recommend(&usage, &quotas, tier, tenant_id);

        info!(
            tenant_id = %tenant_id,
            tier = %tier,
            warnings = report.warnings.len(),
            overages = report.overages.len(),
            unknown = report.unknown_metrics.len(),
            alerts_sent = dispatch.sent,
            "tenant evaluation complete"
        );

        Ok(TenantEvaluation {
            report,
            dispatch,
            recommendation,
        })
    }

    /// Sweep every tenant, bounded by the configured worker-pool size.
    ///
    /// Per-tenant failures become failed outcomes and never abort the sweep.
    /// Cancellation is cooperative: checked before each tenant is scheduled,
    /// in-flight evaluations run to completion.
    pub async fn evaluate_all(
        self: Arc<Self>,
        cancel: &SweepCancellation,
    ) -> EngineResult<SweepSummary> {
        let tenants = self.directory.tenant_ids().await?;
        let total = tenants.len();
        info!(tenants = total, "starting usage sweep");

        let semaphore = Arc::new(Semaphore::new(self.sweep_concurrency));
        let mut tasks: JoinSet<TenantOutcome> = JoinSet::new();
        let mut tenant_of_task: HashMap<tokio::task::Id, TenantId> = HashMap::new();
        let mut summary = SweepSummary::default();

        for tenant_id in tenants {
            if cancel.is_cancelled() {
                summary.skipped += 1;
                continue;
            }

            // Bound in-flight evaluations before spawning the next one
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break, // semaphore closed, nothing more to schedule
            };
            let engine = Arc::clone(&self);
            let handle = tasks.spawn(async move {
                let _permit = permit;
                match engine.evaluate_tenant(tenant_id).await {
                    Ok(eval) => TenantOutcome::Evaluated(Box::new(eval)),
                    Err(e) => {
                        let error = EngineError::Scheduling {
                            tenant_id,
                            reason: e.to_string(),
                        };
                        error!(tenant_id = %tenant_id, error = %error, "tenant evaluation failed");
                        TenantOutcome::Failed {
                            tenant_id,
                            error: error.to_string(),
                        }
                    }
                }
            });
            tenant_of_task.insert(handle.id(), tenant_id);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                // A panicked task is a bug, but the tenant must still appear
                // in the result list as a failed outcome.
                Err(e) => match tenant_of_task.get(&e.id()).copied() {
                    Some(tenant_id) => {
                        let error = EngineError::Scheduling {
                            tenant_id,
                            reason: format!("evaluation task panicked: {e}"),
                        };
                        error!(tenant_id = %tenant_id, error = %error, "tenant evaluation task panicked");
                        TenantOutcome::Failed {
                            tenant_id,
                            error: error.to_string(),
                        }
                    }
                    None => {
                        error!(error = %e, "evaluation task with untracked id failed");
                        continue;
                    }
                },
            };
            if outcome.is_failed() {
                summary.failed += 1;
            } else {
                summary.evaluated += 1;
            }
            summary.outcomes.push(outcome);
        }

        summary.systemic_failure = !summary.outcomes.is_empty() && summary.evaluated == 0;
        if summary.systemic_failure {
            error!(
                failed = summary.failed,
                "every tenant evaluation failed, data store is likely unreachable"
            );
        }

        info!(
            evaluated = summary.evaluated,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = cancel.is_cancelled(),
            "usage sweep complete"
        );

        Ok(summary)
    }

    /// Surface for callers that want a fatal error on a systemic sweep
    /// failure instead of inspecting the summary flag.
    pub async fn evaluate_all_strict(
        self: Arc<Self>,
        cancel: &SweepCancellation,
    ) -> EngineResult<SweepSummary> {
        let summary = self.evaluate_all(cancel).await?;
        if summary.systemic_failure {
            return Err(EngineError::Store(format!(
                "all {} attempted tenant evaluations failed",
                summary.failed
            )));
        }
        Ok(summary)
    }
}
