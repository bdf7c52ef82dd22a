//! Alert dispatch
//!
//! Turns a classification report into notification intents, debounces them
//! against the dedup ledger, and fans each surviving intent out to the
//! tenant's admin/owner recipients.
//!
//! Policy: overages and red warnings page; yellow warnings surface only in
//! the report, to avoid alert fatigue. Per-recipient sends are isolated: one
//! failing recipient never aborts delivery to the others.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use prodmap_shared::TenantId;

use crate::classifier::{Band, ClassificationReport, MetricClassification};
use crate::error::EngineResult;
use crate::ledger::{should_alert, AlertLedger, AlertState, DEFAULT_REPEAT_INTERVAL};
use crate::metrics::Metric;
use crate::notify::{template, Notifier, RecipientResolver};

/// A decision to notify, not yet a confirmed delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertIntent {
    pub tenant_id: TenantId,
    pub metric: Metric,
    pub band: Band,
    pub current: f64,
    pub limit: u64,
    pub percentage: f64,
    pub recipients: Vec<String>,
}

/// A send that failed for one recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSend {
    pub recipient: String,
    pub metric: Metric,
    pub reason: String,
}

/// Outcome of one dispatch run for one tenant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Intents that passed the dedup ledger
    pub intents: Vec<AlertIntent>,
    /// Successful sends across all intents and recipients
    pub sent: usize,
    /// Per-recipient failures (isolated, delivery to others continued)
    pub failed: Vec<FailedSend>,
    /// Alertable entries suppressed by the dedup ledger
    pub suppressed: usize,
    /// Alert conditions that existed but had no recipients to notify.
    /// Recorded for audit; never a silent success.
    pub unnotified: Vec<Metric>,
}

impl DispatchResult {
    pub fn is_degenerate(&self) -> bool {
        !self.unnotified.is_empty()
    }
}

/// Converts classifications into notifications, deduplicated per
/// (tenant, metric, band) against the ledger.
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    resolver: Arc<dyn RecipientResolver>,
    ledger: Arc<dyn AlertLedger>,
    repeat_interval: Duration,
}

impl AlertDispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        resolver: Arc<dyn RecipientResolver>,
        ledger: Arc<dyn AlertLedger>,
    ) -> Self {
        Self {
            notifier,
            resolver,
            ledger,
            repeat_interval: DEFAULT_REPEAT_INTERVAL,
        }
    }

    pub fn with_repeat_interval(mut self, interval: Duration) -> Self {
        self.repeat_interval = interval;
        self
    }

    /// Dispatch alerts for one tenant's classification report.
    ///
    /// Ledger interaction: entries that should alert are sent and then
    /// recorded (only after at least one successful send); metrics that
    /// recovered below the warning threshold have their ledger entry
    /// cleared so the next incident alerts again.
    pub async fn dispatch(
        &self,
        report: &ClassificationReport,
        tenant_id: TenantId,
    ) -> EngineResult<DispatchResult> {
        let now = OffsetDateTime::now_utc();
        let mut result = DispatchResult::default();

        // Red warnings and overages are the only paging bands
        let alertable: Vec<&MetricClassification> = report
            .overages
            .iter()
            .chain(report.warnings.iter().filter(|w| w.band == Band::WarningRed))
            .collect();

        self.rearm_recovered_metrics(report, tenant_id).await?;

        if alertable.is_empty() {
            return Ok(result);
        }

        let mut pending = Vec::new();
        for entry in alertable {
            let previous = self.ledger.last_alert(tenant_id, entry.metric).await?;
            if should_alert(previous.as_ref(), entry.band, now, self.repeat_interval) {
                pending.push(entry);
            } else {
                result.suppressed += 1;
            }
        }

        if pending.is_empty() {
            return Ok(result);
        }

        let recipients = self.resolver.admins_of(tenant_id).await?;
        if recipients.is_empty() {
            // Degenerate case: the alert condition existed but nobody could
            // be notified. Report it rather than silently succeeding.
            warn!(
                tenant_id = %tenant_id,
                conditions = pending.len(),
                "alert conditions present but tenant has no admin/owner recipients"
            );
            result.unnotified = pending.iter().map(|e| e.metric).collect();
            return Ok(result);
        }

        for entry in pending {
            let intent = AlertIntent {
                tenant_id,
                metric: entry.metric,
                band: entry.band,
                current: entry.current,
                limit: entry.limit,
                percentage: entry.percentage,
                recipients: recipients.clone(),
            };

            let delivered = self.deliver(&intent, &mut result).await;
            if delivered > 0 {
                self.ledger
                    .record(
                        tenant_id,
                        entry.metric,
                        AlertState {
                            band: entry.band,
                            alerted_at: now,
                        },
                    )
                    .await?;
            }
            result.sent += delivered;
            result.intents.push(intent);
        }

        info!(
            tenant_id = %tenant_id,
            intents = result.intents.len(),
            sent = result.sent,
            failed = result.failed.len(),
            suppressed = result.suppressed,
            "alert dispatch complete"
        );

        Ok(result)
    }

    /// Send one intent to every recipient, isolating failures.
    /// Returns the number of successful sends.
    async fn deliver(&self, intent: &AlertIntent, result: &mut DispatchResult) -> usize {
        let params = json!({
            "tenant_id": intent.tenant_id,
            "metric": intent.metric.as_str(),
            "metric_label": intent.metric.display_name(),
            "band": intent.band.as_str(),
            "current": intent.current,
            "limit": intent.limit,
            "percentage": intent.percentage,
        });

        let sends = intent.recipients.iter().map(|recipient| {
            let params = params.clone();
            async move {
                let outcome = self
                    .notifier
                    .send(recipient, template::USAGE_ALERT, params)
                    .await;
                (recipient.clone(), outcome)
            }
        });

        let mut delivered = 0;
        for (recipient, outcome) in futures::future::join_all(sends).await {
            match outcome {
                Ok(()) => delivered += 1,
                Err(e) => {
                    error!(
                        tenant_id = %intent.tenant_id,
                        recipient = %recipient,
                        metric = %intent.metric,
                        error = %e,
                        "usage alert send failed"
                    );
                    result.failed.push(FailedSend {
                        recipient,
                        metric: intent.metric,
                        reason: e.to_string(),
                    });
                }
            }
        }
        delivered
    }

    /// Clear ledger entries for metrics that are back at ok, so the state
    /// machine returns to `none` and the next incident alerts again.
    async fn rearm_recovered_metrics(
        &self,
        report: &ClassificationReport,
        tenant_id: TenantId,
    ) -> EngineResult<()> {
        for metric in Metric::ALL {
            if report.band_of(metric) == Some(Band::Ok) {
                self.ledger.clear(tenant_id, metric).await?;
            }
        }
        Ok(())
    }
}
