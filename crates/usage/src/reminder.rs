//! Billing-cycle reminders
//!
//! Independent of the usage-classification pipeline: keyed only by the
//! subscription's renewal date. Fires at exactly 7, 3, and 1 days before
//! renewal, so the check must run at least once per day; a coarser cadence
//! skips boundaries and is a correctness bug, not a style choice.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{error, info};

use prodmap_shared::{Subscription, SubscriptionStatus, SubscriptionTier};

use crate::error::EngineResult;
use crate::notify::{template, Notifier, RecipientResolver};
use crate::tiers::resolve_tier;

/// Day offsets before renewal at which a reminder fires (exact match)
pub const REMINDER_OFFSETS_DAYS: [i64; 3] = [7, 3, 1];

/// Read-only access to subscription records, owned by the external billing
/// system.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn subscription(
        &self,
        tenant: prodmap_shared::TenantId,
    ) -> EngineResult<Option<Subscription>>;

    /// All subscriptions that could be due a renewal reminder
    async fn renewing_subscriptions(&self) -> EngineResult<Vec<Subscription>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    FreeTier,
    NoRenewalDate,
    Inactive,
    NotDue,
}

/// Outcome of checking one subscription against the reminder offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReminderDecision {
    Skip { reason: SkipReason },
    Fire { days_until: i64 },
}

/// Whole days until the renewal date, rounded up
fn days_until(renewal: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let seconds = (renewal - now).whole_seconds();
    (seconds as f64 / 86_400.0).ceil() as i64
}

/// Decide whether a renewal reminder is due for this subscription right now.
///
/// Exact-match policy: fires only when the ceiling of days-until-renewal is
/// one of 7, 3 or 1. Free-tier subscriptions, canceled subscriptions and
/// subscriptions without a renewal date never fire.
pub fn check_renewal(subscription: &Subscription, now: OffsetDateTime) -> ReminderDecision {
    if resolve_tier(&subscription.tier) == SubscriptionTier::Free {
        return ReminderDecision::Skip {
            reason: SkipReason::FreeTier,
        };
    }
    if subscription.status == SubscriptionStatus::Canceled {
        return ReminderDecision::Skip {
            reason: SkipReason::Inactive,
        };
    }
    let Some(renewal) = subscription.renewal_date else {
        return ReminderDecision::Skip {
            reason: SkipReason::NoRenewalDate,
        };
    };

    let days = days_until(renewal, now);
    if REMINDER_OFFSETS_DAYS.contains(&days) {
        ReminderDecision::Fire { days_until: days }
    } else {
        ReminderDecision::Skip {
            reason: SkipReason::NotDue,
        }
    }
}

/// Summary of one reminder sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReminderRunSummary {
    pub checked: usize,
    pub fired: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Timer-driven reminder runner: checks every renewing subscription and
/// notifies the tenant's billing contacts when a reminder is due.
pub struct BillingReminderService {
    source: Arc<dyn SubscriptionSource>,
    resolver: Arc<dyn RecipientResolver>,
    notifier: Arc<dyn Notifier>,
}

impl BillingReminderService {
    pub fn new(
        source: Arc<dyn SubscriptionSource>,
        resolver: Arc<dyn RecipientResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            source,
            resolver,
            notifier,
        }
    }

    /// Run one reminder sweep at `now`.
    ///
    /// Per-tenant and per-recipient failures are isolated and counted; they
    /// never abort the sweep.
    pub async fn run(&self, now: OffsetDateTime) -> EngineResult<ReminderRunSummary> {
        let subscriptions = self.source.renewing_subscriptions().await?;
        let mut summary = ReminderRunSummary {
            checked: subscriptions.len(),
            ..Default::default()
        };

        for subscription in subscriptions {
            let ReminderDecision::Fire { days_until } = check_renewal(&subscription, now) else {
                continue;
            };
            summary.fired += 1;

            let recipients = match self.resolver.admins_of(subscription.tenant_id).await {
                Ok(r) => r,
                Err(e) => {
                    error!(
                        tenant_id = %subscription.tenant_id,
                        error = %e,
                        "could not resolve reminder recipients"
                    );
                    summary.failed += 1;
                    continue;
                }
            };

            let params = json!({
                "tenant_id": subscription.tenant_id,
                "days_until_billing": days_until,
                "tier": subscription.tier,
                "amount_cents": subscription.billing_amount_cents,
                "currency": subscription.currency,
            });

            for recipient in &recipients {
                match self
                    .notifier
                    .send(recipient, template::BILLING_REMINDER, params.clone())
                    .await
                {
                    Ok(()) => summary.sent += 1,
                    Err(e) => {
                        error!(
                            tenant_id = %subscription.tenant_id,
                            recipient = %recipient,
                            error = %e,
                            "billing reminder send failed"
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        info!(
            checked = summary.checked,
            fired = summary.fired,
            sent = summary.sent,
            failed = summary.failed,
            "billing reminder sweep complete"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prodmap_shared::TenantId;
    use time::Duration;

    fn subscription(tier: &str, renewal: Option<OffsetDateTime>) -> Subscription {
        Subscription {
            tenant_id: TenantId::new(),
            tier: tier.to_string(),
            status: SubscriptionStatus::Active,
            renewal_date: renewal,
            billing_amount_cents: 2900,
            currency: "usd".to_string(),
        }
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn fires_at_exactly_seven_days() {
        let sub = subscription("starter", Some(now() + Duration::days(7)));
        assert_eq!(
            check_renewal(&sub, now()),
            ReminderDecision::Fire { days_until: 7 }
        );
    }

    #[test]
    fn does_not_fire_at_six_or_eight_days() {
        for days in [6, 8] {
            let sub = subscription("starter", Some(now() + Duration::days(days)));
            assert_eq!(
                check_renewal(&sub, now()),
                ReminderDecision::Skip {
                    reason: SkipReason::NotDue
                },
                "should not fire at {days} days"
            );
        }
    }

    #[test]
    fn fires_once_per_offset_not_below() {
        // Three days out fires; two days out (the next day) must not
        let sub = subscription("professional", Some(now() + Duration::days(3)));
        assert_eq!(
            check_renewal(&sub, now()),
            ReminderDecision::Fire { days_until: 3 }
        );
        assert_eq!(
            check_renewal(&sub, now() + Duration::days(1)),
            ReminderDecision::Skip {
                reason: SkipReason::NotDue
            }
        );
    }

    #[test]
    fn partial_days_round_up() {
        // 6 days and 20 hours out is "7 days" by the ceiling rule
        let sub = subscription("starter", Some(now() + Duration::days(6) + Duration::hours(20)));
        assert_eq!(
            check_renewal(&sub, now()),
            ReminderDecision::Fire { days_until: 7 }
        );
    }

    #[test]
    fn free_tier_and_missing_renewal_are_noops() {
        let sub = subscription("free", Some(now() + Duration::days(7)));
        assert_eq!(
            check_renewal(&sub, now()),
            ReminderDecision::Skip {
                reason: SkipReason::FreeTier
            }
        );

        let sub = subscription("starter", None);
        assert_eq!(
            check_renewal(&sub, now()),
            ReminderDecision::Skip {
                reason: SkipReason::NoRenewalDate
            }
        );
    }

    #[test]
    fn canceled_subscription_is_a_noop() {
        let mut sub = subscription("starter", Some(now() + Duration::days(3)));
        sub.status = SubscriptionStatus::Canceled;
        assert_eq!(
            check_renewal(&sub, now()),
            ReminderDecision::Skip {
                reason: SkipReason::Inactive
            }
        );
    }
}
