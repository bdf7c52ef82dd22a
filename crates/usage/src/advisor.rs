//! Upgrade recommendations
//!
//! A softer, earlier signal than the dispatcher's hard warnings: any metric
//! past 70% of quota suggests the tenant is outgrowing its tier. Advisory
//! only; producing a recommendation has no side effects.

use serde::{Deserialize, Serialize};

use prodmap_shared::{SubscriptionTier, TenantId};

use crate::classifier::percentage_of_quota;
use crate::metrics::{ConsumptionVector, Metric};
use crate::tiers::{Limit, QuotaVector};

/// Percentage-of-quota above which a metric counts as sustained interest
pub const UPGRADE_INTEREST_PCT: f64 = 70.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeRecommendation {
    pub tenant_id: TenantId,
    pub triggering_metrics: Vec<Metric>,
    pub current_tier: SubscriptionTier,
    pub suggested_tier: SubscriptionTier,
    pub reason: String,
}

/// Recommend the next tier up when usage shows sustained interest.
///
/// Returns `None` at Enterprise (no tier above) or when no measured,
/// non-unlimited metric exceeds 70%. When several metrics qualify the reason
/// names them all; the suggestion is always simply the next tier.
pub fn recommend(
    usage: &ConsumptionVector,
    quotas: &QuotaVector,
    current_tier: SubscriptionTier,
    tenant_id: TenantId,
) -> Option<UpgradeRecommendation> {
    if current_tier == SubscriptionTier::Enterprise {
        return None;
    }

    let mut triggering = Vec::new();
    for metric in Metric::ALL {
        let Some(current) = usage.get(metric).measured() else {
            continue;
        };
        let Limit::Limited(limit) = quotas.get(metric) else {
            continue;
        };
        if percentage_of_quota(current, limit) > UPGRADE_INTEREST_PCT {
            triggering.push(metric);
        }
    }

    if triggering.is_empty() {
        return None;
    }

    let suggested_tier = current_tier.next();
    let names: Vec<&str> = triggering.iter().map(|m| m.display_name()).collect();
    let reason = format!(
        "Usage of {} is above {}% of the {} plan limits. Upgrading to {} raises these limits.",
        names.join(", "),
        UPGRADE_INTEREST_PCT as u64,
        current_tier,
        suggested_tier,
    );

    Some(UpgradeRecommendation {
        tenant_id,
        triggering_metrics: triggering,
        current_tier,
        suggested_tier,
        reason,
    })
}
