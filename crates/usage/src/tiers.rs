//! Tier catalog: the static mapping from subscription tier to quota vector
//!
//! Quotas are defined at compile time and never change at runtime. Unknown
//! tier strings fail closed to the Free quotas: an unrecognized tier must
//! never silently grant unlimited access.

use serde::{Deserialize, Serialize};

use prodmap_shared::SubscriptionTier;

use crate::error::{EngineError, EngineResult};
use crate::metrics::Metric;

/// A per-metric quota limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    Limited(u64),
    Unlimited,
}

impl Limit {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl std::fmt::Display for Limit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{n}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Per-metric limits for one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaVector {
    pub projects: Limit,
    pub features: Limit,
    pub team_members: Limit,
    pub storage_gb: Limit,
    pub monthly_views: Limit,
}

impl QuotaVector {
    pub fn get(&self, metric: Metric) -> Limit {
        match metric {
            Metric::Projects => self.projects,
            Metric::Features => self.features,
            Metric::TeamMembers => self.team_members,
            Metric::StorageGb => self.storage_gb,
            Metric::MonthlyViews => self.monthly_views,
        }
    }
}

/// Quota vector for a tier. Static table, total over the four fixed tiers.
pub fn quotas_for(tier: SubscriptionTier) -> QuotaVector {
    use Limit::{Limited, Unlimited};
    match tier {
        SubscriptionTier::Free => QuotaVector {
            projects: Limited(1),
            features: Limited(25),
            team_members: Limited(3),
            storage_gb: Limited(1),
            monthly_views: Limited(5_000),
        },
        SubscriptionTier::Starter => QuotaVector {
            projects: Limited(5),
            features: Limited(50),
            team_members: Limited(10),
            storage_gb: Limited(10),
            monthly_views: Limited(50_000),
        },
        SubscriptionTier::Professional => QuotaVector {
            projects: Limited(20),
            features: Limited(500),
            team_members: Limited(15),
            storage_gb: Limited(100),
            monthly_views: Limited(500_000),
        },
        SubscriptionTier::Enterprise => QuotaVector {
            projects: Unlimited,
            features: Unlimited,
            team_members: Unlimited,
            storage_gb: Unlimited,
            monthly_views: Unlimited,
        },
    }
}

/// Quotas for a raw tier string, failing with `UnknownTier` when the string
/// does not name one of the four fixed tiers.
pub fn try_quotas_for(raw: &str) -> EngineResult<QuotaVector> {
    let tier = SubscriptionTier::parse(raw)
        .map_err(|e| EngineError::UnknownTier { raw: e.raw })?;
    Ok(quotas_for(tier))
}

/// Production fail-closed path: resolve a raw tier string, defaulting to
/// `Free` (the strictest quotas) when the string is unknown. The fallback is
/// logged loudly so a bad tier value in the billing store is visible.
pub fn resolve_tier(raw: &str) -> SubscriptionTier {
    match SubscriptionTier::parse(raw) {
        Ok(tier) => tier,
        Err(e) => {
            tracing::error!(
                tier = %e.raw,
                "unknown subscription tier, failing closed to free quotas"
            );
            SubscriptionTier::Free
        }
    }
}
