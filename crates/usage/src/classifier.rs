//! Threshold classification of consumption against quotas
//!
//! `classify` is a pure function of (current, limit): no clock, no store, no
//! prior state. Only the dispatch decision consults history.

use serde::{Deserialize, Serialize};

use crate::metrics::{ConsumptionVector, Metric};
use crate::tiers::{Limit, QuotaVector};

/// Percentage-of-quota at which a yellow warning starts
pub const WARNING_YELLOW_PCT: f64 = 80.0;
/// Percentage-of-quota at which a red warning starts
pub const WARNING_RED_PCT: f64 = 95.0;
/// Percentage-of-quota at which usage is an overage
pub const OVERAGE_PCT: f64 = 100.0;

/// Severity band for one metric.
///
/// Ordered by severity; the dedup ledger relies on this ordering to detect
/// escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Ok,
    WarningYellow,
    WarningRed,
    Overage,
}

impl Band {
    /// Band for a percentage-of-quota value.
    ///
    /// Boundaries are closed at the lower end, open at the upper:
    /// [80, 95) yellow, [95, 100) red, [100, inf) overage.
    pub fn for_percentage(percentage: f64) -> Self {
        if percentage >= OVERAGE_PCT {
            Self::Overage
        } else if percentage >= WARNING_RED_PCT {
            Self::WarningRed
        } else if percentage >= WARNING_YELLOW_PCT {
            Self::WarningYellow
        } else {
            Self::Ok
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::WarningYellow => "warning_yellow",
            Self::WarningRed => "warning_red",
            Self::Overage => "overage",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Band {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "warning_yellow" => Ok(Self::WarningYellow),
            "warning_red" => Ok(Self::WarningRed),
            "overage" => Ok(Self::Overage),
            other => Err(format!("unknown band: {other}")),
        }
    }
}

/// Classification of one metric against its limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricClassification {
    pub metric: Metric,
    pub current: f64,
    pub limit: u64,
    pub percentage: f64,
    pub band: Band,
}

/// Result of classifying a consumption vector.
///
/// A metric absent from all three lists is at ok. Callers must not infer ok
/// for metrics listed in `unknown`: those could not be computed this run and
/// are reported separately, never folded into ok.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClassificationReport {
    /// Yellow and red warnings (band distinguishes the two)
    pub warnings: Vec<MetricClassification>,
    pub overages: Vec<MetricClassification>,
    /// Metrics the aggregator could not compute
    pub unknown: Vec<Metric>,
}

impl ClassificationReport {
    /// Band for a metric, or None when the metric was unknown this run
    pub fn band_of(&self, metric: Metric) -> Option<Band> {
        if self.unknown.contains(&metric) {
            return None;
        }
        self.overages
            .iter()
            .chain(self.warnings.iter())
            .find(|c| c.metric == metric)
            .map(|c| c.band)
            .or(Some(Band::Ok))
    }

    pub fn has_alertable_entries(&self) -> bool {
        !self.overages.is_empty()
            || self.warnings.iter().any(|w| w.band == Band::WarningRed)
    }
}

/// Percentage-of-quota for one reading.
///
/// A zero limit cannot be divided through: any nonzero usage against a zero
/// quota is an immediate overage (100), zero usage is 0.
pub fn percentage_of_quota(current: f64, limit: u64) -> f64 {
    if limit == 0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        current / limit as f64 * 100.0
    }
}

/// Classify a consumption vector against a quota vector.
///
/// Unlimited metrics are always ok and excluded from alerting. Unknown
/// samples go to `unknown` regardless of the limit.
pub fn classify(usage: &ConsumptionVector, quotas: &QuotaVector) -> ClassificationReport {
    let mut report = ClassificationReport::default();

    for metric in Metric::ALL {
        let sample = usage.get(metric);
        let Some(current) = sample.measured() else {
            report.unknown.push(metric);
            continue;
        };

        let Limit::Limited(limit) = quotas.get(metric) else {
            continue;
        };

        let percentage = percentage_of_quota(current, limit);
        let band = Band::for_percentage(percentage);
        if band == Band::Ok {
            continue;
        }

        let entry = MetricClassification {
            metric,
            current,
            limit,
            percentage,
            band,
        };
        match band {
            Band::Overage => report.overages.push(entry),
            Band::WarningYellow | Band::WarningRed => report.warnings.push(entry),
            Band::Ok => unreachable!("ok entries are skipped above"),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricSample;
    use crate::tiers::quotas_for;
    use prodmap_shared::SubscriptionTier;

    fn measured(values: [f64; 5]) -> ConsumptionVector {
        ConsumptionVector {
            projects: MetricSample::Measured(values[0]),
            features: MetricSample::Measured(values[1]),
            team_members: MetricSample::Measured(values[2]),
            storage_gb: MetricSample::Measured(values[3]),
            monthly_views: MetricSample::Measured(values[4]),
        }
    }

    #[test]
    fn band_boundaries_closed_low_open_high() {
        assert_eq!(Band::for_percentage(79.999), Band::Ok);
        assert_eq!(Band::for_percentage(80.0), Band::WarningYellow);
        assert_eq!(Band::for_percentage(94.999), Band::WarningYellow);
        assert_eq!(Band::for_percentage(95.0), Band::WarningRed);
        assert_eq!(Band::for_percentage(99.999), Band::WarningRed);
        assert_eq!(Band::for_percentage(100.0), Band::Overage);
        assert_eq!(Band::for_percentage(250.0), Band::Overage);
    }

    #[test]
    fn classification_is_monotonic_in_current() {
        let limit = 40;
        let mut last = Band::Ok;
        for current in 0..=80 {
            let band = Band::for_percentage(percentage_of_quota(current as f64, limit));
            assert!(band >= last, "band regressed at current={current}");
            last = band;
        }
    }

    #[test]
    fn zero_limit_edge_cases() {
        assert_eq!(percentage_of_quota(0.0, 0), 0.0);
        assert_eq!(percentage_of_quota(1.0, 0), 100.0);
        assert_eq!(Band::for_percentage(percentage_of_quota(1.0, 0)), Band::Overage);
    }

    #[test]
    fn unlimited_metrics_are_always_ok() {
        let usage = measured([1e12, 1e12, 1e12, 1e12, 1e12]);
        let report = classify(&usage, &quotas_for(SubscriptionTier::Enterprise));
        assert!(report.warnings.is_empty());
        assert!(report.overages.is_empty());
        assert!(report.unknown.is_empty());
    }

    #[test]
    fn classify_is_idempotent() {
        let usage = measured([1.0, 41.0, 2.0, 0.5, 100.0]);
        let quotas = quotas_for(SubscriptionTier::Starter);
        assert_eq!(classify(&usage, &quotas), classify(&usage, &quotas));
    }

    #[test]
    fn free_tier_single_project_is_an_overage() {
        // Free tier: projects limit 1; one project is 100% of quota
        let usage = measured([1.0, 0.0, 1.0, 0.0, 0.0]);
        let report = classify(&usage, &quotas_for(SubscriptionTier::Free));
        let overage = report
            .overages
            .iter()
            .find(|c| c.metric == Metric::Projects)
            .expect("projects should be in overage");
        assert_eq!(overage.percentage, 100.0);
        assert_eq!(overage.band, Band::Overage);
    }

    #[test]
    fn starter_features_at_82_percent_is_yellow_only() {
        // Starter tier: features limit 50; 41 features is 82%
        let usage = measured([1.0, 41.0, 1.0, 0.0, 0.0]);
        let report = classify(&usage, &quotas_for(SubscriptionTier::Starter));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].metric, Metric::Features);
        assert_eq!(report.warnings[0].band, Band::WarningYellow);
        assert!(report.overages.is_empty());
        assert!(!report.has_alertable_entries());
    }

    #[test]
    fn unknown_sample_is_reported_separately_not_ok() {
        let mut usage = measured([0.0, 0.0, 0.0, 0.0, 0.0]);
        usage.set(Metric::StorageGb, MetricSample::Unknown);
        let report = classify(&usage, &quotas_for(SubscriptionTier::Starter));
        assert_eq!(report.unknown, vec![Metric::StorageGb]);
        assert_eq!(report.band_of(Metric::StorageGb), None);
        assert_eq!(report.band_of(Metric::Projects), Some(Band::Ok));
    }
}
