//! Metered resources and the per-evaluation consumption vector

use serde::{Deserialize, Serialize};

/// A metered resource.
///
/// The set is closed per evaluation run: adding a metric requires updating
/// the tier catalog and the aggregator symmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Projects,
    Features,
    TeamMembers,
    StorageGb,
    MonthlyViews,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Self::Projects,
        Self::Features,
        Self::TeamMembers,
        Self::StorageGb,
        Self::MonthlyViews,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Features => "features",
            Self::TeamMembers => "team_members",
            Self::StorageGb => "storage_gb",
            Self::MonthlyViews => "monthly_views",
        }
    }

    /// Label used in notification and recommendation copy
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::Features => "features",
            Self::TeamMembers => "team members",
            Self::StorageGb => "storage (GB)",
            Self::MonthlyViews => "monthly views",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single metric reading.
///
/// `Unknown` is a first-class state for metrics the aggregator could not
/// compute. It must never be collapsed into `0` or treated as ok.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum MetricSample {
    Measured(f64),
    Unknown,
}

impl MetricSample {
    pub fn measured(&self) -> Option<f64> {
        match self {
            Self::Measured(v) => Some(*v),
            Self::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// A tenant's current consumption, one sample per metric.
///
/// Produced fresh on each evaluation; persisted only as part of a UsageReport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionVector {
    pub projects: MetricSample,
    pub features: MetricSample,
    pub team_members: MetricSample,
    pub storage_gb: MetricSample,
    pub monthly_views: MetricSample,
}

impl ConsumptionVector {
    /// A vector with every metric unknown
    pub fn unknown() -> Self {
        Self {
            projects: MetricSample::Unknown,
            features: MetricSample::Unknown,
            team_members: MetricSample::Unknown,
            storage_gb: MetricSample::Unknown,
            monthly_views: MetricSample::Unknown,
        }
    }

    pub fn get(&self, metric: Metric) -> MetricSample {
        match metric {
            Metric::Projects => self.projects,
            Metric::Features => self.features,
            Metric::TeamMembers => self.team_members,
            Metric::StorageGb => self.storage_gb,
            Metric::MonthlyViews => self.monthly_views,
        }
    }

    pub fn set(&mut self, metric: Metric, sample: MetricSample) {
        match metric {
            Metric::Projects => self.projects = sample,
            Metric::Features => self.features = sample,
            Metric::TeamMembers => self.team_members = sample,
            Metric::StorageGb => self.storage_gb = sample,
            Metric::MonthlyViews => self.monthly_views = sample,
        }
    }

    /// Metrics the aggregator could not compute this run
    pub fn missing(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|m| self.get(*m).is_unknown())
            .collect()
    }

    /// True when no metric at all was computed
    pub fn is_empty(&self) -> bool {
        self.missing().len() == Metric::ALL.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_lists_only_unknown_metrics() {
        let mut usage = ConsumptionVector::unknown();
        usage.set(Metric::Projects, MetricSample::Measured(3.0));
        usage.set(Metric::MonthlyViews, MetricSample::Measured(120.0));

        let missing = usage.missing();
        assert_eq!(missing.len(), 3);
        assert!(missing.contains(&Metric::Features));
        assert!(missing.contains(&Metric::TeamMembers));
        assert!(missing.contains(&Metric::StorageGb));
    }

    #[test]
    fn unknown_vector_is_empty() {
        assert!(ConsumptionVector::unknown().is_empty());
        let mut usage = ConsumptionVector::unknown();
        usage.set(Metric::Features, MetricSample::Measured(0.0));
        assert!(!usage.is_empty());
    }
}
