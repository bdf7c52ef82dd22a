//! Engine error taxonomy
//!
//! Propagation policy: errors local to one tenant or one recipient never
//! abort a batch sweep. Systemic failures (the store unreachable for every
//! tenant) surface from `evaluate_all` as an aggregate summary.

use prodmap_shared::TenantId;

use crate::metrics::Metric;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// A tier string outside the four fixed tiers. Production paths fail
    /// closed to the Free quotas instead of propagating this.
    #[error("unknown subscription tier: {raw}")]
    UnknownTier { raw: String },

    /// One or more metrics could not be computed, for a caller that requires
    /// a full vector. The sweep path instead degrades the missing metrics to
    /// unknown, never to ok or zero.
    #[error("could not compute metrics: {missing:?}")]
    PartialData { missing: Vec<Metric> },

    /// A single recipient send failed. Isolated per recipient; delivery to
    /// the remaining recipients continues.
    #[error("notification to {recipient} failed: {reason}")]
    Notification { recipient: String, reason: String },

    /// A whole-tenant evaluation failed before producing a consumption
    /// vector. Recorded as a failed outcome in the sweep result list.
    #[error("evaluation of tenant {tenant_id} failed: {reason}")]
    Scheduling { tenant_id: TenantId, reason: String },

    /// External data store failure
    #[error("store error: {0}")]
    Store(String),

    /// A collaborator is present but not configured. Must be loud and
    /// observable, never a silent no-op send path.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}
