//! Notifier seam
//!
//! The engine is transport-agnostic: one send call per (intent, recipient)
//! with a per-attempt success/failure result. The worker plugs in a real
//! email transport; tests use a recording fake.

use async_trait::async_trait;

use crate::error::EngineResult;

/// Notification template identifiers
pub mod template {
    /// High-priority usage alert (red warning or overage)
    pub const USAGE_ALERT: &str = "usage-limit-alert";
    /// Renewal reminder at the 7/3/1 day offsets
    pub const BILLING_REMINDER: &str = "billing-renewal-reminder";
    /// Soft upgrade suggestion from the advisor
    pub const UPGRADE_SUGGESTION: &str = "upgrade-suggestion";
}

/// External notification transport.
///
/// An unconfigured notifier must be a loud, observable condition: callers
/// check `is_configured` at startup and log the state, and sends through an
/// unconfigured notifier fail with `EngineError::NotConfigured` instead of
/// silently succeeding.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        template_id: &str,
        params: serde_json::Value,
    ) -> EngineResult<()>;

    fn is_configured(&self) -> bool;
}

/// Resolves the recipients for a tenant's alerts: every member holding the
/// admin or owner role.
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    async fn admins_of(&self, tenant: prodmap_shared::TenantId) -> EngineResult<Vec<String>>;
}
