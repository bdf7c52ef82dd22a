//! Common types used across ProdMap

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Tenant (organization/account) ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct TenantId(pub Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// User ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Usage report ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ReportId(pub Uuid);

impl ReportId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ReportId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Raised when a tier string stored outside the engine does not name one of
/// the four fixed tiers.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown subscription tier: {raw}")]
pub struct UnknownTier {
    pub raw: String,
}

/// Subscription tier for quota lookup and billing
///
/// The ordering is total and fixed: free < starter < professional < enterprise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Starter,
    Professional,
    Enterprise,
}

impl Default for SubscriptionTier {
    fn default() -> Self {
        Self::Free
    }
}

impl SubscriptionTier {
    pub const ALL: [SubscriptionTier; 4] = [
        Self::Free,
        Self::Starter,
        Self::Professional,
        Self::Enterprise,
    ];

    /// The tier immediately above this one.
    ///
    /// Idempotent at the ceiling: `Enterprise.next() == Enterprise`.
    pub fn next(&self) -> Self {
        match self {
            Self::Free => Self::Starter,
            Self::Starter => Self::Professional,
            Self::Professional => Self::Enterprise,
            Self::Enterprise => Self::Enterprise,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }

    /// Parse a tier string as stored by the billing system.
    ///
    /// Callers on production paths must fail closed to `Free` on error rather
    /// than propagate; an unknown tier must never grant unlimited access.
    pub fn parse(raw: &str) -> Result<Self, UnknownTier> {
        match raw {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(UnknownTier {
                raw: raw.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a user within a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Editor,
    Viewer,
}

impl MemberRole {
    /// Whether members with this role receive usage and billing alerts
    pub fn receives_alerts(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

/// Subscription status as reported by the external billing system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
}

// =============================================================================
// Subscription record
// =============================================================================

/// Read-only view of a tenant's subscription.
///
/// Owned by the external billing collaborator; the engine never writes it.
/// `tier` is kept as the raw stored string so the engine can fail closed on
/// values the catalog does not recognize.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub tenant_id: TenantId,
    pub tier: String,
    pub status: SubscriptionStatus,
    pub renewal_date: Option<OffsetDateTime>,
    pub billing_amount_cents: i64,
    pub currency: String,
}
