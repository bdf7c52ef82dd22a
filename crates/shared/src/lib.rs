// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ProdMap Shared Types
//!
//! Types used across the ProdMap workspace: strongly-typed IDs, the
//! subscription tier ordering, membership roles, and the read-only
//! subscription record owned by the external billing system.

pub mod types;

pub use types::{
    MemberRole, ReportId, Subscription, SubscriptionStatus, SubscriptionTier, TenantId,
    UnknownTier, UserId,
};
