// Usage crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::too_many_arguments)] // Engine wiring takes one collaborator per seam
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ProdMap Usage Engine
//!
//! Tiered usage accounting and alerting for multi-tenant workspaces.
//!
//! ## Features
//!
//! - **Tier Catalog**: Static quota vectors for the four subscription tiers
//! - **Usage Aggregation**: Per-tenant consumption from concurrent counting queries
//! - **Threshold Classification**: ok / yellow / red / overage bands per metric
//! - **Alert Dispatch**: Deduplicated high-priority notifications to admins and owners
//! - **Upgrade Advisor**: Next-tier recommendations on sustained high usage
//! - **Billing Reminders**: Renewal notices at exactly 7, 3 and 1 days out
//! - **Usage Reports**: Immutable per-run records for history and audit
//!
//! The engine talks to its collaborators (data store, notifier, recipient
//! resolver, subscription records) through object-safe async traits; the
//! worker crate supplies the production implementations.

pub mod advisor;
pub mod aggregator;
pub mod classifier;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod reminder;
pub mod report;
pub mod tiers;


// Advisor
pub use advisor::{recommend, UpgradeRecommendation, UPGRADE_INTEREST_PCT};

// Aggregator
pub use aggregator::{
    collection, CountFilter, CountStore, StorageMeter, UnmeteredStorage, UsageAggregator,
    DEFAULT_QUERY_TIMEOUT, VIEW_WINDOW_DAYS,
};

// Classifier
pub use classifier::{
    classify, percentage_of_quota, Band, ClassificationReport, MetricClassification,
    OVERAGE_PCT, WARNING_RED_PCT, WARNING_YELLOW_PCT,
};

// Dispatcher
pub use dispatcher::{AlertDispatcher, AlertIntent, DispatchResult, FailedSend};

// Engine
pub use engine::{
    SweepCancellation, SweepSummary, TenantDirectory, TenantEvaluation, TenantOutcome,
    UsageEngine, DEFAULT_SWEEP_CONCURRENCY,
};

// Error
pub use error::{EngineError, EngineResult};

// Ledger
pub use ledger::{
    should_alert, AlertLedger, AlertState, InMemoryAlertLedger, DEFAULT_REPEAT_INTERVAL,
};

// Metrics
pub use metrics::{ConsumptionVector, Metric, MetricSample};

// Notify
pub use notify::{template, Notifier, RecipientResolver};

// Reminder
pub use reminder::{
    check_renewal, BillingReminderService, ReminderDecision, ReminderRunSummary, SkipReason,
    SubscriptionSource, REMINDER_OFFSETS_DAYS,
};

// Report
pub use report::{InMemoryReportSink, ReportSink, UsageReport};

// Tiers
pub use tiers::{quotas_for, resolve_tier, try_quotas_for, Limit, QuotaVector};
