//! Lifecycle state machine — re-evaluates every member's status against
//! the configured day-thresholds.
//!
//! Transitions are applied in fixed order, each a one-way walk forward.
//! The store queries match only rows not yet at the target status, so
//! re-running with no time passing is a no-op. "Overdue" means one thing
//! everywhere: `expiry_date < today - grace_period_days`.

use chrono::Duration;
use std::sync::Arc;

use memply_core::config::LifecycleConfig;
use memply_core::error::Result;
use memply_core::traits::Clock;
use memply_store::MemberStore;

/// Row counts per transition for one state-machine pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LifecycleReport {
    /// active → expired
    pub expired: usize,
    /// expired → suspended
    pub suspended: usize,
    /// {suspended, expired} → inactive
    pub deactivated: usize,
}

impl LifecycleReport {
    pub fn total(&self) -> usize {
        self.expired + self.suspended + self.deactivated
    }
}

/// Runs the status transitions. Must complete before eligibility
/// selection so "active" means currently entitled.
pub struct LifecycleEngine {
    store: Arc<MemberStore>,
    clock: Arc<dyn Clock>,
}

impl LifecycleEngine {
    pub fn new(store: Arc<MemberStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// One full pass, in fixed order: expire, then auto-suspend, then
    /// deactivate.
    pub fn run(&self, config: &LifecycleConfig) -> Result<LifecycleReport> {
        let today = self.clock.today();

        let expired = self
            .store
            .mark_expired(today - Duration::days(config.grace_period_days))?;
        let suspended = self.store.auto_suspend(
            today - Duration::days(config.auto_suspend_days),
            config.auto_suspend_days,
        )?;
        let deactivated = self
            .store
            .mark_inactive(today - Duration::days(config.auto_inactive_days), today)?;

        let report = LifecycleReport { expired, suspended, deactivated };
        if report.total() > 0 {
            tracing::info!(
                "🔁 Lifecycle pass: {} expired, {} suspended, {} deactivated",
                report.expired,
                report.suspended,
                report.deactivated
            );
        }
        Ok(report)
    }
}
