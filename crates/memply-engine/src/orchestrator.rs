//! Process orchestrator — the one entry point that runs the whole
//! engine pass and serializes runs.
//!
//! A long-lived service object with injected collaborators; no globals.
//! Runs never overlap: a second caller gets a "busy" outcome instead of
//! queueing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memply_core::config::MemplyConfig;
use memply_core::error::Result;
use memply_core::traits::{Clock, Transport};
use memply_core::types::RateControlState;
use memply_store::MemberStore;

use crate::dispatcher::{BatchDispatcher, DispatchDetail};
use crate::governor::{Admission, RateGovernor};
use crate::lifecycle::LifecycleEngine;
use crate::selector::EligibilitySelector;

/// What one run accomplished, for reporting upward.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunOutcome {
    /// Whether any reminder went out.
    pub sent: bool,
    /// Number of reminders delivered.
    pub count: u32,
    /// Human-readable summary (send counts, denial reason, ...).
    pub message: String,
    /// Per-recipient detail when dispatch ran.
    pub details: Option<Vec<DispatchDetail>>,
}

impl RunOutcome {
    fn quiet(message: impl Into<String>) -> Self {
        Self { sent: false, count: 0, message: message.into(), details: None }
    }
}

/// Stats snapshot for dashboards and the CLI.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    pub todays_sent: u32,
    pub blacklisted_count: u32,
    /// Candidates a run started now would consider.
    pub pending_count: u32,
    pub rate_state: RateControlState,
}

pub struct ReminderService {
    store: Arc<MemberStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: MemplyConfig,
    busy: AtomicBool,
}

impl ReminderService {
    pub fn new(
        store: Arc<MemberStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: MemplyConfig,
    ) -> Self {
        Self { store, transport, clock, config, busy: AtomicBool::new(false) }
    }

    /// One full engine pass. Returns immediately with a busy outcome if
    /// another pass is in flight. The busy flag is released on every
    /// exit path, including store failures.
    pub async fn run_once(&self) -> RunOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            tracing::warn!("⏳ Run requested while another run is in flight");
            return RunOutcome::quiet("Busy: a run is already in progress");
        }

        let outcome = match self.run_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Partial progress (log entries, blacklist rows) stays
                // committed; only the summary degrades.
                tracing::error!("💥 Run failed: {e}");
                RunOutcome::quiet("Run failed: internal error")
            }
        };
        self.busy.store(false, Ordering::Release);
        outcome
    }

    async fn run_inner(&self) -> Result<RunOutcome> {
        if !self.transport.is_configured() {
            tracing::warn!("✉️ Transport not configured, skipping run");
            return Ok(RunOutcome::quiet("Transport not configured"));
        }

        // Lifecycle first, so "active" below means currently entitled.
        let lifecycle = LifecycleEngine::new(self.store.clone(), self.clock.clone())
            .run(&self.config.lifecycle)?;

        let governor =
            RateGovernor::new(self.store.clone(), self.clock.clone(), self.config.rate.clone());
        let remaining = match governor.check()? {
            Admission::Denied { reason } => {
                return Ok(RunOutcome::quiet(reason.message()));
            }
            Admission::Allowed { remaining } => remaining,
        };

        let candidates = EligibilitySelector::new(self.store.clone(), self.clock.clone())
            .select(self.config.reminder.window_days)?;
        if candidates.is_empty() {
            return Ok(RunOutcome::quiet("No reminders due"));
        }
        tracing::info!(
            "📋 {} candidate(s), quota {} remaining ({} lifecycle transition(s) this pass)",
            candidates.len(),
            remaining,
            lifecycle.total()
        );

        let dispatcher = BatchDispatcher::new(
            self.store.clone(),
            self.transport.clone(),
            self.clock.clone(),
            self.config.reminder.clone(),
            self.config.rate.clone(),
        );
        let report = dispatcher.dispatch(&candidates, remaining, &governor).await?;

        Ok(RunOutcome {
            sent: report.successful > 0,
            count: report.successful,
            message: format!(
                "Sent {} reminder(s), {} failed, {} skipped",
                report.successful, report.failed, report.skipped
            ),
            details: Some(report.details),
        })
    }

    /// Stats snapshot: today's accounting, suppression count, and how
    /// many candidates a run right now would consider.
    pub fn stats(&self) -> Result<EngineStats> {
        let rate_state = self.store.rate_state(self.clock.today(), &self.config.rate)?;
        let pending = EligibilitySelector::new(self.store.clone(), self.clock.clone())
            .select(self.config.reminder.window_days)?;
        Ok(EngineStats {
            todays_sent: rate_state.sent_today,
            blacklisted_count: self.store.blacklisted_count()?,
            pending_count: pending.len() as u32,
            rate_state,
        })
    }
}
