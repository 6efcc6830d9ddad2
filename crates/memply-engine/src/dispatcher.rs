//! Batch dispatcher — sends reminders in bounded sub-batches with
//! per-message retry, pacing sleeps and a hard quota ceiling.
//!
//! Sends are strictly sequential. The inter-send delay and the
//! inter-batch cooldown are deliverability backpressure, not incidental
//! waits; removing them changes how receiving servers treat this sender.

use std::sync::Arc;
use std::time::Duration;

use memply_core::config::{RateConfig, ReminderConfig};
use memply_core::error::{MemplyError, Result};
use memply_core::traits::{Clock, SendReceipt, Transport};
use memply_core::types::{Member, OutboundEmail, ReminderLogEntry, ReminderOutcome, MEMBERSHIP_REMINDER};
use memply_store::MemberStore;

use crate::blacklist::{classify, BlacklistManager};
use crate::governor::RateGovernor;

/// Retries per message after the initial attempt, transient failures
/// only.
pub const MAX_RETRIES: u32 = 2;

/// Per-recipient outcome of one dispatch pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DispatchDetail {
    pub member_id: String,
    pub email: String,
    pub outcome: ReminderOutcome,
    pub error: Option<String>,
    /// Whether this failure left the recipient permanently suppressed.
    pub blacklisted: bool,
}

/// Aggregate result of one dispatch pass — the unit the orchestrator
/// reports upward.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DispatchReport {
    pub successful: u32,
    pub failed: u32,
    /// Candidates never attempted because the quota ceiling was hit.
    pub skipped: u32,
    /// Failures that ended in permanent suppression.
    pub blacklisted: u32,
    pub details: Vec<DispatchDetail>,
}

pub struct BatchDispatcher {
    store: Arc<MemberStore>,
    transport: Arc<dyn Transport>,
    blacklist: BlacklistManager,
    clock: Arc<dyn Clock>,
    reminder: ReminderConfig,
    rate: RateConfig,
}

impl BatchDispatcher {
    pub fn new(
        store: Arc<MemberStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        reminder: ReminderConfig,
        rate: RateConfig,
    ) -> Self {
        let blacklist = BlacklistManager::new(store.clone(), clock.clone());
        Self { store, transport, blacklist, clock, reminder, rate }
    }

    /// Send to the quota-gated candidate list. `remaining_quota` is a
    /// hard ceiling on successes, enforced before every individual send;
    /// committed sends are reported to the governor per sub-batch.
    pub async fn dispatch(
        &self,
        candidates: &[Member],
        remaining_quota: u32,
        governor: &RateGovernor,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        let batch_size = self.rate.max_per_batch.max(1) as usize;
        let mut successes: u32 = 0;
        let mut attempted: usize = 0;

        for (batch_idx, batch) in candidates.chunks(batch_size).enumerate() {
            if successes >= remaining_quota {
                break;
            }
            if batch_idx > 0 {
                let minutes = self.rate.batch_delay_minutes.max(0) as u64;
                tracing::info!("⏸️ Batch cooldown: {minutes}m before next sub-batch");
                tokio::time::sleep(Duration::from_secs(minutes * 60)).await;
            }

            let mut batch_successes: u32 = 0;
            let mut hit_ceiling = false;
            for (i, member) in batch.iter().enumerate() {
                if successes >= remaining_quota {
                    hit_ceiling = true;
                    break;
                }
                if i > 0 && self.rate.send_delay_secs > 0 {
                    tokio::time::sleep(Duration::from_secs(self.rate.send_delay_secs)).await;
                }

                attempted += 1;
                let email = self.render_reminder(member);
                match self.deliver_with_retry(&email).await {
                    Ok(_receipt) => {
                        self.log_outcome(member, ReminderOutcome::Sent, None)?;
                        successes += 1;
                        batch_successes += 1;
                        report.successful += 1;
                        report.details.push(DispatchDetail {
                            member_id: member.id.clone(),
                            email: member.email.clone(),
                            outcome: ReminderOutcome::Sent,
                            error: None,
                            blacklisted: false,
                        });
                    }
                    Err(raw_error) => {
                        let entry = self.blacklist.record_failure(&member.email, &raw_error)?;
                        self.log_outcome(member, ReminderOutcome::Failed, Some(&raw_error))?;
                        report.failed += 1;
                        if entry.is_permanent {
                            report.blacklisted += 1;
                        }
                        report.details.push(DispatchDetail {
                            member_id: member.id.clone(),
                            email: member.email.clone(),
                            outcome: ReminderOutcome::Failed,
                            error: Some(raw_error),
                            blacklisted: entry.is_permanent,
                        });
                    }
                }
            }

            governor.record_sent(batch_successes)?;
            if hit_ceiling {
                tracing::info!("🧢 Quota ceiling reached mid-batch, stopping dispatch");
                break;
            }
        }

        report.skipped = (candidates.len() - attempted) as u32;
        tracing::info!(
            "📮 Dispatch done: {} sent, {} failed, {} skipped, {} blacklisted",
            report.successful,
            report.failed,
            report.skipped,
            report.blacklisted
        );
        Ok(report)
    }

    fn render_reminder(&self, member: &Member) -> OutboundEmail {
        let vars = memply_mailer::reminder_vars(member, self.clock.today());
        OutboundEmail {
            to: member.email.clone(),
            subject: memply_mailer::render(&self.reminder.subject_template, &vars),
            body: memply_mailer::render(&self.reminder.body_template, &vars),
        }
    }

    /// One delivery with transient-only retry. Returns the raw error text
    /// of the terminal failure so the caller can classify and log it.
    async fn deliver_with_retry(
        &self,
        email: &OutboundEmail,
    ) -> std::result::Result<SendReceipt, String> {
        let mut retries: u32 = 0;
        loop {
            match self.transport.send(email).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) => {
                    let raw = match &e {
                        MemplyError::Transport(msg) => msg.clone(),
                        other => other.to_string(),
                    };
                    if classify(&raw).is_permanent() {
                        tracing::warn!("📛 Permanent failure for {}: {raw}", email.to);
                        return Err(raw);
                    }
                    if retries >= MAX_RETRIES {
                        tracing::warn!(
                            "⚠️ Giving up on {} after {MAX_RETRIES} retries: {raw}",
                            email.to
                        );
                        return Err(raw);
                    }
                    retries += 1;
                    let backoff = 2u64.pow(retries);
                    tracing::debug!("🔄 Retry {retries}/{MAX_RETRIES} for {} in {backoff}s", email.to);
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                }
            }
        }
    }

    fn log_outcome(
        &self,
        member: &Member,
        outcome: ReminderOutcome,
        error: Option<&str>,
    ) -> Result<()> {
        self.store.append_log(&ReminderLogEntry {
            member_id: member.id.clone(),
            email: member.email.clone(),
            email_type: MEMBERSHIP_REMINDER.into(),
            outcome,
            error: error.map(String::from),
            sent_on: self.clock.today(),
            created_at: self.clock.now(),
        })
    }
}
