//! Rate control governor — admission control for the dispatcher.
//!
//! One accounting bucket per calendar day plus a minimum gap between
//! batches. The governor never sends anything; the dispatcher reports
//! committed sends back through [`RateGovernor::record_sent`].

use std::sync::Arc;

use memply_core::config::RateConfig;
use memply_core::error::Result;
use memply_core::traits::Clock;
use memply_core::types::RateControlState;
use memply_store::MemberStore;

/// Admission decision for one dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Denied { reason: DenialReason },
}

/// Why admission was refused. A denial is a structured outcome, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    QuotaExhausted,
    Cooldown { wait_minutes: i64 },
}

impl DenialReason {
    pub fn message(&self) -> String {
        match self {
            Self::QuotaExhausted => "Daily send quota exhausted".into(),
            Self::Cooldown { wait_minutes } => {
                format!("Batch cooldown active, retry in {wait_minutes} minute(s)")
            }
        }
    }
}

pub struct RateGovernor {
    store: Arc<MemberStore>,
    clock: Arc<dyn Clock>,
    limits: RateConfig,
}

impl RateGovernor {
    pub fn new(store: Arc<MemberStore>, clock: Arc<dyn Clock>, limits: RateConfig) -> Self {
        Self { store, clock, limits }
    }

    /// Today's accounting row (lazily created).
    pub fn state(&self) -> Result<RateControlState> {
        self.store.rate_state(self.clock.today(), &self.limits)
    }

    /// Admission rule: deny on exhausted quota, deny while the
    /// inter-batch cooldown is running (remaining minutes rounded up),
    /// otherwise allow with the remaining quota.
    pub fn check(&self) -> Result<Admission> {
        let state = self.state()?;

        if state.sent_today >= state.max_per_day {
            tracing::debug!("🚦 Admission denied: {} sent today", state.sent_today);
            return Ok(Admission::Denied { reason: DenialReason::QuotaExhausted });
        }

        if let Some(last_batch) = state.last_batch_time {
            let elapsed_secs = (self.clock.now() - last_batch).num_seconds();
            let required_secs = state.batch_delay_minutes * 60;
            if elapsed_secs < required_secs {
                let wait_minutes = ((required_secs - elapsed_secs) as u64).div_ceil(60) as i64;
                tracing::debug!("🚦 Admission denied: cooldown, {wait_minutes}m left");
                return Ok(Admission::Denied {
                    reason: DenialReason::Cooldown { wait_minutes },
                });
            }
        }

        Ok(Admission::Allowed { remaining: state.remaining() })
    }

    /// Commit `n` successful sends and stamp the batch time.
    pub fn record_sent(&self, n: u32) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        // First commit of a new day: make sure the row exists.
        self.state()?;
        self.store.record_sent(self.clock.today(), n, self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FixedClock;
    use chrono::{Duration, NaiveDate};

    fn setup(max_per_day: u32) -> (Arc<FixedClock>, RateGovernor) {
        let store = Arc::new(MemberStore::open_in_memory().unwrap());
        let clock = Arc::new(FixedClock::at_date(
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
        ));
        let limits = RateConfig { max_per_day, max_per_batch: 10, batch_delay_minutes: 5, send_delay_secs: 0 };
        let governor = RateGovernor::new(store, clock.clone(), limits);
        (clock, governor)
    }

    #[test]
    fn test_fresh_day_allows_full_quota() {
        let (_clock, governor) = setup(50);
        assert_eq!(governor.check().unwrap(), Admission::Allowed { remaining: 50 });
    }

    #[test]
    fn test_quota_exhaustion_denies() {
        let (clock, governor) = setup(5);
        governor.record_sent(5).unwrap();
        // Move past the cooldown so only the quota rule is in play.
        clock.advance(Duration::minutes(10));
        assert_eq!(
            governor.check().unwrap(),
            Admission::Denied { reason: DenialReason::QuotaExhausted }
        );
    }

    #[test]
    fn test_cooldown_reports_minutes_remaining_rounded_up() {
        let (clock, governor) = setup(50);
        governor.record_sent(1).unwrap();
        clock.advance(Duration::minutes(2));
        // 2 of 5 minutes elapsed → 3 minutes to wait.
        assert_eq!(
            governor.check().unwrap(),
            Admission::Denied { reason: DenialReason::Cooldown { wait_minutes: 3 } }
        );
    }

    #[test]
    fn test_cooldown_expires() {
        let (clock, governor) = setup(50);
        governor.record_sent(2).unwrap();
        clock.advance(Duration::minutes(5));
        assert_eq!(governor.check().unwrap(), Admission::Allowed { remaining: 48 });
    }

    #[test]
    fn test_new_day_resets_quota() {
        let (clock, governor) = setup(5);
        governor.record_sent(5).unwrap();
        clock.advance(Duration::days(1));
        assert_eq!(governor.check().unwrap(), Admission::Allowed { remaining: 5 });
    }

    #[test]
    fn test_record_sent_zero_is_a_noop() {
        let (_clock, governor) = setup(5);
        governor.record_sent(0).unwrap();
        // No batch time stamped, so no cooldown either.
        assert_eq!(governor.check().unwrap(), Admission::Allowed { remaining: 5 });
    }
}
