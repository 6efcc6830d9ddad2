//! Eligibility selector — who needs a reminder today.
//!
//! Called fresh on every run, no caching: the already-reminded-today
//! exclusion must see log entries written earlier in the same run.

use std::sync::Arc;

use memply_core::error::Result;
use memply_core::traits::Clock;
use memply_core::types::{Member, MEMBERSHIP_REMINDER};
use memply_store::MemberStore;

pub struct EligibilitySelector {
    store: Arc<MemberStore>,
    clock: Arc<dyn Clock>,
}

impl EligibilitySelector {
    pub fn new(store: Arc<MemberStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reminder candidates: active members expiring within the window,
    /// excluding permanently blacklisted addresses, members already
    /// reminded today, and addresses that do not even look like email.
    /// Ordered ascending by expiry then name, so the most urgent cases
    /// are attempted first under quota pressure.
    pub fn select(&self, window_days: i64) -> Result<Vec<Member>> {
        let today = self.clock.today();
        let candidates = self
            .store
            .eligible_members(today, window_days, MEMBERSHIP_REMINDER)?;

        let before = candidates.len();
        let candidates: Vec<Member> = candidates
            .into_iter()
            .filter(|m| is_valid_email(&m.email))
            .collect();
        if candidates.len() < before {
            tracing::debug!(
                "✂️ Dropped {} candidate(s) with malformed addresses",
                before - candidates.len()
            );
        }
        Ok(candidates)
    }
}

/// Minimal syntactic address check: one `@`, non-empty local part, a
/// dotted domain, no whitespace. Deliverability is the transport's
/// problem; this only rejects rows that could never be an address.
pub fn is_valid_email(address: &str) -> bool {
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty()
}
