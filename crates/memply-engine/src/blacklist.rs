//! Blacklist manager — delivery-failure classification and the permanent
//! suppression ratchet.
//!
//! A recipient is suppressed either immediately (hard bounce class) or
//! after repeated transient failures. `is_permanent` only ever moves
//! false → true through this module.

use std::sync::Arc;

use memply_core::error::Result;
use memply_core::traits::Clock;
use memply_core::types::{BlacklistEntry, DeliveryErrorKind};
use memply_store::MemberStore;

/// Transient failures escalate to permanent at this attempt count.
pub const PERMANENT_ERROR_THRESHOLD: u32 = 3;

/// Ordered classification table: first matching substring wins.
/// Matching is case-insensitive over the raw transport diagnostic.
const CLASSIFICATION_TABLE: &[(&str, DeliveryErrorKind)] = &[
    ("invalid address", DeliveryErrorKind::InvalidAddress),
    ("unknown address", DeliveryErrorKind::InvalidAddress),
    ("address rejected", DeliveryErrorKind::InvalidAddress),
    ("no such user", DeliveryErrorKind::InvalidAddress),
    ("user unknown", DeliveryErrorKind::InvalidAddress),
    ("recipient not found", DeliveryErrorKind::InvalidAddress),
    ("5.1.1", DeliveryErrorKind::InvalidAddress),
    ("mailbox unavailable", DeliveryErrorKind::PermanentFailure),
    ("mailbox disabled", DeliveryErrorKind::PermanentFailure),
    ("domain not found", DeliveryErrorKind::PermanentFailure),
    ("host not found", DeliveryErrorKind::PermanentFailure),
    ("550", DeliveryErrorKind::PermanentFailure),
    ("551", DeliveryErrorKind::PermanentFailure),
    ("553", DeliveryErrorKind::PermanentFailure),
    ("554", DeliveryErrorKind::PermanentFailure),
    ("permanent", DeliveryErrorKind::PermanentFailure),
    ("bounce", DeliveryErrorKind::Bounce),
    ("spam", DeliveryErrorKind::SpamComplaint),
];

/// Classification result for one raw delivery error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Permanent(DeliveryErrorKind),
    Transient,
}

impl FailureClass {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// The kind stored on the blacklist row.
    pub fn kind(&self) -> DeliveryErrorKind {
        match self {
            Self::Permanent(kind) => *kind,
            Self::Transient => DeliveryErrorKind::TemporaryFailure,
        }
    }
}

/// Pure classification over the table — independent of any transport.
pub fn classify(raw_error: &str) -> FailureClass {
    let lower = raw_error.to_lowercase();
    for (pattern, kind) in CLASSIFICATION_TABLE {
        if lower.contains(pattern) {
            return FailureClass::Permanent(*kind);
        }
    }
    FailureClass::Transient
}

/// Failure bookkeeping over the store.
pub struct BlacklistManager {
    store: Arc<MemberStore>,
    clock: Arc<dyn Clock>,
}

impl BlacklistManager {
    pub fn new(store: Arc<MemberStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record a terminal delivery failure for `email`. Creates the entry
    /// on first failure; afterwards increments the attempt count and
    /// ratchets `is_permanent` when the class is permanent or the
    /// threshold is reached. Returns the entry as written.
    pub fn record_failure(&self, email: &str, raw_error: &str) -> Result<BlacklistEntry> {
        let class = classify(raw_error);
        let now = self.clock.now();

        let entry = match self.store.blacklist_entry(email)? {
            None => BlacklistEntry {
                email: email.to_string(),
                error_type: class.kind(),
                error_message: raw_error.to_string(),
                first_error_date: now,
                last_attempt_date: now,
                attempt_count: 1,
                is_permanent: class.is_permanent(),
            },
            Some(previous) => {
                let attempt_count = previous.attempt_count + 1;
                BlacklistEntry {
                    email: email.to_string(),
                    error_type: class.kind(),
                    error_message: raw_error.to_string(),
                    first_error_date: previous.first_error_date,
                    last_attempt_date: now,
                    attempt_count,
                    is_permanent: previous.is_permanent
                        || class.is_permanent()
                        || attempt_count >= PERMANENT_ERROR_THRESHOLD,
                }
            }
        };

        if entry.is_permanent {
            tracing::warn!(
                "⛔ {} permanently blacklisted after {} attempt(s): {}",
                email,
                entry.attempt_count,
                raw_error
            );
        }
        self.store.upsert_blacklist(&entry)?;
        Ok(entry)
    }

    /// Whether the engine must never contact this recipient again.
    pub fn is_blacklisted(&self, email: &str) -> Result<bool> {
        Ok(self
            .store
            .blacklist_entry(email)?
            .is_some_and(|e| e.is_permanent))
    }
}
