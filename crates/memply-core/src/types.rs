//! Persisted data model — the core entities the engine reads and writes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The `email_type` tag this engine stamps on reminder log entries.
pub const MEMBERSHIP_REMINDER: &str = "membership_reminder";

/// A recurring-billing membership account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Unique member ID.
    pub id: String,
    /// Display name, used in templates and candidate ordering.
    pub name: String,
    /// Contact address reminders are sent to.
    pub email: String,
    /// Current lifecycle status.
    pub status: MemberStatus,
    /// Plan label used in templates ("Gold", "Monthly", ...).
    pub membership_name: String,
    /// Plan renewal price in cents, used in templates.
    pub price_cents: i64,
    /// Date the current entitlement period ends.
    pub expiry_date: NaiveDate,
    /// Last recorded payment, if any.
    pub last_payment_date: Option<NaiveDate>,
    /// When the member left active standing. Set once, never overwritten
    /// while present.
    pub inactive_since: Option<NaiveDate>,
    /// Distinguishes automatic suspension from a manual one.
    pub auto_suspended: bool,
    pub created_at: DateTime<Utc>,
}

impl Member {
    /// Create a new active member.
    pub fn new(name: &str, email: &str, membership_name: &str, price_cents: i64, expiry_date: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            status: MemberStatus::Active,
            membership_name: membership_name.to_string(),
            price_cents,
            expiry_date,
            last_payment_date: None,
            inactive_since: None,
            auto_suspended: false,
            created_at: Utc::now(),
        }
    }

    /// Whole days until expiry, negative once past.
    pub fn days_until_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }
}

/// Member lifecycle status.
///
/// The state machine only ever walks forward
/// (active → expired → suspended → inactive); `Cancelled` is terminal and
/// reachable only through the explicit cancel operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Expired,
    Suspended,
    Inactive,
    Cancelled,
}

impl MemberStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Suspended => "suspended",
            Self::Inactive => "inactive",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation. Unknown strings map to `Inactive`
    /// so a corrupted row can never look entitled.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "expired" => Self::Expired,
            "suspended" => Self::Suspended,
            "cancelled" => Self::Cancelled,
            _ => Self::Inactive,
        }
    }
}

/// Classified delivery error categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    InvalidAddress,
    PermanentFailure,
    Bounce,
    SpamComplaint,
    TemporaryFailure,
}

impl DeliveryErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidAddress => "invalid_address",
            Self::PermanentFailure => "permanent_failure",
            Self::Bounce => "bounce",
            Self::SpamComplaint => "spam_complaint",
            Self::TemporaryFailure => "temporary_failure",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "invalid_address" => Self::InvalidAddress,
            "permanent_failure" => Self::PermanentFailure,
            "bounce" => Self::Bounce,
            "spam_complaint" => Self::SpamComplaint,
            _ => Self::TemporaryFailure,
        }
    }
}

/// Per-recipient failure history. Created on first delivery failure,
/// updated (never deleted) by the engine thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub email: String,
    pub error_type: DeliveryErrorKind,
    /// Last raw transport diagnostic.
    pub error_message: String,
    pub first_error_date: DateTime<Utc>,
    pub last_attempt_date: DateTime<Utc>,
    pub attempt_count: u32,
    /// One-way ratchet: the engine sets this true and never clears it.
    pub is_permanent: bool,
}

/// One row per calendar day of send accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateControlState {
    pub day: NaiveDate,
    pub max_per_day: u32,
    pub max_per_batch: u32,
    pub batch_delay_minutes: i64,
    /// Monotonically non-decreasing within the day; `<= max_per_day`
    /// after every update.
    pub sent_today: u32,
    pub last_batch_time: Option<DateTime<Utc>>,
}

impl RateControlState {
    pub fn remaining(&self) -> u32 {
        self.max_per_day.saturating_sub(self.sent_today)
    }
}

/// Outcome recorded for one reminder attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReminderOutcome {
    Sent,
    Failed,
}

impl ReminderOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            _ => Self::Failed,
        }
    }
}

/// Append-only audit record per attempt. Also the primary
/// "already reminded today" exclusion signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderLogEntry {
    pub member_id: String,
    pub email: String,
    pub email_type: String,
    pub outcome: ReminderOutcome,
    /// Error detail when the outcome is `Failed`.
    pub error: Option<String>,
    /// Calendar date the attempt was made on.
    pub sent_on: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A rendered message handed to the transport.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}
