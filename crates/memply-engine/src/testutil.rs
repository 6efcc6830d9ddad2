//! Test fakes: a settable clock and a scripted transport.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use memply_core::error::{MemplyError, Result};
use memply_core::traits::{Clock, SendReceipt, Transport};
use memply_core::types::OutboundEmail;

/// Clock that only moves when the test says so.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Midday UTC on the given date, so day arithmetic never straddles
    /// midnight by accident.
    pub fn at_date(date: NaiveDate) -> Self {
        let noon = date.and_hms_opt(12, 0, 0).unwrap();
        Self::at(Utc.from_utc_datetime(&noon))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Transport whose per-recipient outcomes are scripted by the test.
/// Unscripted recipients always succeed.
pub struct ScriptedTransport {
    configured: bool,
    /// Recipient → error every attempt fails with.
    always_fail: Mutex<HashMap<String, String>>,
    /// Recipient → errors consumed one per attempt, then success.
    fail_queue: Mutex<HashMap<String, VecDeque<String>>>,
    /// Successful deliveries, in order.
    pub sent: Mutex<Vec<OutboundEmail>>,
    /// Attempt counts per recipient, including retries.
    pub attempts: Mutex<HashMap<String, u32>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            configured: true,
            always_fail: Mutex::new(HashMap::new()),
            fail_queue: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self { configured: false, ..Self::new() }
    }

    pub fn always_fail(&self, to: &str, error: &str) {
        self.always_fail.lock().unwrap().insert(to.into(), error.into());
    }

    pub fn fail_next(&self, to: &str, error: &str) {
        self.fail_queue
            .lock()
            .unwrap()
            .entry(to.into())
            .or_default()
            .push_back(error.into());
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|e| e.to.clone()).collect()
    }

    pub fn attempt_count(&self, to: &str) -> u32 {
        self.attempts.lock().unwrap().get(to).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt> {
        *self.attempts.lock().unwrap().entry(email.to.clone()).or_insert(0) += 1;

        if let Some(error) = self.always_fail.lock().unwrap().get(&email.to) {
            return Err(MemplyError::Transport(error.clone()));
        }
        if let Some(queue) = self.fail_queue.lock().unwrap().get_mut(&email.to) {
            if let Some(error) = queue.pop_front() {
                return Err(MemplyError::Transport(error));
            }
        }

        self.sent.lock().unwrap().push(email.clone());
        Ok(SendReceipt { message_id: Some(format!("msg-{}", email.to)) })
    }
}
