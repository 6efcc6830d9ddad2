//! Trait seams the engine is wired and tested through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::OutboundEmail;

/// Receipt returned by a successful delivery.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Transport-assigned message ID, when one is available.
    pub message_id: Option<String>,
}

/// Outbound message transport.
///
/// Implementations must surface delivery failures as
/// `MemplyError::Transport` carrying the raw diagnostic — the blacklist
/// manager classifies on that text.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the transport has enough configuration to attempt a send.
    fn is_configured(&self) -> bool;

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt>;
}

/// Injectable clock so time-dependent logic can be tested without real
/// delays.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Today's UTC calendar date.
    fn today(&self) -> chrono::NaiveDate {
        self.now().date_naive()
    }
}

/// Wall-clock implementation used in production.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
