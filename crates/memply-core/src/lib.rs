//! # Memply Core
//!
//! Shared foundation for the Memply membership engine: configuration,
//! the error type, the persisted data model, and the trait seams
//! (`Transport`, `Clock`) the engine is tested through.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::MemplyConfig;
pub use error::{MemplyError, Result};
pub use traits::{Clock, SendReceipt, SystemClock, Transport};
pub use types::{
    BlacklistEntry, DeliveryErrorKind, Member, MemberStatus, OutboundEmail, RateControlState,
    ReminderLogEntry, ReminderOutcome,
};
