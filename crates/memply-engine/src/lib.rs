//! # Memply Engine
//!
//! The membership lifecycle & reminder dispatch engine.
//!
//! ## Architecture
//! ```text
//! ReminderService (one run at a time, busy flag)
//!   ├── LifecycleEngine     — active → expired → suspended → inactive
//!   ├── RateGovernor        — daily quota + inter-batch cooldown gate
//!   ├── EligibilitySelector — who needs a reminder today
//!   ├── BatchDispatcher     — sub-batches, retry/backoff, pacing sleeps
//!   │     └── BlacklistManager — classify failures, permanent ratchet
//!   └── RunOutcome          — aggregate result for reporting
//! ```
//!
//! Delivery guarantees: at most one reminder attempt per recipient per
//! day, and eventual permanent suppression of undeliverable recipients.
//! Exactly-once delivery is explicitly not promised.

pub mod blacklist;
pub mod dispatcher;
pub mod governor;
pub mod lifecycle;
pub mod orchestrator;
pub mod selector;

pub use blacklist::{classify, BlacklistManager, FailureClass, PERMANENT_ERROR_THRESHOLD};
pub use dispatcher::{BatchDispatcher, DispatchDetail, DispatchReport, MAX_RETRIES};
pub use governor::{Admission, DenialReason, RateGovernor};
pub use lifecycle::{LifecycleEngine, LifecycleReport};
pub use orchestrator::{EngineStats, ReminderService, RunOutcome};
pub use selector::EligibilitySelector;

#[cfg(test)]
pub(crate) mod testutil;
