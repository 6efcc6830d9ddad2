//! Memply error type — one enum for the whole engine.

use thiserror::Error;

/// Convenience result alias used across all Memply crates.
pub type Result<T> = std::result::Result<T, MemplyError>;

/// All errors the engine can produce.
#[derive(Debug, Error)]
pub enum MemplyError {
    /// Configuration file missing a required value or unparseable.
    #[error("Config error: {0}")]
    Config(String),

    /// SQLite store failure (open, migrate, query).
    #[error("Store error: {0}")]
    Store(String),

    /// Outbound delivery failure. Carries the raw transport diagnostic so
    /// the blacklist manager can classify it.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemplyError {
    /// The raw diagnostic for delivery failures, empty otherwise.
    pub fn transport_detail(&self) -> &str {
        match self {
            Self::Transport(msg) => msg,
            _ => "",
        }
    }
}
