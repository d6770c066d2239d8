//! Crate-wide error type.
//!
//! Variants mirror the error kinds enumerated in the AI layer's error
//! handling design: a bad scheduled task, a failed auto-recovery, a
//! corrupted persistence file, and an observer veto. Per the propagation
//! policy, only [`Error::PersistenceCorrupted`] and the `Io` variant are
//! ever returned synchronously to a caller; the others are constructed at
//! a background boundary, logged, and never surfaced to the query thread.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A scheduled task panicked or returned an error; caught at the
    /// scheduler boundary so that one bad task cannot stop the scheduler.
    #[error("task '{task_name}' failed: {message}")]
    TaskException { task_name: String, message: String },

    /// The engine's `recover_to` entry point returned failure or raised an
    /// error. The affected table remains blocked.
    #[error("auto-recovery for table '{table_name}' failed: {message}")]
    RecoveryFailed { table_name: String, message: String },

    /// A loaded persistence file had the wrong header or an inconsistent
    /// arm count. The in-memory state is left untouched.
    #[error("persisted state at '{path}' is corrupted: {reason}")]
    PersistenceCorrupted { path: String, reason: String },

    /// An observer vetoed a DML operation. Surfaced to the engine as a
    /// `false` return from `notify_before`, not as this variant directly;
    /// kept here so the reason can be reported in a user-facing message.
    #[error("operation on '{table_name}' vetoed by {subsystem}: {reason}")]
    ObserverVeto {
        subsystem: String,
        table_name: String,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error represents a vetoed operation rather than an
    /// internal failure (useful for an embedding engine translating errors
    /// into user-facing messages).
    #[must_use]
    pub fn is_veto(&self) -> bool {
        matches!(self, Error::ObserverVeto { .. })
    }
}

/// Severity-tagged description used when logging background failures, so a
/// `SHOW AI STATUS` summary can surface the last few without re-deriving
/// formatting logic at every call site.
#[derive(Debug, Clone)]
pub struct LoggedError {
    pub error: String,
    pub occurred_at_us: u64,
}

impl fmt::Display for LoggedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.occurred_at_us, self.error)
    }
}
