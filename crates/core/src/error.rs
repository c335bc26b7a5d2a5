//! Error types for transact
//!
//! This module defines the single error enum used throughout the workspace.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Errors are `Clone` because a failed transaction keeps its error as part of
//! its record, and the same error is surfaced to whoever invoked the action.
//!
//! # Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Registration | `NoHandler`, `BadHandlerDefinition`, `RegistryClosed`, `ManagerClosed`, `AsyncDispatch` |
//! | State | `TransactionFailed`, `TransactionClosed` |
//! | Execution | `Handler`, `RunawaySteps`, `NotReady`, `Abandoned` |
//! | Value layer | `Rejected`, `UnsupportedAction` |
//! | System | `InvalidConfig`, `Io` |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result type alias for transact operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the action-execution core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    // ==================== Registration ====================
    /// No handler registered under the action name
    #[error("no handler for action {action}")]
    NoHandler {
        /// Action that was requested
        action: String,
    },

    /// Handler definition is missing its callable
    #[error("bad handler definition for {name}")]
    BadHandlerDefinition {
        /// Name the handler was registered under
        name: String,
    },

    /// The transaction set has been shut down
    #[error("attempt to change a closed registry")]
    RegistryClosed,

    /// The transact manager has been shut down
    #[error("attempt to change a closed transactionManager")]
    ManagerClosed,

    /// A synchronously driven transaction dispatched an action it could not await
    #[error("transaction {parent} cannot await async action {action}")]
    AsyncDispatch {
        /// Id of the dispatching transaction
        parent: u64,
        /// Deferred or stepped-async action that was requested
        action: String,
    },

    // ==================== State ====================
    /// Transaction was forced into the failed state without an error value
    #[error("transaction {id} ({action}) failed")]
    TransactionFailed {
        /// Transaction id
        id: u64,
        /// Action of the transaction
        action: String,
        /// Result recorded on the transaction when it failed
        result: Value,
    },

    /// Write attempted on a transaction that already reached an end-state
    #[error("transaction {id} is closed")]
    TransactionClosed {
        /// Transaction id
        id: u64,
    },

    // ==================== Execution ====================
    /// Error raised by handler code
    #[error("{message}")]
    Handler {
        /// Message supplied by the handler
        message: String,
    },

    /// Stepped handler did not finish within the step limit
    #[error("generator long loop (>{limit})")]
    RunawaySteps {
        /// Number of pulls allowed
        limit: usize,
    },

    /// A ready value was requested from an outcome that is still pending
    #[error("outcome is still pending")]
    NotReady,

    /// A pending outcome was dropped before its handler finished
    #[error("transaction {id} was dropped before it finished")]
    Abandoned {
        /// Transaction id
        id: u64,
    },

    // ==================== Value layer ====================
    /// A change was rejected by validation
    #[error("{reason}")]
    Rejected {
        /// Reason supplied by the validator
        reason: String,
    },

    /// The change manager cannot handle the action
    #[error("cannot handle action {action}")]
    UnsupportedAction {
        /// Action that was requested
        action: String,
    },

    // ==================== System ====================
    /// Configuration could not be parsed or is out of range
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// What was wrong
        reason: String,
    },

    /// I/O error while reading or writing configuration
    #[error("I/O error: {reason}")]
    Io {
        /// Underlying error message
        reason: String,
    },
}

impl Error {
    /// Create a handler error from a message
    pub fn handler(message: impl Into<String>) -> Self {
        Error::Handler {
            message: message.into(),
        }
    }

    /// Create a rejection error from a reason
    pub fn rejected(reason: impl Into<String>) -> Self {
        Error::Rejected {
            reason: reason.into(),
        }
    }

    /// Create an unsupported-action error
    pub fn unsupported(action: impl Into<String>) -> Self {
        Error::UnsupportedAction {
            action: action.into(),
        }
    }

    /// Is this a registration error (raised before any transaction exists)?
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            Error::NoHandler { .. }
                | Error::BadHandlerDefinition { .. }
                | Error::RegistryClosed
                | Error::ManagerClosed
                | Error::AsyncDispatch { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io {
            reason: e.to_string(),
        }
    }
}
