//! Transaction lifecycle states
//!
//! State transitions:
//! - `New` → any intermediate label (`Validated`, `Expanded`, `Performed`,
//!   or a handler-defined `Custom` label)
//! - any non-terminal state → `Closed` (success)
//! - any non-terminal state → `Failed` (error)
//!
//! Terminal states (no transitions allowed):
//! - `Closed`
//! - `Failed`

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a transaction in its lifecycle
///
/// Serializes as its lowercase label, so `"closed"` on the wire and in
/// snapshots. Labels that are not one of the built-in states round-trip
/// through `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionState {
    /// Created, handler not yet finished
    #[default]
    New,
    /// Inputs validated
    Validated,
    /// Action expanded into sub-actions
    Expanded,
    /// Work done, not yet closed
    Performed,
    /// Finished successfully
    Closed,
    /// Finished with an error
    Failed,
    /// Handler-defined intermediate label
    Custom(String),
}

/// The two terminal states
pub const END_STATES: [TransactionState; 2] = [TransactionState::Closed, TransactionState::Failed];

impl TransactionState {
    /// Is this a terminal state?
    pub fn is_end(&self) -> bool {
        matches!(self, TransactionState::Closed | TransactionState::Failed)
    }

    /// Label used in snapshots and logs
    pub fn as_str(&self) -> &str {
        match self {
            TransactionState::New => "new",
            TransactionState::Validated => "validated",
            TransactionState::Expanded => "expanded",
            TransactionState::Performed => "performed",
            TransactionState::Closed => "closed",
            TransactionState::Failed => "failed",
            TransactionState::Custom(label) => label,
        }
    }
}

impl From<&str> for TransactionState {
    fn from(label: &str) -> Self {
        match label {
            "new" => TransactionState::New,
            "validated" => TransactionState::Validated,
            "expanded" => TransactionState::Expanded,
            "performed" => TransactionState::Performed,
            "closed" => TransactionState::Closed,
            "failed" => TransactionState::Failed,
            other => TransactionState::Custom(other.to_string()),
        }
    }
}

impl From<String> for TransactionState {
    fn from(label: String) -> Self {
        TransactionState::from(label.as_str())
    }
}

impl From<TransactionState> for String {
    fn from(state: TransactionState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
