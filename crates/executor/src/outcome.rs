//! Result of dispatching an action
//!
//! Immediate and stepped handlers finish before `do_action` returns and
//! yield `Outcome::Ready`. Deferred and stepped-async handlers yield
//! `Outcome::Pending`; awaiting it drives the handler and resolves to the
//! transaction's result, or to its failure.

use futures::future::BoxFuture;
use std::fmt;
use transact_core::{Error, Result, Value};

/// Value of a dispatched action, now or later
///
/// Dropping a `Pending` outcome without awaiting it fails its transaction
/// with `Error::Abandoned`.
#[must_use = "a pending outcome does nothing until awaited"]
pub enum Outcome {
    /// The transaction already finished with this result
    Ready(Value),
    /// The transaction finishes when this future is awaited
    Pending(BoxFuture<'static, Result<Value>>),
}

impl Outcome {
    /// Did the transaction already finish?
    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }

    /// Is there still work to await?
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }

    /// The result of a finished transaction.
    ///
    /// # Errors
    ///
    /// `Error::NotReady` for a pending outcome, whose transaction is then
    /// abandoned.
    pub fn into_ready(self) -> Result<Value> {
        match self {
            Outcome::Ready(value) => Ok(value),
            Outcome::Pending(_) => Err(Error::NotReady),
        }
    }

    /// Wait for the transaction to finish
    pub async fn resolve(self) -> Result<Value> {
        match self {
            Outcome::Ready(value) => Ok(value),
            Outcome::Pending(fut) => fut.await,
        }
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Ready(value)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Outcome::Pending(_) => f.write_str("Pending"),
        }
    }
}
