//! # Transact Executor
//!
//! Action registry and multi-style execution engine.
//!
//! This crate provides:
//! - [`Handler`] - a normalized action definition with an optional error path
//! - [`Transaction`] - one execution context per invocation
//! - [`TransactionSet`] - the registry, pre/post hooks and live-set tracking
//!
//! ## Quick Start
//!
//! ```text
//! use transact_executor::{HandlerDef, Perform, TransactionSet};
//!
//! let set = TransactionSet::new();
//! set.add_handler("double", HandlerDef::callable(Perform::immediate(|_, params| {
//!     Ok(json!(params[0].as_i64().unwrap_or(0) * 2))
//! })))?;
//!
//! let value = set.do_action("double", vec![json!(21)])?.into_ready()?;
//! ```
//!
//! ## Execution Styles
//!
//! | Style | Constructor | `do_action` returns |
//! |-------|-------------|---------------------|
//! | Immediate | `Perform::immediate` | `Outcome::Ready` |
//! | Deferred | `Perform::deferred` | `Outcome::Pending` |
//! | Stepped | `Perform::stepped` | `Outcome::Ready` |
//! | Stepped async | `Perform::stepped_async` | `Outcome::Pending` |

#![warn(missing_docs)]

mod handler;
mod outcome;
mod step;
mod transaction;
mod transaction_set;

// Test modules
#[cfg(test)]
mod tests;

// =============================================================================
// Public API
// =============================================================================

pub use handler::{
    on_error, DeferredFn, ErrorFn, ExecutionStyle, Handler, HandlerDef, ImmediateFn, Perform,
    SteppedAsyncFn, SteppedFn,
};
pub use outcome::Outcome;
pub use step::{steps, IterSteps, Step, StepSource, StepStream};
pub use transaction::{Transaction, TransactionSnapshot};
pub use transaction_set::{LiveSet, TransactionSet, TransactionSetBuilder};

// Re-export the shared core so users don't need transact-core directly
pub use transact_core::{
    observer_fn, CoreConfig, Error, Observer, Result, Subscription, TransactionState, Value,
};
