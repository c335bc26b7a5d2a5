//! End-to-end scenarios
//!
//! Exercises the public `transact` surface the way an application would:
//! - points: registering handlers, live-set history, recovering after a failure
//! - stepped: step sources, the loop guard and TOML configuration
//! - values: TransactManager batches with vetoes and nested changes
//! - store: executor handlers backed by a TransactManager

mod common;

mod stepped;
mod store;
mod values;
