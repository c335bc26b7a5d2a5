//! Core types for transact
//!
//! This crate defines the foundational types shared by the executor and
//! the value layer:
//! - Error: the single error enum and `Result` alias
//! - TransactionState: lifecycle states and end-state detection
//! - CoreConfig: TOML-backed configuration
//! - Subjects: `BehaviorSubject` / `Subject` publish-subscribe primitives

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod state;
pub mod subject;

pub use config::{CoreConfig, CONFIG_FILE_NAME, DEFAULT_STEP_LIMIT, DEFAULT_TRANSACT_PREFIX};
pub use error::{Error, Result};
pub use state::{TransactionState, END_STATES};
pub use subject::{observer_fn, BehaviorSubject, FnObserver, Observer, Subject, Subscription};

// Dynamic parameter / result values
pub use serde_json::Value;
