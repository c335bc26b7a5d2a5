//! Transact - transactional action execution with optimistic undo
//!
//! Two layers share one error type, one state model and one configuration:
//!
//! - the executor: a [`TransactionSet`] registry resolves named actions to
//!   [`Handler`]s and drives each invocation as a [`Transaction`], publishing
//!   the set of in-flight transactions as it changes
//! - the value layer: a [`TransactManager`] runs [`Change`]s through a
//!   [`ChangeManager`] speculatively and undoes the tail of the batch when
//!   one of them fails
//!
//! # Quick Start
//!
//! ```ignore
//! use transact::{HandlerDef, Perform, TransactionSet};
//! use serde_json::json;
//!
//! let set = TransactionSet::new();
//! set.add_handler("greet", HandlerDef::callable(Perform::immediate(|_, params| {
//!     Ok(json!(format!("hello {}", params[0])))
//! })))?;
//!
//! let value = set.do_action("greet", vec![json!("world")])?.into_ready()?;
//! ```

pub use transact_executor::*;

pub use transact_concurrency::{
    Change, ChangeAction, ChangeManager, ChangeParams, ChangeStatus, ChangeTransaction,
    LiveChanges, TransactManager, ValueCell,
};
pub use transact_core::{BehaviorSubject, Subject, CONFIG_FILE_NAME, DEFAULT_STEP_LIMIT, END_STATES};
