//! Value layer for transact
//!
//! This crate implements optimistic change management with:
//! - Change: inert record of one proposed mutation
//! - ChangeManager: derives each new managed value, validates, undoes
//! - TransactManager: speculative perform with cascading undo
//! - Settled feed: the managed value, published only when nothing is in flight
//!
//! ## Example
//!
//! ```text
//! let tm = TransactManager::new(MyArrayManager::default());
//! tm.perform(ChangeAction::Set, ChangeParams::keyed(0, 1))?;
//! assert_eq!(tm.managed_value(), vec![json!(1)]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod change_manager;
pub mod manager;

pub use change::{Change, ChangeAction, ChangeParams};
pub use change_manager::{ChangeManager, ChangeStatus, ChangeTransaction, ValueCell};
pub use manager::{LiveChanges, TransactManager};
