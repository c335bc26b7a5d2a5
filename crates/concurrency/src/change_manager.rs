//! ChangeManager contract and change transactions
//!
//! A [`ChangeManager`] owns one managed value (inside a [`ValueCell`]) and
//! knows how to derive the next value from a [`Change`]. It is driven by a
//! [`TransactManager`], which wraps every change in a [`ChangeTransaction`].
//!
//! ## Perform sequence
//!
//! ```text
//! 1. before_execute()  - validate / prepare; may issue nested performs
//! 2. IF closed: stop   - before_execute completed the transaction silently
//! 3. execute()         - replace the managed value
//! 4. IF still open: after_execute(), then complete()
//! ```
//!
//! Any error along the way marks the transaction errored (unless it is
//! already closed) and is returned to the manager, which undoes the batch.

use crate::change::Change;
use crate::manager::TransactManager;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use transact_core::{Error, Result};

// ============================================================================
// ValueCell
// ============================================================================

/// Holder for a managed value; each write replaces the value wholesale
#[derive(Debug, Default)]
pub struct ValueCell<V> {
    value: RwLock<V>,
}

impl<V: Clone> ValueCell<V> {
    /// Cell holding `value`
    pub fn new(value: V) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Copy of the current value
    pub fn get(&self) -> V {
        self.value.read().clone()
    }

    /// Replace the value, returning the previous one
    pub fn set(&self, value: V) -> V {
        std::mem::replace(&mut *self.value.write(), value)
    }

    /// Inspect the value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        f(&*self.value.read())
    }
}

// ============================================================================
// ChangeTransaction
// ============================================================================

/// Lifecycle of a change transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeStatus {
    /// Still running
    Open,
    /// Finished successfully
    Complete,
    /// Finished with an error
    Errored,
}

impl ChangeStatus {
    /// Is this a terminal status?
    pub fn is_closed(self) -> bool {
        !matches!(self, ChangeStatus::Open)
    }
}

struct Status {
    status: ChangeStatus,
    error: Option<Error>,
}

struct TxInner<V> {
    id: u64,
    change: Mutex<Change<V>>,
    status: Mutex<Status>,
}

/// Handle to one change driven through a [`TransactManager`]
pub struct ChangeTransaction<V> {
    inner: Arc<TxInner<V>>,
}

impl<V> Clone for ChangeTransaction<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone> ChangeTransaction<V> {
    /// Open transaction for `change`
    pub fn new(id: u64, change: Change<V>) -> Self {
        Self {
            inner: Arc::new(TxInner {
                id,
                change: Mutex::new(change),
                status: Mutex::new(Status {
                    status: ChangeStatus::Open,
                    error: None,
                }),
            }),
        }
    }

    /// Id assigned by the manager
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Copy of the change
    pub fn change(&self) -> Change<V> {
        self.inner.change.lock().clone()
    }

    /// Edit the change in place
    pub fn update_change<R>(&self, f: impl FnOnce(&mut Change<V>) -> R) -> R {
        f(&mut *self.inner.change.lock())
    }

    /// Record the value the change replaced
    pub fn set_before(&self, before: V) {
        self.inner.change.lock().before = Some(before);
    }

    /// Value the change replaced, if it was executed
    pub fn before(&self) -> Option<V> {
        self.inner.change.lock().before.clone()
    }

    /// Current status
    pub fn status(&self) -> ChangeStatus {
        self.inner.status.lock().status
    }

    /// Complete or errored?
    pub fn is_closed(&self) -> bool {
        self.status().is_closed()
    }

    /// Error attached when the transaction failed
    pub fn error(&self) -> Option<Error> {
        self.inner.status.lock().error.clone()
    }

    /// Close successfully. Returns `false` if already closed.
    pub fn complete(&self) -> bool {
        let mut status = self.inner.status.lock();
        if status.status.is_closed() {
            return false;
        }
        status.status = ChangeStatus::Complete;
        true
    }

    /// Close with `err`. Returns `false` if already closed.
    pub fn fail(&self, err: Error) -> bool {
        let mut status = self.inner.status.lock();
        if status.status.is_closed() {
            return false;
        }
        status.status = ChangeStatus::Errored;
        status.error = Some(err);
        true
    }
}

impl<V> PartialEq for ChangeTransaction<V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<V> Eq for ChangeTransaction<V> {}

impl<V: fmt::Debug> fmt::Debug for ChangeTransaction<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTransaction")
            .field("id", &self.inner.id)
            .field("change", &*self.inner.change.lock())
            .field("status", &self.inner.status.lock().status)
            .finish()
    }
}

// ============================================================================
// ChangeManager
// ============================================================================

/// Derives a new managed value from each change
///
/// Methods take `&self`: the managed value lives in a [`ValueCell`], so a
/// `before_execute` that issues nested performs through the manager does
/// not conflict with the outer call.
pub trait ChangeManager: Send + Sync + Sized + 'static {
    /// The managed value
    type Value: Clone + PartialEq + Send + Sync + 'static;

    /// Cell holding the managed value
    fn cell(&self) -> &ValueCell<Self::Value>;

    /// Copy of the managed value
    fn value(&self) -> Self::Value {
        self.cell().get()
    }

    /// Validate or prepare a change.
    ///
    /// Returning `Err` rejects the change. Completing the transaction skips
    /// `execute` without an error. Nested performs go through `manager`.
    fn before_execute(
        &self,
        _trans: &ChangeTransaction<Self::Value>,
        _manager: &TransactManager<Self>,
    ) -> Result<()> {
        Ok(())
    }

    /// Replace the managed value according to the change.
    ///
    /// Implementations record the replaced value with `set_before`.
    fn execute(&self, trans: &ChangeTransaction<Self::Value>) -> Result<()>;

    /// Post-validation; `Err` aborts the change
    fn after_execute(&self, _trans: &ChangeTransaction<Self::Value>) -> Result<()> {
        Ok(())
    }

    /// Restore the value the change replaced
    fn undo(&self, trans: &ChangeTransaction<Self::Value>);

    /// Drive one change through before / execute / after.
    ///
    /// On error the transaction is marked errored (unless already closed)
    /// and the error is returned.
    fn perform(
        &self,
        trans: &ChangeTransaction<Self::Value>,
        manager: &TransactManager<Self>,
    ) -> Result<()> {
        let outcome = run_phases(self, trans, manager);
        if let Err(err) = &outcome {
            trans.fail(err.clone());
        }
        outcome
    }
}

fn run_phases<M: ChangeManager>(
    cm: &M,
    trans: &ChangeTransaction<M::Value>,
    manager: &TransactManager<M>,
) -> Result<()> {
    cm.before_execute(trans, manager)?;
    if trans.is_closed() {
        return Ok(());
    }
    cm.execute(trans)?;
    if !trans.is_closed() {
        cm.after_execute(trans)?;
        trans.complete();
    }
    Ok(())
}
