//! TransactManager: optimistic perform with cascading undo
//!
//! Every `perform` runs its change speculatively through the
//! [`ChangeManager`]. If it fails, every change performed since (and
//! including) the failing one is undone, most recent first, so the managed
//! value returns to what it was immediately before the failing call.
//!
//! ## Perform Sequence
//!
//! ```text
//! 1. Allocate id, wrap the change in a ChangeTransaction
//! 2. Add to live set (one emission) and to the batch journal
//! 3. ChangeManager::perform()
//! 4. IF ok:  remove from live set (one emission), return the transaction
//! 5. IF err: undo batch entries with id >= failing id, newest first;
//!            drop them from live set (one emission); return the error
//! ```
//!
//! The batch journal holds every transaction performed since the live set
//! was last empty, so a nested change that already completed can still be
//! undone while its ancestor is in flight.
//!
//! The settled feed emits the managed value each time the live set returns
//! to empty, skipping values equal to the previous emission. It does not
//! replay on subscribe.

use crate::change::{Change, ChangeAction, ChangeParams};
use crate::change_manager::{ChangeManager, ChangeTransaction};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use transact_core::{BehaviorSubject, CoreConfig, Error, Observer, Result, Subject, Subscription};

/// Snapshot of the change transactions currently in flight
pub type LiveChanges<V> = Arc<Vec<ChangeTransaction<V>>>;

/// Drives a [`ChangeManager`] and undoes failed batches
pub struct TransactManager<M: ChangeManager> {
    manager: M,
    config: CoreConfig,
    live: BehaviorSubject<LiveChanges<M::Value>>,
    /// Transactions performed since the live set was last empty
    batch: Mutex<Vec<ChangeTransaction<M::Value>>>,
    settled: Subject<M::Value>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<M: ChangeManager> TransactManager<M> {
    /// Manager over `manager` with the default configuration
    pub fn new(manager: M) -> Self {
        Self::with_config(manager, CoreConfig::default())
    }

    /// Manager over `manager` with `config`
    pub fn with_config(manager: M, config: CoreConfig) -> Self {
        Self {
            manager,
            config,
            live: BehaviorSubject::new(Arc::new(Vec::new())),
            batch: Mutex::new(Vec::new()),
            settled: Subject::distinct(),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// The driven change manager
    pub fn change_manager(&self) -> &M {
        &self.manager
    }

    /// Current managed value
    pub fn managed_value(&self) -> M::Value {
        self.manager.value()
    }

    /// Allocate the next transaction id
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Perform one change.
    ///
    /// # Errors
    ///
    /// - `Error::ManagerClosed` after `close`
    /// - whatever the change manager returned; the batch has been undone
    pub fn perform(
        &self,
        action: impl Into<ChangeAction>,
        params: ChangeParams,
    ) -> Result<ChangeTransaction<M::Value>> {
        if self.is_closed() {
            return Err(Error::ManagerClosed);
        }

        let trans = ChangeTransaction::new(self.next_id(), Change::new(action, params));
        debug!(
            target: "transact::manager",
            id = trans.id(),
            action = %trans.change().action,
            "perform"
        );

        self.live.update(|set| {
            let mut next = set.as_ref().clone();
            next.push(trans.clone());
            Some(Arc::new(next))
        });
        self.batch.lock().push(trans.clone());

        match self.manager.perform(&trans, self) {
            Ok(()) => {
                self.retire(std::slice::from_ref(&trans));
                Ok(trans)
            }
            Err(err) => {
                self.cascade(&trans, &err);
                Err(err)
            }
        }
    }

    /// Undo every journaled transaction at or after `failing`, newest first
    fn cascade(&self, failing: &ChangeTransaction<M::Value>, err: &Error) {
        let mut doomed = {
            let mut batch = self.batch.lock();
            let (doomed, keep): (Vec<_>, Vec<_>) =
                batch.drain(..).partition(|t| t.id() >= failing.id());
            *batch = keep;
            doomed
        };
        doomed.sort_by(|a, b| b.id().cmp(&a.id()));

        warn!(
            target: "transact::manager",
            id = failing.id(),
            undone = ?doomed.iter().map(|t| t.id()).collect::<Vec<_>>(),
            error = %err,
            "undoing batch"
        );

        for trans in &doomed {
            self.manager.undo(trans);
            if trans == failing {
                trans.fail(err.clone());
            } else {
                trans.complete();
            }
        }
        self.retire(&doomed);
    }

    /// Drop `done` from the live set; settle if it empties
    fn retire(&self, done: &[ChangeTransaction<M::Value>]) {
        let mut emptied = false;
        self.live.update(|set| {
            let next: Vec<_> = set.iter().filter(|t| !done.contains(t)).cloned().collect();
            emptied = next.is_empty();
            Some(Arc::new(next))
        });
        if self.config.trace_snapshots {
            trace!(target: "transact::manager", live = self.live.value().len(), "snapshot");
        }
        if emptied {
            self.batch.lock().clear();
            if self.settled.next(self.manager.value()) {
                debug!(target: "transact::manager", "value settled");
            }
        }
    }

    // ========================================================================
    // Observation & lifecycle
    // ========================================================================

    /// Current live-set snapshot
    pub fn live(&self) -> LiveChanges<M::Value> {
        self.live.value()
    }

    /// Observe live-set snapshots; the current one is delivered immediately
    pub fn subscribe_live(
        &self,
        observer: impl Observer<LiveChanges<M::Value>> + 'static,
    ) -> Subscription {
        self.live.subscribe(observer)
    }

    /// Handle to the settled-value feed
    pub fn settled(&self) -> Subject<M::Value> {
        self.settled.clone()
    }

    /// Observe settled values
    pub fn subscribe_settled(&self, observer: impl Observer<M::Value> + 'static) -> Subscription {
        self.settled.subscribe(observer)
    }

    /// Shut down; completes both feeds
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(target: "transact::manager", "transact manager closed");
            self.live.complete();
            self.settled.complete();
        }
    }

    /// Has `close` been called?
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<M: ChangeManager> fmt::Debug for TransactManager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactManager")
            .field("live", &self.live.value().len())
            .field("batch", &self.batch.lock().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
