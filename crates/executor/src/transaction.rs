//! Transaction: one execution context per action invocation
//!
//! A `Transaction` is a cheap, cloneable handle. The owning
//! [`TransactionSet`] tracks it in the live set while it runs; once it
//! reaches an end-state it is dropped from the set and remains only as a
//! record held by whoever captured a handle.
//!
//! ## State machine
//!
//! ```text
//! New ──> Validated | Expanded | Performed | Custom(..) ──> Closed | Failed
//! ```
//!
//! Transitions that do not change the state are silent. Every real change
//! notifies the owning set, which republishes the live set and, on an
//! end-state, runs the post chain.
//!
//! ## Review window
//!
//! Post hooks run inside a review window. Within it an ended transaction may
//! still be overruled (closed → failed) and have its result, params and meta
//! adjusted. Outside it, writes to an ended transaction return
//! `Error::TransactionClosed`.
//!
//! ## Execution styles
//!
//! `perform` branches once on the handler's [`Perform`] variant:
//!
//! | Style | Behaviour |
//! |-------|-----------|
//! | Immediate | call, assign result, close |
//! | Deferred | return a pending outcome that awaits the body |
//! | Stepped | pull steps up to the step limit |
//! | SteppedAsync | same, awaiting each step |
//!
//! Errors go to `handle_error`: an error continuation may recover the
//! transaction, otherwise it is failed. Nothing is raised at this layer.

use crate::handler::{ExecutionStyle, Handler, Perform};
use crate::outcome::Outcome;
use crate::step::{Step, StepSource, StepStream};
use crate::transaction_set::{Shared, TransactionSet};
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};
use transact_core::{Error, Result, TransactionState, Value, DEFAULT_STEP_LIMIT};

/// Mutable part of a transaction
#[derive(Debug, Default)]
struct Record {
    state: TransactionState,
    params: Vec<Value>,
    result: Value,
    error: Option<Error>,
    meta: Vec<(String, Value)>,
    handled: bool,
    reviewing: bool,
    driver: Option<ExecutionStyle>,
}

impl Record {
    /// Ended and outside the review window
    fn sealed(&self) -> bool {
        self.state.is_end() && !self.reviewing
    }
}

struct Inner {
    id: u64,
    parent_id: Option<u64>,
    action: String,
    step_limit: usize,
    record: Mutex<Record>,
    owner: Weak<Shared>,
}

/// Fails its transaction with `Error::Abandoned` if dropped before the
/// transaction ended.
struct PendingGuard(Transaction);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let trans = &self.0;
        if trans.is_ended() {
            return;
        }
        warn!(
            target: "transact::txn",
            id = trans.inner.id,
            action = %trans.inner.action,
            "pending outcome dropped before the transaction ended"
        );
        trans.force_fail(Error::Abandoned { id: trans.inner.id });
    }
}

/// Handle to a single action invocation
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<Inner>,
}

impl Transaction {
    pub(crate) fn new(
        owner: &Arc<Shared>,
        id: u64,
        parent_id: Option<u64>,
        action: String,
        params: Vec<Value>,
        step_limit: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                parent_id,
                action,
                step_limit,
                record: Mutex::new(Record {
                    params,
                    ..Record::default()
                }),
                owner: Arc::downgrade(owner),
            }),
        }
    }

    /// Transaction with no owning set.
    ///
    /// Useful for driving a handler directly; state changes notify nobody
    /// and `dispatch` fails with `Error::RegistryClosed`.
    pub fn detached(id: u64, action: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                parent_id: None,
                action: action.into(),
                step_limit: DEFAULT_STEP_LIMIT,
                record: Mutex::new(Record {
                    params,
                    ..Record::default()
                }),
                owner: Weak::new(),
            }),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Unique, increasing id assigned by the owning set
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Id of the transaction this one was dispatched from
    pub fn parent_id(&self) -> Option<u64> {
        self.inner.parent_id
    }

    /// Action name
    pub fn action(&self) -> &str {
        &self.inner.action
    }

    /// Copy of the current params
    pub fn params(&self) -> Vec<Value> {
        self.inner.record.lock().params.clone()
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.inner.record.lock().state.clone()
    }

    /// Last value produced (`Value::Null` if none)
    pub fn result(&self) -> Value {
        self.inner.record.lock().result.clone()
    }

    /// Error recorded when the transaction failed
    pub fn error(&self) -> Option<Error> {
        self.inner.record.lock().error.clone()
    }

    /// Scratch note stored under `key`
    pub fn meta(&self, key: &str) -> Option<Value> {
        self.inner
            .record
            .lock()
            .meta
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// All scratch notes in insertion order
    pub fn meta_entries(&self) -> Vec<(String, Value)> {
        self.inner.record.lock().meta.clone()
    }

    /// Was `perform` ever invoked?
    pub fn handled(&self) -> bool {
        self.inner.record.lock().handled
    }

    /// Has the transaction reached an end-state?
    pub fn is_ended(&self) -> bool {
        self.inner.record.lock().state.is_end()
    }

    /// Did the transaction end in `Failed`?
    pub fn is_failed(&self) -> bool {
        self.inner.record.lock().state == TransactionState::Failed
    }

    /// The error a caller should see for a failed transaction.
    ///
    /// The recorded error if there is one, otherwise
    /// `Error::TransactionFailed` carrying the current result.
    pub fn failure(&self) -> Error {
        let record = self.inner.record.lock();
        match &record.error {
            Some(err) => err.clone(),
            None => Error::TransactionFailed {
                id: self.inner.id,
                action: self.inner.action.clone(),
                result: record.result.clone(),
            },
        }
    }

    /// Set that owns this transaction, if it is still alive
    pub fn transaction_set(&self) -> Option<TransactionSet> {
        self.inner.owner.upgrade().map(TransactionSet::from_shared)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    fn closed_error(&self) -> Error {
        Error::TransactionClosed { id: self.inner.id }
    }

    /// Move to `state`.
    ///
    /// Setting the current state is a silent no-op. Inside the review
    /// window only end-states may be assigned.
    pub fn set_state(&self, state: impl Into<TransactionState>) -> Result<()> {
        let state = state.into();
        {
            let record = self.inner.record.lock();
            if record.sealed() || (record.reviewing && !state.is_end()) {
                if record.state == state {
                    return Ok(());
                }
                return Err(self.closed_error());
            }
        }
        self.transition(state);
        Ok(())
    }

    /// Close successfully
    pub fn close(&self) -> Result<()> {
        self.set_state(TransactionState::Closed)
    }

    /// Record `err` and move to `Failed`
    pub fn fail(&self, err: Error) -> Result<()> {
        {
            let mut record = self.inner.record.lock();
            if record.sealed() {
                return Err(self.closed_error());
            }
            record.error = Some(err);
        }
        self.transition(TransactionState::Failed);
        Ok(())
    }

    /// Replace the result
    pub fn set_result(&self, value: impl Into<Value>) -> Result<()> {
        let mut record = self.inner.record.lock();
        if record.sealed() {
            return Err(self.closed_error());
        }
        record.result = value.into();
        Ok(())
    }

    /// Store a scratch note; an existing key keeps its position
    pub fn set_meta(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        let mut record = self.inner.record.lock();
        if record.sealed() {
            return Err(self.closed_error());
        }
        match record.meta.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => record.meta.push((key, value)),
        }
        Ok(())
    }

    /// Edit the params in place
    pub fn update_params<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Value>),
    {
        let mut record = self.inner.record.lock();
        if record.sealed() {
            return Err(self.closed_error());
        }
        f(&mut record.params);
        Ok(())
    }

    /// Apply a state change and notify the owner if anything changed.
    ///
    /// Ignored once sealed.
    fn transition(&self, state: TransactionState) -> bool {
        {
            let mut record = self.inner.record.lock();
            if record.sealed() || record.state == state {
                return false;
            }
            debug!(
                target: "transact::txn",
                id = self.inner.id,
                action = %self.inner.action,
                from = %record.state,
                to = %state,
                "transition"
            );
            record.state = state;
        }
        self.notify();
        true
    }

    fn notify(&self) {
        if let Some(owner) = self.inner.owner.upgrade() {
            owner.update_trans(self);
        }
    }

    pub(crate) fn begin_review(&self) {
        self.inner.record.lock().reviewing = true;
    }

    pub(crate) fn end_review(&self) {
        self.inner.record.lock().reviewing = false;
    }

    // ========================================================================
    // Driver
    // ========================================================================

    /// Run `handler` against this transaction.
    ///
    /// Immediate and stepped handlers finish before this returns. Deferred
    /// and stepped-async handlers return `Outcome::Pending` unless they
    /// already ended while starting.
    pub fn perform(&self, handler: &Handler) -> Outcome {
        {
            let mut record = self.inner.record.lock();
            record.handled = true;
            if record.driver.is_none() {
                record.driver = Some(handler.style());
            }
        }
        let params = self.params();

        match handler.perform() {
            Perform::Immediate(f) => {
                match f(self, &params) {
                    Ok(value) => self.complete(Some(value)),
                    Err(err) => self.handle_error(err, handler),
                }
                Outcome::Ready(self.result())
            }
            Perform::Stepped(f) => {
                match f(self, &params) {
                    Ok(mut source) => self.drive_steps(source.as_mut(), handler),
                    Err(err) => self.handle_error(err, handler),
                }
                Outcome::Ready(self.result())
            }
            Perform::Deferred(f) => {
                let body = f(self.clone(), params);
                let guard = PendingGuard(self.clone());
                let handler = handler.clone();
                Outcome::Pending(
                    async move {
                        let trans = &guard.0;
                        match body.await {
                            Ok(value) => trans.complete(Some(value)),
                            Err(err) => trans.handle_error(err, &handler),
                        }
                        trans.settle()
                    }
                    .boxed(),
                )
            }
            Perform::SteppedAsync(f) => match f(self.clone(), params) {
                Ok(stream) => {
                    let guard = PendingGuard(self.clone());
                    let handler = handler.clone();
                    Outcome::Pending(
                        async move {
                            let trans = &guard.0;
                            trans.drive_stream(stream, &handler).await;
                            trans.settle()
                        }
                        .boxed(),
                    )
                }
                Err(err) => {
                    self.handle_error(err, handler);
                    Outcome::Ready(self.result())
                }
            },
        }
    }

    /// Assign `value` as the result (if present) and close.
    ///
    /// Ignored once the transaction has ended.
    fn complete(&self, value: Option<Value>) {
        {
            let mut record = self.inner.record.lock();
            if record.state.is_end() {
                return;
            }
            if let Some(value) = value {
                record.result = value;
            }
        }
        self.transition(TransactionState::Closed);
    }

    /// Route `err` through the handler's error continuation, or fail.
    pub(crate) fn handle_error(&self, err: Error, handler: &Handler) {
        if self.is_ended() {
            return;
        }
        if handler.has_error_path() {
            debug!(
                target: "transact::txn",
                id = self.inner.id,
                action = %self.inner.action,
                error = %err,
                "routing error to continuation"
            );
            let _ = self.perform(&handler.for_errors(err));
            return;
        }
        warn!(
            target: "transact::txn",
            id = self.inner.id,
            action = %self.inner.action,
            error = %err,
            "transaction failed"
        );
        self.force_fail(err);
    }

    /// Fail unless sealed, replacing any recorded error
    pub(crate) fn force_fail(&self, err: Error) {
        {
            let mut record = self.inner.record.lock();
            if record.sealed() {
                return;
            }
            record.error = Some(err);
        }
        self.transition(TransactionState::Failed);
    }

    /// Apply one pulled step. Returns `true` when stepping must stop.
    fn apply_step(&self, step: Result<Step>, handler: &Handler) -> bool {
        match step {
            Ok(Step::Yield(Some(label))) => {
                self.transition(label);
                false
            }
            Ok(Step::Yield(None)) => false,
            Ok(Step::Done(value)) => {
                self.complete(value);
                true
            }
            Err(err) => {
                self.handle_error(err, handler);
                true
            }
        }
    }

    fn runaway(&self, handler: &Handler) {
        self.handle_error(
            Error::RunawaySteps {
                limit: self.inner.step_limit,
            },
            handler,
        );
    }

    fn drive_steps(&self, source: &mut dyn StepSource, handler: &Handler) {
        let mut pulls = 0;
        while !self.is_ended() {
            if pulls >= self.inner.step_limit {
                self.runaway(handler);
                return;
            }
            pulls += 1;
            let step = source.pull();
            trace!(target: "transact::txn", id = self.inner.id, pull = pulls, "step");
            if self.apply_step(step, handler) {
                return;
            }
        }
    }

    async fn drive_stream(&self, mut stream: StepStream, handler: &Handler) {
        let mut pulls = 0;
        while !self.is_ended() {
            if pulls >= self.inner.step_limit {
                self.runaway(handler);
                return;
            }
            pulls += 1;
            let step = stream.next().await.unwrap_or(Ok(Step::Done(None)));
            trace!(target: "transact::txn", id = self.inner.id, pull = pulls, "step");
            if self.apply_step(step, handler) {
                return;
            }
        }
    }

    /// Final value of a finished transaction, or its failure
    fn settle(&self) -> Result<Value> {
        if self.is_failed() {
            Err(self.failure())
        } else {
            Ok(self.result())
        }
    }

    // ========================================================================
    // Nesting & serialization
    // ========================================================================

    /// Issue a nested action on the owning set with this transaction as
    /// parent.
    ///
    /// Only a deferred or stepped-async transaction can dispatch a deferred
    /// or stepped-async action, since only it can await the child before
    /// closing.
    ///
    /// # Errors
    ///
    /// `Error::RegistryClosed` if the owning set is gone,
    /// `Error::AsyncDispatch` for an async child of a synchronous parent,
    /// plus anything `TransactionSet::do_action` returns.
    pub fn dispatch(&self, action: &str, params: Vec<Value>) -> Result<Outcome> {
        let set = self.transaction_set().ok_or(Error::RegistryClosed)?;
        let awaits = self
            .inner
            .record
            .lock()
            .driver
            .is_some_and(ExecutionStyle::is_async);
        let child_is_async = set
            .handler(action)
            .is_some_and(|handler| handler.style().is_async());
        if child_is_async && !awaits {
            warn!(
                target: "transact::txn",
                id = self.inner.id,
                action,
                "synchronous transaction dispatched an async action"
            );
            return Err(Error::AsyncDispatch {
                parent: self.inner.id,
                action: action.to_string(),
            });
        }
        set.run_action(action, params, Some(self.inner.id))
    }

    /// `{action, params, state}`, plus `{id, parentId}` when `with_id`,
    /// plus `meta` as `[[key, value], ...]` when notes exist.
    pub fn to_json(&self, with_id: bool) -> Value {
        let record = self.inner.record.lock();
        let mut out = Map::new();
        out.insert("action".to_string(), json!(self.inner.action));
        out.insert("params".to_string(), Value::Array(record.params.clone()));
        out.insert("state".to_string(), json!(record.state.as_str()));
        if with_id {
            out.insert("id".to_string(), json!(self.inner.id));
            out.insert("parentId".to_string(), json!(self.inner.parent_id));
        }
        if !record.meta.is_empty() {
            let meta = record
                .meta
                .iter()
                .map(|(k, v)| json!([k, v]))
                .collect::<Vec<_>>();
            out.insert("meta".to_string(), Value::Array(meta));
        }
        Value::Object(out)
    }

    /// Serializable copy of the full record
    pub fn snapshot(&self) -> TransactionSnapshot {
        let record = self.inner.record.lock();
        TransactionSnapshot {
            id: self.inner.id,
            parent_id: self.inner.parent_id,
            action: self.inner.action.clone(),
            params: record.params.clone(),
            state: record.state.clone(),
            result: record.result.clone(),
            error: record.error.clone(),
            meta: record.meta.clone(),
            handled: record.handled,
        }
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Transaction {}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.inner.record.lock();
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("parent_id", &self.inner.parent_id)
            .field("action", &self.inner.action)
            .field("state", &record.state)
            .finish()
    }
}

/// Point-in-time copy of a transaction's record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSnapshot {
    /// Transaction id
    pub id: u64,
    /// Parent transaction id
    pub parent_id: Option<u64>,
    /// Action name
    pub action: String,
    /// Params at snapshot time
    pub params: Vec<Value>,
    /// State at snapshot time
    pub state: TransactionState,
    /// Last produced value
    pub result: Value,
    /// Recorded error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    /// Scratch notes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<(String, Value)>,
    /// Whether a handler was ever run
    pub handled: bool,
}
