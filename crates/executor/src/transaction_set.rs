//! TransactionSet: handler registry, pre/post interception and live-set
//! bookkeeping
//!
//! The set is the entry point callers use. `do_action` resolves a handler,
//! creates a [`Transaction`], runs the pre chain, tracks the transaction in
//! the live set while its handler runs, and surfaces a failure to the
//! caller.
//!
//! ## Live set
//!
//! The live set is published through a [`BehaviorSubject`] whose value is
//! always a complete, immutable [`LiveSet`] snapshot. Every change replaces
//! the snapshot wholesale. An ended transaction is never part of it.
//!
//! ## Hooks
//!
//! Pre hooks run in registration order before the primary handler and may
//! veto by forcing an end-state; the chain stops at the first hook that
//! ends the transaction. Post hooks run in registration order exactly once,
//! when a tracked transaction ends or directly after a veto, inside the
//! transaction's review window.
//!
//! A hook that raises is rerouted through its own error path; if that
//! raises too, the transaction is failed with the second error.

use crate::handler::{Handler, HandlerDef, Perform};
use crate::outcome::Outcome;
use crate::transaction::Transaction;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use transact_core::{
    BehaviorSubject, CoreConfig, Error, Observer, Result, Subscription, TransactionState,
};

// ============================================================================
// LiveSet
// ============================================================================

/// Immutable snapshot of the transactions currently in flight
#[derive(Clone, Default)]
pub struct LiveSet(Arc<Vec<Transaction>>, Arc<Vec<TransactionState>>);

impl LiveSet {
    /// Is `trans` (this exact handle) in the snapshot?
    pub fn contains(&self, trans: &Transaction) -> bool {
        self.0.iter().any(|t| t == trans)
    }

    /// Number of live transactions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Nothing in flight?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Transactions in the order they went live
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.0.iter()
    }

    /// Action names in the order they went live
    pub fn actions(&self) -> Vec<String> {
        self.0.iter().map(|t| t.action().to_string()).collect()
    }

    /// Serialized view of every live transaction
    pub fn to_json(&self, with_id: bool) -> Value {
        Value::Array(self.0.iter().map(|t| t.to_json(with_id)).collect())
    }

    fn with(&self, trans: &Transaction) -> Self {
        let mut members = self.0.as_ref().clone();
        let mut states = self.1.as_ref().clone();
        members.push(trans.clone());
        states.push(trans.state());
        LiveSet(Arc::new(members), Arc::new(states))
    }

    fn without(&self, trans: &Transaction) -> Self {
        let (members, states) = self
            .0
            .iter()
            .zip(self.1.iter())
            .filter(|(t, _)| *t != trans)
            .map(|(t, state)| (t.clone(), state.clone()))
            .unzip();
        LiveSet(Arc::new(members), Arc::new(states))
    }

    /// Fresh snapshot recording the current state of `trans`, or `None` if
    /// that state was already published.
    fn refreshed(&self, trans: &Transaction) -> Option<Self> {
        let index = self.0.iter().position(|t| t == trans)?;
        let state = trans.state();
        if self.1[index] == state {
            return None;
        }
        let mut states = self.1.as_ref().clone();
        states[index] = state;
        Some(LiveSet(self.0.clone(), Arc::new(states)))
    }
}

impl PartialEq for LiveSet {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl fmt::Debug for LiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a LiveSet {
    type Item = &'a Transaction;
    type IntoIter = std::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Shared state
// ============================================================================

/// State shared by every handle to one set; transactions hold it weakly
pub(crate) struct Shared {
    config: CoreConfig,
    handlers: RwLock<Arc<HashMap<String, Handler>>>,
    pre: RwLock<Arc<Vec<Handler>>>,
    post: RwLock<Arc<Vec<Handler>>>,
    live: BehaviorSubject<LiveSet>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    fn new(config: CoreConfig) -> Self {
        Self {
            config,
            handlers: RwLock::new(Arc::new(HashMap::new())),
            pre: RwLock::new(Arc::new(Vec::new())),
            post: RwLock::new(Arc::new(Vec::new())),
            live: BehaviorSubject::new(LiveSet::default()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn trace_snapshot(&self) {
        if self.config.trace_snapshots {
            let live = self.live.value();
            trace!(
                target: "transact::set",
                live = live.len(),
                actions = ?live.actions(),
                "snapshot"
            );
        }
    }

    fn push(&self, trans: &Transaction) {
        let published = self.live.update(|set| {
            if set.contains(trans) {
                None
            } else {
                Some(set.with(trans))
            }
        });
        if published {
            self.trace_snapshot();
        }
    }

    /// React to a state change of `trans`.
    ///
    /// Untracked transactions are ignored. A tracked transaction that ended
    /// is removed and handed to the post chain; otherwise a fresh snapshot
    /// is published.
    pub(crate) fn update_trans(&self, trans: &Transaction) {
        let ended = trans.is_ended();
        let mut removed = false;
        let published = self.live.update(|set| {
            if !set.contains(trans) {
                return None;
            }
            if ended {
                removed = true;
                Some(set.without(trans))
            } else {
                set.refreshed(trans)
            }
        });
        if published {
            self.trace_snapshot();
        }
        if removed {
            debug!(
                target: "transact::set",
                id = trans.id(),
                action = %trans.action(),
                state = %trans.state(),
                "transaction retired"
            );
            self.run_post(trans);
        }
    }

    fn run_pre(&self, trans: &Transaction) {
        let hooks = self.pre.read().clone();
        for hook in hooks.iter() {
            if trans.is_ended() {
                debug!(
                    target: "transact::set",
                    id = trans.id(),
                    hook = %hook.name(),
                    "vetoed by pre hook"
                );
                break;
            }
            run_hook(hook, trans);
        }
    }

    fn run_post(&self, trans: &Transaction) {
        let hooks = self.post.read().clone();
        if hooks.is_empty() {
            return;
        }
        trans.begin_review();
        for hook in hooks.iter() {
            run_hook(hook, trans);
        }
        trans.end_review();
    }
}

fn run_hook(hook: &Handler, trans: &Transaction) {
    let err = match hook.call_immediate(trans) {
        Ok(_) => return,
        Err(err) => err,
    };
    warn!(
        target: "transact::set",
        id = trans.id(),
        hook = %hook.name(),
        error = %err,
        "hook raised"
    );
    if let Err(err) = hook.for_errors(err).call_immediate(trans) {
        trans.force_fail(err);
    }
}

fn hook_handler(kind: &str, index: usize, def: HandlerDef) -> Result<Handler> {
    let handler = Handler::new(format!("{}[{}]", kind, index), def)?;
    if !matches!(handler.perform(), Perform::Immediate(_)) {
        return Err(Error::BadHandlerDefinition {
            name: handler.name().to_string(),
        });
    }
    Ok(handler)
}

// ============================================================================
// TransactionSet
// ============================================================================

/// Action registry and live-transaction tracker
///
/// Cloning yields another handle to the same set.
#[derive(Clone)]
pub struct TransactionSet {
    shared: Arc<Shared>,
}

impl Default for TransactionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionSet {
    /// Empty set with the default configuration
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    /// Empty set with `config`
    pub fn with_config(config: CoreConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(config)),
        }
    }

    /// Start building a set with handlers and hooks
    pub fn builder() -> TransactionSetBuilder {
        TransactionSetBuilder::default()
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Configuration in effect
    pub fn config(&self) -> &CoreConfig {
        &self.shared.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::RegistryClosed);
        }
        Ok(())
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register `def` under `name`, replacing any existing binding
    pub fn add_handler(&self, name: impl Into<String>, def: HandlerDef) -> Result<()> {
        self.set_handlers([(name.into(), def)])
    }

    /// Register several handlers at once.
    ///
    /// Every definition is normalized before any binding changes, so a bad
    /// definition leaves the registry untouched.
    pub fn set_handlers<I, S>(&self, defs: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, HandlerDef)>,
        S: Into<String>,
    {
        self.ensure_open()?;
        let handlers = defs
            .into_iter()
            .map(|(name, def)| Handler::new(name, def))
            .collect::<Result<Vec<_>>>()?;

        let mut guard = self.shared.handlers.write();
        let mut next = guard.as_ref().clone();
        for handler in handlers {
            debug!(
                target: "transact::set",
                name = %handler.name(),
                style = ?handler.style(),
                "handler registered"
            );
            next.insert(handler.name().to_string(), handler);
        }
        *guard = Arc::new(next);
        Ok(())
    }

    /// Append a pre hook; hooks must be immediate
    pub fn add_pre(&self, def: impl Into<HandlerDef>) -> Result<()> {
        self.ensure_open()?;
        let mut guard = self.shared.pre.write();
        let hook = hook_handler("pre", guard.len(), def.into())?;
        let mut next = guard.as_ref().clone();
        next.push(hook);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Append a post hook; hooks must be immediate
    pub fn add_post(&self, def: impl Into<HandlerDef>) -> Result<()> {
        self.ensure_open()?;
        let mut guard = self.shared.post.write();
        let hook = hook_handler("post", guard.len(), def.into())?;
        let mut next = guard.as_ref().clone();
        next.push(hook);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Handler bound to `name`
    pub fn handler(&self, name: &str) -> Option<Handler> {
        self.shared.handlers.read().get(name).cloned()
    }

    /// Is anything bound to `name`?
    pub fn has_handler(&self, name: &str) -> bool {
        self.shared.handlers.read().contains_key(name)
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Run the handler registered for `action`.
    ///
    /// # Errors
    ///
    /// - `Error::RegistryClosed` after `close`
    /// - `Error::NoHandler` if nothing is registered under `action`
    /// - the transaction's failure if it ended `failed`
    pub fn do_action(&self, action: &str, params: Vec<Value>) -> Result<Outcome> {
        self.run_action(action, params, None)
    }

    pub(crate) fn run_action(
        &self,
        action: &str,
        params: Vec<Value>,
        parent_id: Option<u64>,
    ) -> Result<Outcome> {
        self.ensure_open()?;
        let handler = self.handler(action).ok_or_else(|| Error::NoHandler {
            action: action.to_string(),
        })?;
        self.run(handler, params, parent_id)
    }

    /// Run an unregistered immediate callable once as `"transact <fn name>"`
    pub fn transact<F>(&self, f: F, params: Vec<Value>) -> Result<Outcome>
    where
        F: Fn(&Transaction, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let name = match fn_name::<F>() {
            Some(name) => format!("{} {}", self.shared.config.transact_prefix, name),
            None => self.shared.config.transact_prefix.clone(),
        };
        self.transact_named(name, Perform::immediate(f), params)
    }

    /// Run an unregistered callable once under `name`
    pub fn transact_named(
        &self,
        name: impl Into<String>,
        perform: Perform,
        params: Vec<Value>,
    ) -> Result<Outcome> {
        self.ensure_open()?;
        self.run(Handler::from_perform(name, perform), params, None)
    }

    fn run(&self, handler: Handler, params: Vec<Value>, parent_id: Option<u64>) -> Result<Outcome> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let trans = Transaction::new(
            &self.shared,
            id,
            parent_id,
            handler.name().to_string(),
            params,
            self.shared.config.step_limit,
        );
        debug!(
            target: "transact::set",
            id,
            parent_id = ?parent_id,
            action = %handler.name(),
            "dispatch"
        );

        self.shared.run_pre(&trans);
        if trans.is_ended() {
            self.shared.run_post(&trans);
            return if trans.is_failed() {
                Err(trans.failure())
            } else {
                Ok(Outcome::Ready(trans.result()))
            };
        }

        self.shared.push(&trans);
        let outcome = trans.perform(&handler);
        if trans.is_failed() {
            return Err(trans.failure());
        }
        Ok(outcome)
    }

    /// Notify the set that `trans` changed state.
    ///
    /// Transactions call this themselves. Nothing is published for an
    /// untracked transaction or one whose state was already published.
    pub fn update_trans(&self, trans: &Transaction) {
        self.shared.update_trans(trans);
    }

    // ========================================================================
    // Observation & lifecycle
    // ========================================================================

    /// Current live-set snapshot
    pub fn live(&self) -> LiveSet {
        self.shared.live.value()
    }

    /// Observe live-set snapshots; the current one is delivered immediately
    pub fn subscribe(&self, observer: impl Observer<LiveSet> + 'static) -> Subscription {
        self.shared.live.subscribe(observer)
    }

    /// Shut the registry down and complete the live-set stream
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            debug!(target: "transact::set", "transaction set closed");
            self.shared.live.complete();
        }
    }

    /// Has `close` been called?
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for TransactionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSet")
            .field("handlers", &self.shared.handlers.read().len())
            .field("live", &self.live().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Last path segment of a named function type; closures have no name
fn fn_name<F>() -> Option<&'static str> {
    let full = std::any::type_name::<F>();
    let name = full.rsplit("::").next().unwrap_or(full);
    if name.is_empty() || name.contains('{') {
        None
    } else {
        Some(name)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for a [`TransactionSet`] with handlers and hooks in place
#[derive(Default)]
pub struct TransactionSetBuilder {
    config: CoreConfig,
    handlers: Vec<(String, HandlerDef)>,
    pre: Vec<HandlerDef>,
    post: Vec<HandlerDef>,
}

impl TransactionSetBuilder {
    /// Use `config` instead of the default
    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a handler
    pub fn handler(mut self, name: impl Into<String>, def: impl Into<HandlerDef>) -> Self {
        self.handlers.push((name.into(), def.into()));
        self
    }

    /// Append a pre hook
    pub fn pre(mut self, def: impl Into<HandlerDef>) -> Self {
        self.pre.push(def.into());
        self
    }

    /// Append a post hook
    pub fn post(mut self, def: impl Into<HandlerDef>) -> Self {
        self.post.push(def.into());
        self
    }

    /// Validate the configuration and every definition, then build
    pub fn build(self) -> Result<TransactionSet> {
        self.config.validate()?;
        let set = TransactionSet::with_config(self.config);
        set.set_handlers(self.handlers)?;
        for def in self.pre {
            set.add_pre(def)?;
        }
        for def in self.post {
            set.add_post(def)?;
        }
        Ok(set)
    }
}
