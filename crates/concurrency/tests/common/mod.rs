//! Shared fixtures for the value-layer suites.

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::{json, Value};
use transact_concurrency::{
    ChangeAction, ChangeManager, ChangeParams, ChangeTransaction, TransactManager, ValueCell,
};
use transact_core::{Error, Result};

/// Array manager understanding `SET`, `push`, `shift` and `nest`.
///
/// - `SET` writes `value` at `key`, padding with nulls
/// - `push` appends `value`
/// - `shift` inserts `value` nulls at `key`
/// - `nest` records `before` up front, pushes `0, 2, ..` as `value` nested
///   changes, appends a marker, then fails in `execute` or `after_execute`
///   when `target` names that phase
#[derive(Default)]
pub struct ArrayManager {
    cell: ValueCell<Vec<Value>>,
    /// Shift existing items out of the way before a `SET` into them
    pub protect: bool,
    /// Reject odd `SET` / `push` values
    pub even_only: bool,
    undone: Mutex<Vec<u64>>,
}

impl ArrayManager {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn protected() -> Self {
        Self {
            protect: true,
            ..Self::default()
        }
    }

    pub fn even_only() -> Self {
        Self {
            even_only: true,
            ..Self::default()
        }
    }

    /// Ids passed to `undo`, in call order
    pub fn undone(&self) -> Vec<u64> {
        self.undone.lock().clone()
    }
}

impl ChangeManager for ArrayManager {
    type Value = Vec<Value>;

    fn cell(&self) -> &ValueCell<Vec<Value>> {
        &self.cell
    }

    fn before_execute(
        &self,
        trans: &ChangeTransaction<Vec<Value>>,
        manager: &TransactManager<Self>,
    ) -> Result<()> {
        let change = trans.change();
        let writes = change.action == ChangeAction::Set || change.action.is("push");
        if self.even_only && writes && change.value.as_i64().map_or(true, |v| v % 2 != 0) {
            return Err(Error::rejected("only even values accepted"));
        }
        if self.protect && change.action == ChangeAction::Set {
            let len = self.cell.with(Vec::len);
            if let Some(key) = change.index().filter(|k| *k < len) {
                manager.perform("shift", ChangeParams::keyed(key, 1))?;
            }
        }
        if change.action.is("nest") {
            trans.set_before(self.cell.get());
            for i in 0..change.value.as_u64().unwrap_or(0) {
                manager.perform("push", ChangeParams::value(i * 2))?;
            }
        }
        Ok(())
    }

    fn execute(&self, trans: &ChangeTransaction<Vec<Value>>) -> Result<()> {
        let change = trans.change();
        let before = self.cell.get();
        let mut next = before.clone();

        match &change.action {
            ChangeAction::Set => {
                let key = change.index().ok_or_else(|| Error::rejected("SET needs a key"))?;
                if next.len() <= key {
                    next.resize(key + 1, Value::Null);
                }
                next[key] = change.value.clone();
            }
            action if action.is("push") => next.push(change.value.clone()),
            action if action.is("shift") => {
                let key = change.index().unwrap_or(0).min(next.len());
                let count = change.value.as_u64().unwrap_or(0) as usize;
                for _ in 0..count {
                    next.insert(key, Value::Null);
                }
            }
            action if action.is("nest") => {
                if change.target == Some(json!("execute")) {
                    return Err(Error::handler("nest failed in execute"));
                }
                next.push(json!("nest"));
            }
            other => return Err(Error::unsupported(other.as_str())),
        }

        self.cell.set(next);
        if trans.before().is_none() {
            trans.set_before(before);
        }
        Ok(())
    }

    fn after_execute(&self, trans: &ChangeTransaction<Vec<Value>>) -> Result<()> {
        if trans.change().target == Some(json!("after")) {
            return Err(Error::rejected("nest failed after execute"));
        }
        Ok(())
    }

    fn undo(&self, trans: &ChangeTransaction<Vec<Value>>) {
        self.undone.lock().push(trans.id());
        if let Some(before) = trans.before() {
            self.cell.set(before);
        }
    }
}

/// Values published on the settled feed, in order
pub fn record_settled<M: ChangeManager>(
    tm: &TransactManager<M>,
) -> (std::sync::Arc<Mutex<Vec<M::Value>>>, transact_core::Subscription) {
    let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = tm.subscribe_settled(transact_core::observer_fn(move |v: &M::Value| {
        sink.lock().push(v.clone())
    }));
    (seen, sub)
}
