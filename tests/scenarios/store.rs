//! Executor handlers backed by a TransactManager-held ledger

use crate::common::Recorder;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use transact::{
    observer_fn, ChangeManager, ChangeParams, ChangeTransaction, Error, HandlerDef, Perform,
    Result, TransactManager, TransactionSet, TransactionState, ValueCell,
};

/// Balance that never goes negative
#[derive(Default)]
struct Ledger {
    cell: ValueCell<i64>,
}

impl ChangeManager for Ledger {
    type Value = i64;

    fn cell(&self) -> &ValueCell<i64> {
        &self.cell
    }

    fn before_execute(
        &self,
        trans: &ChangeTransaction<i64>,
        _: &TransactManager<Self>,
    ) -> Result<()> {
        match trans.change().value.as_i64() {
            Some(amount) if amount > 0 => Ok(()),
            _ => Err(Error::rejected("amount must be positive")),
        }
    }

    fn execute(&self, trans: &ChangeTransaction<i64>) -> Result<()> {
        let change = trans.change();
        let amount = change.value.as_i64().unwrap_or_default();
        let delta = if change.action.is("withdraw") { -amount } else { amount };
        trans.set_before(self.cell.set(self.cell.get() + delta));
        Ok(())
    }

    fn after_execute(&self, _: &ChangeTransaction<i64>) -> Result<()> {
        if self.cell.get() < 0 {
            return Err(Error::rejected("insufficient funds"));
        }
        Ok(())
    }

    fn undo(&self, trans: &ChangeTransaction<i64>) {
        if let Some(before) = trans.before() {
            self.cell.set(before);
        }
    }
}

fn ledger_op(ledger: &Arc<TransactManager<Ledger>>, op: &'static str) -> HandlerDef {
    let ledger = ledger.clone();
    HandlerDef::callable(Perform::immediate(move |_, params| {
        let amount = params.first().cloned().unwrap_or(Value::Null);
        ledger.perform(op, ChangeParams::value(amount))?;
        Ok(json!(ledger.managed_value()))
    }))
}

fn bank() -> (TransactionSet, Arc<TransactManager<Ledger>>) {
    let ledger = Arc::new(TransactManager::new(Ledger::default()));
    let set = TransactionSet::builder()
        .handler("deposit", ledger_op(&ledger, "deposit"))
        .handler("withdraw", ledger_op(&ledger, "withdraw"))
        .handler(
            "payroll",
            Perform::immediate(|trans, params| {
                for amount in params {
                    trans.dispatch("deposit", vec![amount.clone()])?.into_ready()?;
                }
                Ok(Value::from(params.len()))
            }),
        )
        .build()
        .unwrap();
    (set, ledger)
}

fn balances(ledger: &TransactManager<Ledger>) -> (Arc<Mutex<Vec<i64>>>, transact::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = ledger.subscribe_settled(observer_fn(move |v: &i64| sink.lock().push(*v)));
    (seen, sub)
}

#[test]
fn overdraft_fails_the_transaction_and_keeps_the_balance() {
    let (set, ledger) = bank();
    let (seen, _sub) = balances(&ledger);

    let balance = set
        .do_action("deposit", vec![json!(100)])
        .unwrap()
        .into_ready()
        .unwrap();
    assert_eq!(balance, json!(100));

    let err = set.do_action("withdraw", vec![json!(150)]).unwrap_err();
    assert_eq!(err, Error::rejected("insufficient funds"));
    assert_eq!(ledger.managed_value(), 100);

    let _ = set.do_action("withdraw", vec![json!(40)]).unwrap();
    assert_eq!(*seen.lock(), vec![100, 60]);
    assert!(set.live().is_empty());
    assert!(ledger.live().is_empty());
}

#[test]
fn payroll_nests_deposits_under_the_parent() {
    let (set, ledger) = bank();
    let (seen, _sub) = balances(&ledger);
    let recorder = Recorder::attach(&set);

    let paid = set
        .do_action("payroll", vec![json!(10), json!(20)])
        .unwrap()
        .into_ready()
        .unwrap();

    assert_eq!(paid, json!(2));
    assert_eq!(*seen.lock(), vec![10, 30]);
    assert_eq!(
        recorder.actions(),
        vec![
            vec![],
            vec!["payroll".to_string()],
            vec!["payroll".to_string(), "deposit".to_string()],
            vec!["payroll".to_string()],
            vec!["payroll".to_string(), "deposit".to_string()],
            vec!["payroll".to_string()],
            vec![],
        ]
    );
}

#[test]
fn failed_deposit_fails_payroll_but_keeps_earlier_deposits() {
    let (set, ledger) = bank();
    let failed = Arc::new(Mutex::new(Vec::new()));
    let sink = failed.clone();
    set.add_post(Perform::immediate(move |trans, _| {
        if trans.state() == TransactionState::Failed {
            sink.lock().push(trans.action().to_string());
        }
        Ok(Value::Null)
    }))
    .unwrap();

    let err = set
        .do_action("payroll", vec![json!(10), json!(-5), json!(20)])
        .unwrap_err();

    assert_eq!(err, Error::rejected("amount must be positive"));
    assert_eq!(ledger.managed_value(), 10);
    assert_eq!(
        *failed.lock(),
        vec!["deposit".to_string(), "payroll".to_string()]
    );
}

#[test]
fn closed_ledger_surfaces_through_the_registry() {
    let (set, ledger) = bank();
    ledger.close();

    assert_eq!(
        set.do_action("deposit", vec![json!(1)]).unwrap_err(),
        Error::ManagerClosed
    );

    set.close();
    assert_eq!(
        set.do_action("deposit", vec![json!(1)]).unwrap_err(),
        Error::RegistryClosed
    );
}
