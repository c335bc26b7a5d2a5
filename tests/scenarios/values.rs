//! TransactManager over a list of labels using the conventional actions

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use transact::{
    observer_fn, ChangeAction, ChangeManager, ChangeParams, ChangeTransaction, Error, Result,
    TransactManager, ValueCell,
};

/// Labels list; `CRE` appends, `SET` renames, `DEL` removes by index.
/// Labels must be unique and non-empty.
#[derive(Default)]
struct Labels {
    cell: ValueCell<Vec<String>>,
}

impl ChangeManager for Labels {
    type Value = Vec<String>;

    fn cell(&self) -> &ValueCell<Vec<String>> {
        &self.cell
    }

    fn before_execute(
        &self,
        trans: &ChangeTransaction<Vec<String>>,
        _: &TransactManager<Self>,
    ) -> Result<()> {
        let change = trans.change();
        match change.action {
            ChangeAction::Create | ChangeAction::Set => match change.value.as_str() {
                Some(label) if !label.is_empty() => Ok(()),
                _ => Err(Error::rejected("labels must be non-empty strings")),
            },
            ChangeAction::Delete => match change.index() {
                Some(i) if i < self.cell.with(Vec::len) => Ok(()),
                _ => Err(Error::rejected("no label at that index")),
            },
            _ => Err(Error::unsupported(change.action.as_str())),
        }
    }

    fn execute(&self, trans: &ChangeTransaction<Vec<String>>) -> Result<()> {
        let change = trans.change();
        let mut next = self.cell.get();
        let label = change.value.as_str().unwrap_or_default().to_string();
        let index = change.index();
        match (change.action, index) {
            (ChangeAction::Create, _) => next.push(label),
            (ChangeAction::Set, Some(i)) if i < next.len() => next[i] = label,
            (ChangeAction::Delete, Some(i)) => {
                next.remove(i);
            }
            _ => return Err(Error::rejected("no label at that index")),
        }
        trans.set_before(self.cell.set(next));
        Ok(())
    }

    fn after_execute(&self, _: &ChangeTransaction<Vec<String>>) -> Result<()> {
        let labels = self.cell.get();
        let mut sorted = labels.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != labels.len() {
            return Err(Error::rejected("duplicate label"));
        }
        Ok(())
    }

    fn undo(&self, trans: &ChangeTransaction<Vec<String>>) {
        if let Some(before) = trans.before() {
            self.cell.set(before);
        }
    }
}

fn settled(tm: &TransactManager<Labels>) -> (Arc<Mutex<Vec<Vec<String>>>>, transact::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let sub = tm.subscribe_settled(observer_fn(move |v: &Vec<String>| sink.lock().push(v.clone())));
    (seen, sub)
}

fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn conventional_actions_edit_the_list() {
    let tm = TransactManager::new(Labels::default());
    let (seen, _sub) = settled(&tm);

    tm.perform(ChangeAction::Create, ChangeParams::value("draft")).unwrap();
    tm.perform(ChangeAction::Create, ChangeParams::value("review")).unwrap();
    tm.perform(ChangeAction::Set, ChangeParams::keyed(0, "ready")).unwrap();
    tm.perform(ChangeAction::Delete, ChangeParams::keyed(1, Value::Null))
        .unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            labels(&["draft"]),
            labels(&["draft", "review"]),
            labels(&["ready", "review"]),
            labels(&["ready"]),
        ]
    );
}

#[test]
fn post_validation_failure_restores_value() {
    let tm = TransactManager::new(Labels::default());
    tm.perform("CRE", ChangeParams::value("a")).unwrap();
    tm.perform("CRE", ChangeParams::value("b")).unwrap();

    let err = tm.perform("SET", ChangeParams::keyed(1, "a")).unwrap_err();
    assert_eq!(err, Error::rejected("duplicate label"));
    assert_eq!(tm.managed_value(), labels(&["a", "b"]));
}

#[test]
fn invalid_changes_are_rejected_up_front() {
    let tm = TransactManager::new(Labels::default());

    assert_eq!(
        tm.perform("CRE", ChangeParams::value("")).unwrap_err(),
        Error::rejected("labels must be non-empty strings")
    );
    assert_eq!(
        tm.perform("DEL", ChangeParams::keyed(0, Value::Null)).unwrap_err(),
        Error::rejected("no label at that index")
    );
    assert_eq!(
        tm.perform("UPDATE", ChangeParams::value("x")).unwrap_err(),
        Error::UnsupportedAction {
            action: "UPDATE".into()
        }
    );
    assert!(tm.managed_value().is_empty());
    assert!(tm.live().is_empty());
}

#[test]
fn odd_values_are_vetoed() {
    #[derive(Default)]
    struct Evens {
        cell: ValueCell<Vec<i64>>,
    }

    impl ChangeManager for Evens {
        type Value = Vec<i64>;

        fn cell(&self) -> &ValueCell<Vec<i64>> {
            &self.cell
        }

        fn before_execute(
            &self,
            trans: &ChangeTransaction<Vec<i64>>,
            _: &TransactManager<Self>,
        ) -> Result<()> {
            match trans.change().value.as_i64() {
                Some(n) if n % 2 == 0 => Ok(()),
                _ => Err(Error::rejected("odd")),
            }
        }

        fn execute(&self, trans: &ChangeTransaction<Vec<i64>>) -> Result<()> {
            let n = trans.change().value.as_i64().unwrap_or_default();
            let mut next = self.cell.get();
            next.push(n);
            trans.set_before(self.cell.set(next));
            Ok(())
        }

        fn undo(&self, trans: &ChangeTransaction<Vec<i64>>) {
            if let Some(before) = trans.before() {
                self.cell.set(before);
            }
        }
    }

    let tm = TransactManager::new(Evens::default());
    let errors = (1..=8)
        .filter_map(|n| tm.perform("push", ChangeParams::value(n)).err())
        .count();

    assert_eq!(errors, 4);
    assert_eq!(tm.managed_value(), vec![2, 4, 6, 8]);
}
