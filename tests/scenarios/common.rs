//! Common helpers for scenario tests

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use transact::{observer_fn, LiveSet, Subscription, TransactionSet};

/// Live-set snapshots rendered at the moment they were published
pub struct Recorder {
    seen: Arc<Mutex<Vec<Value>>>,
    _sub: Subscription,
}

impl Recorder {
    pub fn attach(set: &TransactionSet) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = set.subscribe(observer_fn(move |live: &LiveSet| {
            sink.lock().push(live.to_json(false));
        }));
        Self { seen, _sub: sub }
    }

    pub fn history(&self) -> Value {
        Value::Array(self.seen.lock().clone())
    }

    /// Action names of every recorded snapshot
    pub fn actions(&self) -> Vec<Vec<String>> {
        self.seen
            .lock()
            .iter()
            .map(|snapshot| {
                snapshot
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|t| t["action"].as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect()
    }
}
