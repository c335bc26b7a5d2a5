//! Test modules for the executor crate.


use crate::{observer_fn, LiveSet, Subscription, TransactionSet, Value};
use parking_lot::Mutex;
use std::sync::Arc;

/// Route `tracing` output through the test harness. Only the first call
/// installs a subscriber.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// Records every live-set snapshot a set publishes.
///
/// `json` renders the recorded snapshots as they look now (handles keep
/// changing after they are published); `eager` is what each snapshot looked
/// like at the moment it was published.
pub(crate) struct History {
    sets: Arc<Mutex<Vec<LiveSet>>>,
    eager: Arc<Mutex<Vec<Value>>>,
    _sub: Subscription,
}

impl History {
    pub(crate) fn observe(set: &TransactionSet) -> Self {
        let sets = Arc::new(Mutex::new(Vec::new()));
        let eager = Arc::new(Mutex::new(Vec::new()));
        let (set_sink, eager_sink) = (sets.clone(), eager.clone());
        let sub = set.subscribe(observer_fn(move |live: &LiveSet| {
            set_sink.lock().push(live.clone());
            eager_sink.lock().push(live.to_json(false));
        }));
        Self {
            sets,
            eager,
            _sub: sub,
        }
    }

    pub(crate) fn json(&self) -> Value {
        Value::Array(self.sets.lock().iter().map(|s| s.to_json(false)).collect())
    }

    pub(crate) fn eager(&self) -> Value {
        Value::Array(self.eager.lock().clone())
    }

    pub(crate) fn sets(&self) -> Vec<LiveSet> {
        self.sets.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.sets.lock().len()
    }
}
