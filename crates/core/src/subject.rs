//! Minimal publish/subscribe primitives
//!
//! - [`BehaviorSubject`]: holds a current value, replays it to every new
//!   subscriber, pushes subsequent values, and can be terminated by
//!   completion or error.
//! - [`Subject`]: pushes values to current subscribers only. No replay and
//!   no stored value, except the last emission when built with
//!   [`Subject::distinct`], which suppresses consecutive duplicates.
//! - [`Subscription`]: RAII guard; dropping it unsubscribes.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. No internal lock is held while an observer runs, so an observer may
//!    publish, subscribe or unsubscribe re-entrantly.
//! 3. A value published while an emission is in progress is queued and
//!    delivered after every observer has seen the current one, so all
//!    observers see values in publication order.
//! 4. After `complete` or `error` no further values are delivered; late
//!    subscribers receive the terminal notification immediately.

use crate::Error;
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// Receives notifications from a subject
pub trait Observer<T>: Send + Sync {
    /// A new value was published
    fn next(&self, value: &T);

    /// The subject terminated with an error
    fn error(&self, _err: &Error) {}

    /// The subject completed
    fn complete(&self) {}
}

/// Observer built from a closure that only cares about values
pub struct FnObserver<F>(F);

impl<T, F> Observer<T> for FnObserver<F>
where
    F: Fn(&T) + Send + Sync,
{
    fn next(&self, value: &T) {
        (self.0)(value)
    }
}

/// Wrap a closure as an [`Observer`]
pub fn observer_fn<T, F>(f: F) -> FnObserver<F>
where
    F: Fn(&T) + Send + Sync,
{
    FnObserver(f)
}

#[derive(Clone)]
enum Terminal {
    Completed,
    Errored(Error),
}

type ObserverRef<T> = Arc<dyn Observer<T>>;

struct Shared<T> {
    /// Current value (behavior) or last emission (distinct)
    value: Option<T>,
    observers: Vec<(u64, ObserverRef<T>)>,
    next_id: u64,
    terminal: Option<Terminal>,
    /// An emission loop is running
    emitting: bool,
    /// Values published during the running emission
    queued: VecDeque<T>,
}

impl<T> Shared<T> {
    fn new(value: Option<T>) -> Self {
        Self {
            value,
            observers: Vec::new(),
            next_id: 0,
            terminal: None,
            emitting: false,
            queued: VecDeque::new(),
        }
    }

    fn snapshot_observers(&self) -> Vec<ObserverRef<T>> {
        self.observers.iter().map(|(_, o)| o.clone()).collect()
    }
}

/// Guard returned by `subscribe`; unsubscribes on drop
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new<T: Send + 'static>(shared: &Arc<Mutex<Shared<T>>>, id: u64) -> Self {
        let weak: Weak<Mutex<Shared<T>>> = Arc::downgrade(shared);
        Self {
            cancel: Some(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.lock().observers.retain(|(oid, _)| *oid != id);
                }
            })),
        }
    }

    fn closed() -> Self {
        Self { cancel: None }
    }

    /// Stop receiving notifications
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Deliver `value`, or queue it behind the emission already in progress.
///
/// The caller passes the guard it validated `value` under; it is released
/// while observers run.
fn emit<'a, T: Clone>(shared: &'a Mutex<Shared<T>>, mut guard: MutexGuard<'a, Shared<T>>, value: T) {
    if guard.emitting {
        guard.queued.push_back(value);
        return;
    }
    guard.emitting = true;
    let mut next = Some(value);
    while let Some(value) = next {
        let observers = guard.snapshot_observers();
        drop(guard);
        for observer in &observers {
            if shared.lock().terminal.is_some() {
                break;
            }
            observer.next(&value);
        }
        guard = shared.lock();
        next = if guard.terminal.is_some() {
            guard.queued.clear();
            None
        } else {
            guard.queued.pop_front()
        };
    }
    guard.emitting = false;
}

fn deliver_terminal<T>(observers: &[ObserverRef<T>], terminal: &Terminal) {
    for observer in observers {
        match terminal {
            Terminal::Completed => observer.complete(),
            Terminal::Errored(err) => observer.error(err),
        }
    }
}

fn terminate<T>(shared: &Mutex<Shared<T>>, terminal: Terminal) -> bool {
    let observers = {
        let mut guard = shared.lock();
        if guard.terminal.is_some() {
            return false;
        }
        guard.terminal = Some(terminal.clone());
        std::mem::take(&mut guard.observers)
            .into_iter()
            .map(|(_, o)| o)
            .collect::<Vec<_>>()
    };
    deliver_terminal(&observers, &terminal);
    true
}

/// Stateful publisher that replays its current value to new subscribers
pub struct BehaviorSubject<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> BehaviorSubject<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a subject holding `value`
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::new(Some(value)))),
        }
    }

    /// Current value
    pub fn value(&self) -> T {
        let guard = self.shared.lock();
        match &guard.value {
            Some(v) => v.clone(),
            None => unreachable!("behavior subject always holds a value"),
        }
    }

    /// Replace the value and push it to subscribers.
    ///
    /// Returns `false` (and drops the value) if the subject has terminated.
    pub fn next(&self, value: T) -> bool {
        let mut guard = self.shared.lock();
        if guard.terminal.is_some() {
            return false;
        }
        guard.value = Some(value.clone());
        emit(&self.shared, guard, value);
        true
    }

    /// Derive the next value from the current one and publish it.
    ///
    /// `f` runs under the subject's lock and must not touch the subject;
    /// returning `None` leaves the value untouched and publishes nothing.
    /// Returns `true` if a value was published.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> Option<T>,
    {
        let mut guard = self.shared.lock();
        if guard.terminal.is_some() {
            return false;
        }
        let next = match guard.value.as_ref().and_then(f) {
            Some(next) => next,
            None => return false,
        };
        guard.value = Some(next.clone());
        emit(&self.shared, guard, next);
        true
    }

    /// Subscribe; the current value is delivered immediately.
    pub fn subscribe(&self, observer: impl Observer<T> + 'static) -> Subscription {
        let observer: ObserverRef<T> = Arc::new(observer);
        let (replay, id) = {
            let mut guard = self.shared.lock();
            if let Some(terminal) = guard.terminal.clone() {
                drop(guard);
                deliver_terminal(&[observer], &terminal);
                return Subscription::closed();
            }
            let id = guard.next_id;
            guard.next_id += 1;
            guard.observers.push((id, observer.clone()));
            (guard.value.clone(), id)
        };
        if let Some(value) = replay {
            observer.next(&value);
        }
        Subscription::new(&self.shared, id)
    }

    /// Terminate successfully. Returns `false` if already terminated.
    pub fn complete(&self) -> bool {
        terminate(&self.shared, Terminal::Completed)
    }

    /// Terminate with an error. Returns `false` if already terminated.
    pub fn error(&self, err: Error) -> bool {
        terminate(&self.shared, Terminal::Errored(err))
    }

    /// Has the subject completed or errored?
    pub fn is_stopped(&self) -> bool {
        self.shared.lock().terminal.is_some()
    }

    /// Number of live subscriptions
    pub fn observer_count(&self) -> usize {
        self.shared.lock().observers.len()
    }
}

/// Plain multicaster: values go to current subscribers only
pub struct Subject<T> {
    shared: Arc<Mutex<Shared<T>>>,
    same: Option<fn(&T, &T) -> bool>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            same: self.same,
        }
    }
}

impl<T> Default for Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Subject<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a multicaster with no duplicate suppression
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::new(None))),
            same: None,
        }
    }

    /// Push `value` to current subscribers.
    ///
    /// Returns `false` if the value was suppressed as a duplicate or the
    /// subject has terminated.
    pub fn next(&self, value: T) -> bool {
        let mut guard = self.shared.lock();
        if guard.terminal.is_some() {
            return false;
        }
        if let (Some(same), Some(last)) = (self.same, guard.value.as_ref()) {
            if same(last, &value) {
                return false;
            }
        }
        if self.same.is_some() {
            guard.value = Some(value.clone());
        }
        emit(&self.shared, guard, value);
        true
    }

    /// Subscribe to future values
    pub fn subscribe(&self, observer: impl Observer<T> + 'static) -> Subscription {
        let observer: ObserverRef<T> = Arc::new(observer);
        let mut guard = self.shared.lock();
        if let Some(terminal) = guard.terminal.clone() {
            drop(guard);
            deliver_terminal(&[observer], &terminal);
            return Subscription::closed();
        }
        let id = guard.next_id;
        guard.next_id += 1;
        guard.observers.push((id, observer));
        drop(guard);
        Subscription::new(&self.shared, id)
    }

    /// Terminate successfully. Returns `false` if already terminated.
    pub fn complete(&self) -> bool {
        terminate(&self.shared, Terminal::Completed)
    }

    /// Terminate with an error. Returns `false` if already terminated.
    pub fn error(&self, err: Error) -> bool {
        terminate(&self.shared, Terminal::Errored(err))
    }

    /// Has the subject completed or errored?
    pub fn is_stopped(&self) -> bool {
        self.shared.lock().terminal.is_some()
    }

    /// Number of live subscriptions
    pub fn observer_count(&self) -> usize {
        self.shared.lock().observers.len()
    }
}

impl<T> Subject<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a multicaster that drops a value equal to the previous emission
    pub fn distinct() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::new(None))),
            same: Some(<T as PartialEq>::eq),
        }
    }
}
