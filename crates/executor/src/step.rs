//! Step sources for stepped handlers
//!
//! A stepped handler does not return its result directly. It hands back a
//! source of steps that the transaction pulls one at a time:
//!
//! - `Step::Yield(label)` moves the transaction to an intermediate state
//!   (`None` or the current state is ignored)
//! - `Step::Done(value)` finishes; a present value becomes the result
//!
//! An exhausted source counts as `Step::Done(None)`.

use futures::stream::BoxStream;
use transact_core::{Result, TransactionState, Value};

/// One pulled step
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Intermediate step carrying an optional state label
    Yield(Option<TransactionState>),
    /// Terminal step carrying an optional result
    Done(Option<Value>),
}

impl Step {
    /// Intermediate step that assigns `label` as the transaction state
    pub fn state(label: impl Into<TransactionState>) -> Self {
        Step::Yield(Some(label.into()))
    }

    /// Intermediate step with no label
    pub fn pause() -> Self {
        Step::Yield(None)
    }

    /// Terminal step with a result
    pub fn done(value: impl Into<Value>) -> Self {
        Step::Done(Some(value.into()))
    }

    /// Terminal step without a result
    pub fn finish() -> Self {
        Step::Done(None)
    }

    /// Is this the terminal step?
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }
}

/// Lazily produces steps for a synchronous stepped handler
pub trait StepSource: Send {
    /// Pull the next step
    fn pull(&mut self) -> Result<Step>;
}

impl<F> StepSource for F
where
    F: FnMut() -> Result<Step> + Send,
{
    fn pull(&mut self) -> Result<Step> {
        self()
    }
}

/// Step source over an iterator; exhaustion is `Step::Done(None)`
pub struct IterSteps<I> {
    iter: I,
}

impl<I> StepSource for IterSteps<I>
where
    I: Iterator<Item = Result<Step>> + Send,
{
    fn pull(&mut self) -> Result<Step> {
        self.iter.next().unwrap_or(Ok(Step::Done(None)))
    }
}

/// Build a step source from anything iterable
pub fn steps<I>(iter: I) -> IterSteps<I::IntoIter>
where
    I: IntoIterator<Item = Result<Step>>,
    I::IntoIter: Send,
{
    IterSteps {
        iter: iter.into_iter(),
    }
}

/// Asynchronous step source; each item is awaited before it is applied
pub type StepStream = BoxStream<'static, Result<Step>>;
