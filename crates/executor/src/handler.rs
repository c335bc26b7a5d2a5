//! Handler normalization
//!
//! A [`Handler`] is the uniform, immutable form of an action definition: a
//! name, a [`Perform`] callable whose variant fixes the execution style, and
//! an optional error continuation.
//!
//! Definitions are built with one of three explicit constructors on
//! [`HandlerDef`]:
//!
//! | Constructor | Shape |
//! |-------------|-------|
//! | `HandlerDef::callable(perform)` | single callable |
//! | `HandlerDef::pair(perform, on_error)` | (callable, error-callable) |
//! | `HandlerDef::record(next, error)` | named fields; `next` is required |
//!
//! A record without `next` is the one malformed shape and fails with
//! `Error::BadHandlerDefinition`.

use crate::step::{Step, StepSource, StepStream};
use crate::transaction::Transaction;
use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use transact_core::{Error, Result, Value};

/// Synchronous handler body
pub type ImmediateFn = dyn Fn(&Transaction, &[Value]) -> Result<Value> + Send + Sync;

/// Handler body that completes later
pub type DeferredFn =
    dyn Fn(Transaction, Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Handler body that produces synchronous steps
pub type SteppedFn =
    dyn Fn(&Transaction, &[Value]) -> Result<Box<dyn StepSource>> + Send + Sync;

/// Handler body that produces asynchronous steps
pub type SteppedAsyncFn = dyn Fn(Transaction, Vec<Value>) -> Result<StepStream> + Send + Sync;

/// Error continuation: receives the error and the transaction it hit
pub type ErrorFn = dyn Fn(&Error, &Transaction) -> Result<Value> + Send + Sync;

/// Execution style, fixed by the `Perform` variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStyle {
    /// Runs to completion synchronously
    Immediate,
    /// Single completion, eventually
    Deferred,
    /// Finite sequence of steps pulled synchronously
    Stepped,
    /// Finite sequence of steps, each awaited
    SteppedAsync,
}

impl ExecutionStyle {
    /// Does `perform` hand back a future for this style?
    pub fn is_async(self) -> bool {
        matches!(self, ExecutionStyle::Deferred | ExecutionStyle::SteppedAsync)
    }
}

/// Normalized handler body, one variant per execution style
#[derive(Clone)]
pub enum Perform {
    /// See [`ExecutionStyle::Immediate`]
    Immediate(Arc<ImmediateFn>),
    /// See [`ExecutionStyle::Deferred`]
    Deferred(Arc<DeferredFn>),
    /// See [`ExecutionStyle::Stepped`]
    Stepped(Arc<SteppedFn>),
    /// See [`ExecutionStyle::SteppedAsync`]
    SteppedAsync(Arc<SteppedAsyncFn>),
}

impl Perform {
    /// Wrap a synchronous body
    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(&Transaction, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Perform::Immediate(Arc::new(f))
    }

    /// Wrap an async body
    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(Transaction, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Perform::Deferred(Arc::new(move |trans, params| f(trans, params).boxed()))
    }

    /// Wrap a body that returns a step source
    pub fn stepped<F, S>(f: F) -> Self
    where
        F: Fn(&Transaction, &[Value]) -> Result<S> + Send + Sync + 'static,
        S: StepSource + 'static,
    {
        Perform::Stepped(Arc::new(move |trans, params| {
            f(trans, params).map(|source| Box::new(source) as Box<dyn StepSource>)
        }))
    }

    /// Wrap a body that returns a stream of steps
    pub fn stepped_async<F, St>(f: F) -> Self
    where
        F: Fn(Transaction, Vec<Value>) -> Result<St> + Send + Sync + 'static,
        St: Stream<Item = Result<Step>> + Send + 'static,
    {
        Perform::SteppedAsync(Arc::new(move |trans, params| {
            f(trans, params).map(|stream| stream.boxed())
        }))
    }

    /// Execution style of this body
    pub fn style(&self) -> ExecutionStyle {
        match self {
            Perform::Immediate(_) => ExecutionStyle::Immediate,
            Perform::Deferred(_) => ExecutionStyle::Deferred,
            Perform::Stepped(_) => ExecutionStyle::Stepped,
            Perform::SteppedAsync(_) => ExecutionStyle::SteppedAsync,
        }
    }
}

impl fmt::Debug for Perform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Perform::{:?}", self.style())
    }
}

/// Wrap a closure as an error continuation
pub fn on_error<F>(f: F) -> Arc<ErrorFn>
where
    F: Fn(&Error, &Transaction) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Action definition in one of the three admissible shapes
#[derive(Clone)]
pub enum HandlerDef {
    /// A single callable
    Callable(Perform),
    /// A callable and its error continuation
    Pair(Perform, Arc<ErrorFn>),
    /// Named fields; `next` must be present
    Record {
        /// Main callable
        next: Option<Perform>,
        /// Error continuation
        error: Option<Arc<ErrorFn>>,
    },
}

impl HandlerDef {
    /// Single callable
    pub fn callable(perform: Perform) -> Self {
        HandlerDef::Callable(perform)
    }

    /// Callable plus error continuation
    pub fn pair<F>(perform: Perform, error: F) -> Self
    where
        F: Fn(&Error, &Transaction) -> Result<Value> + Send + Sync + 'static,
    {
        HandlerDef::Pair(perform, on_error(error))
    }

    /// Record with optional fields
    pub fn record(next: Option<Perform>, error: Option<Arc<ErrorFn>>) -> Self {
        HandlerDef::Record { next, error }
    }
}

impl From<Perform> for HandlerDef {
    fn from(perform: Perform) -> Self {
        HandlerDef::Callable(perform)
    }
}

/// Normalized, immutable handler bound to an action name
#[derive(Clone)]
pub struct Handler {
    name: String,
    perform: Perform,
    error: Option<Arc<ErrorFn>>,
}

impl Handler {
    /// Normalize a definition
    ///
    /// # Errors
    /// `Error::BadHandlerDefinition` if a record has no `next`.
    pub fn new(name: impl Into<String>, def: HandlerDef) -> Result<Self> {
        let name = name.into();
        let (perform, error) = match def {
            HandlerDef::Callable(perform) => (perform, None),
            HandlerDef::Pair(perform, error) => (perform, Some(error)),
            HandlerDef::Record {
                next: Some(perform),
                error,
            } => (perform, error),
            HandlerDef::Record { next: None, .. } => {
                tracing::warn!(target: "transact::set", name = %name, "bad handler definition");
                return Err(Error::BadHandlerDefinition { name });
            }
        };
        Ok(Self {
            name,
            perform,
            error,
        })
    }

    /// Handler from a bare callable; cannot fail
    pub fn from_perform(name: impl Into<String>, perform: Perform) -> Self {
        Self {
            name: name.into(),
            perform,
            error: None,
        }
    }

    /// Name the handler was registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The normalized callable
    pub fn perform(&self) -> &Perform {
        &self.perform
    }

    /// Execution style tag
    pub fn style(&self) -> ExecutionStyle {
        self.perform.style()
    }

    /// Does this handler carry a dedicated error continuation?
    pub fn has_error_path(&self) -> bool {
        self.error.is_some()
    }

    /// Handler whose callable routes `err` into the error continuation,
    /// or re-raises it when there is none.
    ///
    /// The returned handler is always immediate and has no error path of
    /// its own.
    pub fn for_errors(&self, err: Error) -> Handler {
        let continuation = self.error.clone();
        Handler {
            name: self.name.clone(),
            perform: Perform::immediate(move |trans, _params| match &continuation {
                Some(f) => f(&err, trans),
                None => Err(err.clone()),
            }),
            error: None,
        }
    }

    /// Run an immediate handler against `trans` with its current params.
    ///
    /// Used for pre/post hooks, which must be synchronous.
    pub(crate) fn call_immediate(&self, trans: &Transaction) -> Result<Value> {
        match &self.perform {
            Perform::Immediate(f) => f(trans, &trans.params()),
            _ => Err(Error::BadHandlerDefinition {
                name: self.name.clone(),
            }),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("style", &self.style())
            .field("has_error_path", &self.has_error_path())
            .finish()
    }
}
