//! Stage wrapping: resumable processing bodies, live stage handles, and
//! stage definitions.
//!
//! A [`Process`] is a unit of suspended computation: private state advanced
//! synchronously by one delivered value at a time. A [`Stage`] wraps a
//! process with a diagnostic name and a lifecycle — freshly constructed
//! stages must be primed (advanced to their first ready-to-receive point)
//! before they accept deliveries. A [`StageDef`] is the constructible form:
//! either a factory that mints fresh processing state, or an already-live
//! stage reused as-is.
//!
//! # Chaining
//!
//! Building a definition with a downstream stage produces a forwarding
//! adapter: on each delivery it runs the wrapped stage, hands the result to
//! the downstream stage, and returns whatever the downstream returned. This
//! is how single links compose into pipelines without the stage author
//! knowing anything about forwarding.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::errors::ProtocolError;
use crate::value::Shared;

/// Result of one delivery: the stage's output, or `None` for stages that
/// report no result of their own (broadcast heads).
pub type Delivery<T> = Result<Option<Shared<T>>, ProtocolError>;

// Names of infrastructure stages, excluded from debug-tap trace output.
pub(crate) const LINK_NAME: &str = "link";
pub(crate) const TAP_NAME: &str = "tap";
pub(crate) const INTERNAL_NAMES: &[&str] = &[LINK_NAME, TAP_NAME];

/// A resumable transformation: receive one value, produce one result,
/// possibly many times over its lifetime.
///
/// State lives in the implementor and is advanced exclusively through
/// [`Process::resume`]. [`Process::prime`] runs any setup required to reach
/// the first ready-to-receive point; the stage machinery calls it exactly
/// once, before the first delivery.
pub trait Process<T> {
    /// Run setup and arrive at the first ready-to-receive point.
    fn prime(&mut self) {}

    /// Handle one delivered value.
    fn resume(&mut self, input: Shared<T>) -> Delivery<T>;
}

/// Adapter: a plain transformation closure as a process.
struct FnProcess<F>(F);

impl<T, F> Process<T> for FnProcess<F>
where
    F: FnMut(Shared<T>) -> Shared<T>,
{
    fn resume(&mut self, input: Shared<T>) -> Delivery<T> {
        Ok(Some((self.0)(input)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Ready,
    Closed,
}

struct Inner<T> {
    name: String,
    lifecycle: Lifecycle,
    process: Box<dyn Process<T>>,
}

/// A live stage: a named, lifecycle-tracked process that values can be
/// delivered to.
///
/// `Stage` is a shared handle (`clone` aliases it), so a live stage can be
/// held by its caller while also being wired as another stage's downstream
/// or registered in a broadcast group. Wiring is fixed at construction and
/// must stay acyclic; delivering around a cycle is a programming error.
pub struct Stage<T>(Rc<RefCell<Inner<T>>>);

impl<T> Clone for Stage<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: 'static> Stage<T> {
    /// Wrap a process without priming it.
    ///
    /// This is the bypass path: delivering to the result fails with
    /// [`ProtocolError::NotPrimed`] until [`Stage::prime`] is called.
    /// Stages built through a [`StageDef`] are primed automatically.
    pub fn from_process(name: impl Into<String>, process: impl Process<T> + 'static) -> Self {
        Self(Rc::new(RefCell::new(Inner {
            name: name.into(),
            lifecycle: Lifecycle::Created,
            process: Box::new(process),
        })))
    }

    /// Wrap a plain transformation closure without priming it.
    pub fn from_fn(
        name: impl Into<String>,
        body: impl FnMut(Shared<T>) -> Shared<T> + 'static,
    ) -> Self {
        Self::from_process(name, FnProcess(body))
    }

    /// Construct and immediately prime: the wrapper path.
    pub(crate) fn primed(name: impl Into<String>, process: Box<dyn Process<T>>) -> Self {
        let stage = Self(Rc::new(RefCell::new(Inner {
            name: name.into(),
            lifecycle: Lifecycle::Created,
            process,
        })));
        stage.prime();
        stage
    }

    /// Advance a freshly constructed stage to its first ready-to-receive
    /// point. No-op once the stage is ready or closed.
    pub fn prime(&self) {
        let mut inner = self.0.borrow_mut();
        if inner.lifecycle == Lifecycle::Created {
            inner.process.prime();
            inner.lifecycle = Lifecycle::Ready;
        }
    }

    /// Whether the stage has reached its first ready-to-receive point.
    pub fn is_primed(&self) -> bool {
        self.0.borrow().lifecycle == Lifecycle::Ready
    }

    /// Permanently tear the stage down; later deliveries fail with
    /// [`ProtocolError::Closed`].
    pub fn close(&self) {
        self.0.borrow_mut().lifecycle = Lifecycle::Closed;
    }

    /// The stage's diagnostic name.
    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    /// Whether two handles refer to the same live stage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Deliver one value and block until every stage reachable on this
    /// delivery's path has produced its result.
    ///
    /// Returns `Ok(Some(result))` for chain paths and `Ok(None)` for
    /// composites with no result of their own. Errors raised further down
    /// the path propagate unchanged.
    pub fn deliver(&self, value: Shared<T>) -> Delivery<T> {
        let mut inner = self.0.borrow_mut();
        match inner.lifecycle {
            Lifecycle::Created => Err(ProtocolError::NotPrimed(inner.name.clone())),
            Lifecycle::Closed => Err(ProtocolError::Closed(inner.name.clone())),
            Lifecycle::Ready => inner.process.resume(value),
        }
    }
}

impl<T> fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(inner) => f
                .debug_struct("Stage")
                .field("name", &inner.name)
                .field("lifecycle", &inner.lifecycle)
                .finish(),
            Err(_) => f.write_str("Stage { <delivering> }"),
        }
    }
}

/// Forwards the wrapped stage's result to a downstream stage.
///
/// A link whose inner stage reports no result skips its downstream for
/// that delivery.
struct Link<T> {
    stage: Stage<T>,
    downstream: Stage<T>,
}

impl<T: 'static> Process<T> for Link<T> {
    fn resume(&mut self, input: Shared<T>) -> Delivery<T> {
        match self.stage.deliver(input)? {
            Some(result) => self.downstream.deliver(result),
            None => Ok(None),
        }
    }
}

enum DefKind<T> {
    /// Not yet instantiated: mints fresh processing state on demand.
    Factory {
        name: String,
        make: Rc<dyn Fn() -> Box<dyn Process<T>>>,
    },
    /// An already-live stage, used as-is.
    Live(Stage<T>),
}

/// A stage definition: something a live stage can be built from.
///
/// The two cases are explicit rather than probed at runtime: a `Factory`
/// definition is instantiated (and primed) when built, while a `Live`
/// definition is the running stage itself — building it without a
/// downstream returns the same instance unchanged. Live stages, including
/// whole pipelines, convert into definitions via `From`, which is how
/// pipelines nest inside larger pipelines.
pub struct StageDef<T> {
    kind: DefKind<T>,
}

impl<T> Clone for StageDef<T> {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            DefKind::Factory { name, make } => DefKind::Factory {
                name: name.clone(),
                make: Rc::clone(make),
            },
            DefKind::Live(stage) => DefKind::Live(stage.clone()),
        };
        Self { kind }
    }
}

impl<T: 'static> StageDef<T> {
    /// Define a stage from a factory minting fresh processing state.
    ///
    /// Construction arguments are bound by capturing them in `make`.
    pub fn from_factory<F, P>(name: impl Into<String>, make: F) -> Self
    where
        F: Fn() -> P + 'static,
        P: Process<T> + 'static,
    {
        let make: Rc<dyn Fn() -> Box<dyn Process<T>>> = Rc::new(move || Box::new(make()));
        Self {
            kind: DefKind::Factory {
                name: name.into(),
                make,
            },
        }
    }

    /// The name used for this definition in diagnostics.
    pub fn name(&self) -> String {
        match &self.kind {
            DefKind::Factory { name, .. } => name.clone(),
            DefKind::Live(stage) => stage.name(),
        }
    }

    /// Build a live stage, optionally wired to a downstream stage.
    ///
    /// A `Live` definition without a downstream is returned as the same
    /// instance. Supplying a downstream wraps the stage in a forwarding
    /// adapter that runs it, forwards its result, and returns the
    /// downstream's result.
    pub fn build(&self, downstream: Option<Stage<T>>) -> Stage<T> {
        let stage = match &self.kind {
            DefKind::Live(live) => live.clone(),
            DefKind::Factory { name, make } => Stage::primed(name.clone(), make()),
        };
        match downstream {
            None => stage,
            Some(downstream) => Stage::primed(LINK_NAME, Box::new(Link { stage, downstream })),
        }
    }
}

impl<T> From<Stage<T>> for StageDef<T> {
    fn from(stage: Stage<T>) -> Self {
        Self {
            kind: DefKind::Live(stage),
        }
    }
}

/// Define a stage from a factory producing a fresh transformation closure.
///
/// The closure owns its processing state by capture; the factory rebuilds
/// that state each time the definition is instantiated. Bind construction
/// arguments the same way, by capturing them in the factory:
///
/// ```rust,ignore
/// fn tag(key: String) -> StageDef<Record> {
///     stage(key.clone(), move || {
///         let key = key.clone();
///         move |input: Shared<Record>| {
///             input.borrow_mut().insert(key.clone(), true);
///             input
///         }
///     })
/// }
/// ```
pub fn stage<T, F, B>(name: impl Into<String>, factory: F) -> StageDef<T>
where
    T: 'static,
    F: Fn() -> B + 'static,
    B: FnMut(Shared<T>) -> Shared<T> + 'static,
{
    StageDef::from_factory(name, move || FnProcess(factory()))
}

/// Turn a definition into a live, primed stage, optionally wired to a
/// downstream stage.
///
/// Passing an already-live stage with no downstream returns that same
/// instance unchanged.
pub fn make_stage<T: 'static>(
    def: impl Into<StageDef<T>>,
    downstream: Option<Stage<T>>,
) -> Stage<T> {
    def.into().build(downstream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(label: &'static str) -> StageDef<Vec<&'static str>> {
        stage(label, move || {
            move |input: Shared<Vec<&'static str>>| {
                input.borrow_mut().push(label);
                input
            }
        })
    }

    #[test]
    fn test_built_stage_is_primed() {
        let built = push("only").build(None);
        assert!(built.is_primed());

        let result = built.deliver(Shared::new(vec![])).unwrap();
        assert_eq!(*result.unwrap().borrow(), vec!["only"]);
    }

    #[test]
    fn test_unprimed_stage_rejects_delivery() {
        let raw = Stage::from_fn("raw", |input: Shared<Vec<&'static str>>| input);
        assert!(!raw.is_primed());

        let err = raw.deliver(Shared::new(vec![])).unwrap_err();
        assert_eq!(err, ProtocolError::NotPrimed("raw".to_string()));

        raw.prime();
        assert!(raw.deliver(Shared::new(vec![])).is_ok());
    }

    #[test]
    fn test_closed_stage_rejects_delivery() {
        let built = push("done").build(None);
        built.close();

        let err = built.deliver(Shared::new(vec![])).unwrap_err();
        assert_eq!(err, ProtocolError::Closed("done".to_string()));
    }

    #[test]
    fn test_live_definition_builds_to_same_instance() {
        let live = make_stage(push("solo"), None);
        let again = make_stage(live.clone(), None);
        assert!(live.ptr_eq(&again));
    }

    #[test]
    fn test_downstream_wiring_returns_terminal_result() {
        let terminal = push("second").build(None);
        let head = make_stage(push("first"), Some(terminal));

        let result = head.deliver(Shared::new(vec![])).unwrap();
        assert_eq!(*result.unwrap().borrow(), vec!["first", "second"]);
    }

    /// Running total with state allocated at prime time.
    struct Totals {
        sum: Option<i64>,
    }

    impl Process<i64> for Totals {
        fn prime(&mut self) {
            self.sum = Some(0);
        }

        fn resume(&mut self, input: Shared<i64>) -> Delivery<i64> {
            let sum = self.sum.as_mut().expect("primed before first delivery");
            *sum += *input.borrow();
            Ok(Some(Shared::new(*sum)))
        }
    }

    #[test]
    fn test_prime_runs_process_setup() {
        let totals = Stage::from_process("totals", Totals { sum: None });
        assert!(totals.deliver(Shared::new(2)).is_err());

        totals.prime();
        let result = totals.deliver(Shared::new(2)).unwrap().unwrap();
        assert_eq!(*result.borrow(), 2);
        let result = totals.deliver(Shared::new(3)).unwrap().unwrap();
        assert_eq!(*result.borrow(), 5);
    }

    #[test]
    fn test_factory_definitions_mint_fresh_state() {
        let def = StageDef::from_factory("totals", || Totals { sum: None });
        let first = def.build(None);
        let second = def.build(None);
        assert!(!first.ptr_eq(&second));

        first.deliver(Shared::new(10)).unwrap();
        let result = second.deliver(Shared::new(1)).unwrap().unwrap();
        assert_eq!(*result.borrow(), 1);
    }
}
